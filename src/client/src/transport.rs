//! Blocking HTTP transport.
//!
//! The session and API layers talk to the server through the [`Transport`]
//! trait so tests can script responses without a network; the production
//! implementation wraps a blocking reqwest client with a cookie jar.

use std::sync::Arc;

use reqwest::blocking::multipart;
use reqwest::cookie::{CookieStore, Jar};
use url::Url;

use crate::error::Error;
use crate::links::Links;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One file of a multipart upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>) -> HttpRequest {
        HttpRequest {
            method: Method::Post,
            ..HttpRequest::get(url)
        }
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn form_param(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// URL of the response after redirects; the login flow extracts the
    /// session id from its query string.
    pub final_url: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_contains(&self, marker: &[u8]) -> bool {
        !marker.is_empty()
            && self
                .body
                .windows(marker.len())
                .any(|window| window == marker)
    }
}

pub trait Transport {
    fn execute(&self, req: HttpRequest) -> Result<HttpResponse, Error>;

    /// Seed the `EJSID` cookie for an optimistically restored session.
    fn set_session_cookie(&self, value: &str);

    /// Drop the `EJSID` cookie before a fresh login.
    fn expire_session_cookie(&self);

    /// Current `EJSID` cookie value, if the server has set one.
    fn session_cookie(&self) -> Option<String>;
}

pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    jar: Arc<Jar>,
    cookie_url: Url,
}

impl ReqwestTransport {
    pub fn new(links: &Links) -> Result<ReqwestTransport, Error> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::blocking::Client::builder()
            .cookie_provider(jar.clone())
            .user_agent(concat!("ejudge-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ServiceUnavailable(format!("cannot build http client: {}", e)))?;
        Ok(ReqwestTransport {
            client,
            jar,
            cookie_url: links.cookie_url(),
        })
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, req: HttpRequest) -> Result<HttpResponse, Error> {
        let url = Url::parse(&req.url)
            .map_err(|e| Error::InvalidArgument(format!("bad request url `{}`: {}", req.url, e)))?;
        let mut builder = match req.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if !req.files.is_empty() {
            let mut form = multipart::Form::new();
            for (name, value) in req.form {
                form = form.text(name, value);
            }
            for file in req.files {
                form = form.part(
                    file.field,
                    multipart::Part::bytes(file.bytes).file_name(file.file_name),
                );
            }
            builder = builder.multipart(form);
        } else if !req.form.is_empty() {
            builder = builder.form(&req.form);
        }
        let response = builder
            .send()
            .map_err(|e| Error::ServiceUnavailable(e.to_string()))?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response
            .bytes()
            .map_err(|e| Error::ServiceUnavailable(e.to_string()))?
            .to_vec();
        Ok(HttpResponse {
            status,
            final_url,
            body,
        })
    }

    fn set_session_cookie(&self, value: &str) {
        self.jar.add_cookie_str(
            &format!("EJSID={}; Path=/cgi-bin", value),
            &self.cookie_url,
        );
    }

    fn expire_session_cookie(&self) {
        self.jar
            .add_cookie_str("EJSID=; Path=/cgi-bin; Max-Age=0", &self.cookie_url);
    }

    fn session_cookie(&self) -> Option<String> {
        let header = self.jar.cookies(&self.cookie_url)?;
        header
            .to_str()
            .ok()?
            .split(';')
            .map(str::trim)
            .find_map(|kv| kv.strip_prefix("EJSID="))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}
