//! Session-cookie authenticated access to the HTML interface.
//!
//! A session moves between three states: unauthenticated, authenticated and
//! expired. Expiry is only observable as an `Invalid session` marker in a
//! response body; it is handled by one transparent re-authentication and a
//! single retry of the original request.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::api::Api;
use crate::config::{self, AuthData, Config};
use crate::error::Error;
use crate::links::Links;
use crate::pages::Page;
use crate::storage::StateStore;
use crate::transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};

const INVALID_SESSION_MARKER: &[u8] = b"Invalid session";

/// The token pair issued on successful authentication. `sid` travels in the
/// query string, `ejsid` doubles as the `EJSID` cookie; the server rejects
/// requests where the two disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sids {
    #[serde(rename = "SID")]
    pub sid: String,
    #[serde(rename = "EJSID")]
    pub ejsid: String,
}

impl Sids {
    pub fn is_complete(&self) -> bool {
        !self.sid.is_empty() && !self.ejsid.is_empty()
    }

    /// Decode a `{"SID": ..., "EJSID": ...}` API result.
    pub(crate) fn from_result(result: &Value) -> Result<Sids, Error> {
        serde_json::from_value(result.clone()).map_err(|e| Error::schema("Sids", e.to_string()))
    }
}

pub struct EjudgeSession {
    transport: Box<dyn Transport>,
    links: Links,
    store: StateStore,
    sids: Sids,
    judge: bool,
    /// Credentials captured for the lifetime of this session; renewal does
    /// not go back to the config file once they are known.
    auth_data: Option<AuthData>,
    default_tz_secs: i32,
}

impl EjudgeSession {
    /// Restore-or-login using the saved configuration.
    pub fn connect() -> Result<EjudgeSession, Error> {
        Self::with_config(Config::load()?)
    }

    pub fn with_config(config: Config) -> Result<EjudgeSession, Error> {
        let links = config.links()?;
        let transport = ReqwestTransport::new(&links)?;
        let store = StateStore::open_default()?;
        let mut session = Self::with_parts(
            Box::new(transport),
            links,
            store,
            config.auth.clone(),
            config.server_tz_secs.unwrap_or(3 * 3600),
        );
        session.restore()?;
        if !session.sids.is_complete() {
            session.auth(None)?;
        }
        Ok(session)
    }

    pub(crate) fn with_parts(
        transport: Box<dyn Transport>,
        links: Links,
        store: StateStore,
        auth_data: Option<AuthData>,
        default_tz_secs: i32,
    ) -> EjudgeSession {
        EjudgeSession {
            transport,
            links,
            store,
            sids: Sids::default(),
            judge: false,
            auth_data,
            default_tz_secs,
        }
    }

    #[cfg(test)]
    pub(crate) fn set_test_identity(&mut self, sids: Sids, judge: bool) {
        self.sids = sids;
        self.judge = judge;
    }

    pub fn is_judge(&self) -> bool {
        self.judge
    }

    pub fn sids(&self) -> &Sids {
        &self.sids
    }

    pub(crate) fn store(&self) -> &StateStore {
        &self.store
    }

    /// Optimistically adopt the identifiers persisted by a previous
    /// invocation; no round trip is made to check they are still alive.
    pub fn restore(&mut self) -> Result<(), Error> {
        let guard = self.store.open()?;
        let record = guard.session();
        self.judge = record.judge;
        if let Some(sids) = record.sids.clone().filter(Sids::is_complete) {
            self.transport.set_session_cookie(&sids.ejsid);
            self.sids = sids;
            tracing::debug!("restored persisted session identifiers");
        }
        Ok(())
    }

    /// Log in and capture fresh session identifiers.
    ///
    /// Without explicit auth data the credentials captured earlier in this
    /// session are reused; failing that they are loaded from the config
    /// file, prompting for the password when it was not stored.
    pub fn auth(&mut self, auth_data: Option<&AuthData>) -> Result<(), Error> {
        let mut data = match auth_data {
            Some(data) => data.clone(),
            None => self.saved_auth_data()?,
        };
        if data.password.is_none() {
            data.password = Some(prompt_password()?);
        }
        self.login(&data)?;
        self.auth_data = Some(data);
        Ok(())
    }

    fn saved_auth_data(&self) -> Result<AuthData, Error> {
        if let Some(data) = &self.auth_data {
            return Ok(data.clone());
        }
        tracing::warn!("session is missing or invalid, trying saved credentials");
        config::load_auth_data()?.ok_or_else(|| {
            Error::Auth("auth data is not found, log in and save credentials first".to_string())
        })
    }

    fn login(&mut self, data: &AuthData) -> Result<(), Error> {
        let password = data
            .password
            .as_deref()
            .ok_or_else(|| Error::Auth("password is required".to_string()))?;

        self.transport.expire_session_cookie();
        let mut req = HttpRequest::post(self.links.contest_entry(data.judge, data.contest_id));
        req.form = vec![
            ("login".to_string(), data.login.clone()),
            ("password".to_string(), password.to_string()),
        ];
        let resp = self.transport.execute(req)?;

        if !resp.is_success() {
            return Err(Error::Auth(format!(
                "failed to authenticate (status code {})",
                resp.status
            )));
        }
        let text = String::from_utf8_lossy(&resp.body);
        if text.contains("Invalid contest") || text.contains("invalid contest_id") {
            return Err(Error::Auth(format!(
                "invalid contest (contest id {})",
                data.contest_id
            )));
        }
        if text.contains("Permission denied") {
            return Err(Error::Auth(
                "permission denied (invalid login, password or contest id)".to_string(),
            ));
        }

        let sid = url_query_param(&resp.final_url, "SID")
            .ok_or_else(|| Error::Auth("login response carries no session id".to_string()))?;
        let ejsid = self
            .transport
            .session_cookie()
            .ok_or_else(|| Error::Auth("login response carries no session cookie".to_string()))?;
        self.sids = Sids { sid, ejsid };
        self.judge = data.judge;

        let mut guard = self.store.open()?;
        guard.session_mut().sids = Some(self.sids.clone());
        guard.session_mut().judge = self.judge;
        guard.save()?;
        tracing::info!(judge = self.judge, "authenticated");
        Ok(())
    }

    /// Issue one request with the session id injected, renewing the session
    /// at most once when the server reports it invalid.
    fn request(
        &mut self,
        method: Method,
        url: Url,
        params: &[(&str, String)],
        form: &[(&str, String)],
    ) -> Result<HttpResponse, Error> {
        let (url, mut query) = split_stale_sid(url, params);
        query.push(("SID".to_string(), self.sids.sid.clone()));

        let mut req = HttpRequest {
            method,
            url: url.to_string(),
            query,
            form: form
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            files: Vec::new(),
        };

        let resp = self.transport.execute(req.clone())?;
        check_response(&resp)?;
        if !resp.body_contains(INVALID_SESSION_MARKER) {
            return Ok(resp);
        }

        // Expired session: renew once and replay the request. A second
        // rejection means renewal does not help; give up.
        tracing::warn!("session rejected by the server, re-authenticating");
        self.auth(None)?;
        set_query_param(&mut req.query, "SID", &self.sids.sid);
        let resp = self.transport.execute(req)?;
        check_response(&resp)?;
        if resp.body_contains(INVALID_SESSION_MARKER) {
            return Err(Error::Auth(
                "session is still invalid after re-authentication".to_string(),
            ));
        }
        Ok(resp)
    }

    pub fn get(&mut self, url: Url, params: &[(&str, String)]) -> Result<HttpResponse, Error> {
        self.request(Method::Get, url, params, &[])
    }

    /// POST with a form body; query parameters carry only the session id.
    pub fn post(&mut self, url: Url, form: &[(&str, String)]) -> Result<HttpResponse, Error> {
        self.request(Method::Post, url, &[], form)
    }

    fn check_page_access(&self, page: Page) -> Result<(), Error> {
        if page.judge_only() && !self.judge {
            return Err(Error::Access);
        }
        Ok(())
    }

    pub fn get_page(&mut self, page: Page, params: &[(&str, String)]) -> Result<HttpResponse, Error> {
        self.check_page_access(page)?;
        let mut params = params.to_vec();
        params.push(("action", page.action_id().to_string()));
        tracing::debug!(action = page.action_id(), "page request");
        self.request(Method::Get, self.links.contest_root(self.judge), &params, &[])
    }

    pub fn post_page(&mut self, page: Page, form: &[(&str, String)]) -> Result<HttpResponse, Error> {
        self.check_page_access(page)?;
        let action = [("action", page.action_id().to_string())];
        tracing::debug!(action = page.action_id(), "page request");
        self.request(Method::Post, self.links.contest_root(self.judge), &action, form)
    }

    /// JSON API client sharing this session's tokens. If the tokens go
    /// stale, route calls through [`EjudgeSession::with_auth`].
    pub fn api(&self) -> Result<Api, Error> {
        Ok(Api::with_transport(
            Box::new(ReqwestTransport::new(&self.links)?),
            self.links.clone(),
            Some(self.sids.clone()),
        ))
    }

    /// Call an API method, renewing the session exactly once when the
    /// server reports the tokens invalid. Fresh tokens are pushed into
    /// `api` before the retry.
    pub fn with_auth<T, F>(&mut self, api: &mut Api, mut call: F) -> Result<T, Error>
    where
        F: FnMut(&Api) -> Result<T, Error>,
    {
        match call(api) {
            Err(ref err) if err.is_invalid_session() => {
                tracing::warn!("api tokens rejected, re-authenticating");
                self.auth(None)?;
                api.set_sids(self.sids.clone());
                call(api)
            }
            other => other,
        }
    }

    /// Timezone the server renders table timestamps in. Resolved once and
    /// cached in the durable state; configurable, defaults to MSK.
    pub fn server_tz(&mut self) -> Result<FixedOffset, Error> {
        let cached = self.store.open()?.filters().server_tz_secs;
        let secs = match cached {
            Some(secs) => secs,
            None => {
                let secs = self.default_tz_secs;
                let mut guard = self.store.open()?;
                guard.filters_mut().server_tz_secs = Some(secs);
                guard.save()?;
                secs
            }
        };
        FixedOffset::east_opt(secs)
            .ok_or_else(|| Error::Config(format!("utc offset {} out of range", secs)))
    }
}

fn check_response(resp: &HttpResponse) -> Result<(), Error> {
    // The server keeps 200 even for auth errors; only transport-level
    // failures show up here.
    if resp.is_success() {
        Ok(())
    } else {
        Err(Error::ServiceUnavailable(format!(
            "status code {}",
            resp.status
        )))
    }
}

fn prompt_password() -> Result<String, Error> {
    dialoguer::Password::new()
        .with_prompt("Password")
        .interact()
        .map_err(|e| Error::Auth(format!("cannot read password: {}", e)))
}

fn url_query_param(url: &str, name: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Move every query parameter out of the URL into the parameter list,
/// dropping a stale embedded `SID` so the session's own one wins.
fn split_stale_sid(mut url: Url, params: &[(&str, String)]) -> (Url, Vec<(String, String)>) {
    let mut query: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    let embedded: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !embedded.is_empty() {
        url.set_query(None);
        for (key, value) in embedded {
            if key != "SID" && !query.iter().any(|(k, _)| *k == key) {
                query.push((key, value));
            }
        }
    }
    (url, query)
}

fn set_query_param(query: &mut Vec<(String, String)>, name: &str, value: &str) {
    for (key, existing) in query.iter_mut() {
        if key == name {
            *existing = value.to_string();
            return;
        }
    }
    query.push((name.to_string(), value.to_string()));
}
