//! URL layout of an ejudge installation.

use url::Url;

use crate::error::Error;

pub const DEFAULT_HOST: &str = "https://caos.ejudge.ru";

/// CGI entry points, relative to `<host>/cgi-bin`.
pub const CLIENT_CGI: &str = "new-client";
pub const MASTER_CGI: &str = "new-master";
pub const REGISTER_CGI: &str = "register";

#[derive(Debug, Clone)]
pub struct Links {
    base: Url,
}

impl Links {
    pub fn new(host: &str) -> Result<Links, Error> {
        let base = Url::parse(host)
            .map_err(|e| Error::Config(format!("`{}` is not a valid host url: {}", host, e)))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(Error::Config(format!(
                "host: only http and https schemes are allowed, got {}",
                base.scheme()
            )));
        }
        if base.host_str().is_none() {
            return Err(Error::Config(format!("host url `{}` has no host part", host)));
        }
        Ok(Links { base })
    }

    pub fn default_host() -> Links {
        // DEFAULT_HOST is checked by the `default_host_parses` test.
        Links::new(DEFAULT_HOST).unwrap_or_else(|_| unreachable!())
    }

    fn cgi(&self, program: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(&format!("/cgi-bin/{}", program));
        url
    }

    /// URL cookies are scoped to; the `EJSID` cookie uses `/cgi-bin` as path.
    pub fn cookie_url(&self) -> Url {
        let mut url = self.base.clone();
        url.set_path("/cgi-bin/");
        url
    }

    /// Login form target for the given contest.
    pub fn contest_entry(&self, judge: bool, contest_id: u32) -> Url {
        let mut url = self.contest_root(judge);
        url.query_pairs_mut()
            .append_pair("contest_id", &contest_id.to_string());
        url
    }

    /// Root URL page requests are issued against; the contest is identified
    /// by the `SID` query parameter.
    pub fn contest_root(&self, judge: bool) -> Url {
        self.cgi(if judge { MASTER_CGI } else { CLIENT_CGI })
    }

    /// Entry point of the JSON API method group (`new-client` / `register`).
    pub fn api_url(&self, group: &str) -> Url {
        self.cgi(group)
    }
}
