//! Auth/connection configuration.
//!
//! Credentials live in a YAML file in the XDG config directory (overridable
//! through `EJUDGE_CONFIG`); the password is only written when the caller
//! opts into storing it.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::links::Links;

const CONFIG_FILE: &str = "config.yaml";
const CONFIG_PATH_ENV: &str = "EJUDGE_CONFIG";
const XDG_PREFIX: &str = "ejudge-client";

/// Credentials and contest selection. Immutable once captured by a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthData {
    pub login: String,
    /// Prompted for interactively when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub contest_id: u32,
    #[serde(default)]
    pub judge: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthData>,
    /// Base URL of the judge installation; the default points at the
    /// production host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Server utc offset override, seconds east. Used for timestamp
    /// normalization when set; MSK otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_tz_secs: Option<i32>,
}

fn config_path(create_dirs: bool) -> Result<PathBuf, Error> {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return Ok(path.into());
    }
    let dirs = xdg::BaseDirectories::with_prefix(XDG_PREFIX)
        .map_err(|e| Error::Config(format!("xdg initialization failed: {}", e)))?;
    if create_dirs {
        dirs.place_config_file(CONFIG_FILE)
            .map_err(|e| Error::Config(format!("cannot create config dir: {}", e)))
    } else {
        Ok(dirs
            .find_config_file(CONFIG_FILE)
            .unwrap_or_else(|| dirs.get_config_home().join(CONFIG_FILE)))
    }
}

impl Config {
    pub fn load() -> Result<Config, Error> {
        let path = config_path(false)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => {
                return Err(Error::Config(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let config: Config = serde_yaml::from_str(&text)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), Error> {
        self.validate()?;
        let path = config_path(true)?;
        let text = serde_yaml::to_string(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(&path, text)
            .map_err(|e| Error::Config(format!("cannot write {}: {}", path.display(), e)))
    }

    fn validate(&self) -> Result<(), Error> {
        if let Some(host) = &self.host {
            Links::new(host)?;
        }
        Ok(())
    }

    pub fn links(&self) -> Result<Links, Error> {
        match &self.host {
            Some(host) => Links::new(host),
            None => Ok(Links::default_host()),
        }
    }
}

/// Saved credentials, if a login was recorded.
pub fn load_auth_data() -> Result<Option<AuthData>, Error> {
    let config = Config::load()?;
    Ok(config.auth.filter(|auth| !auth.login.is_empty()))
}

/// Record credentials for later sessions. The password is dropped unless
/// `store_password` is set.
pub fn save_auth_data(auth: &AuthData, store_password: bool) -> Result<(), Error> {
    let mut config = Config::load().unwrap_or_default();
    let mut auth = auth.clone();
    if !store_password {
        auth.password = None;
    }
    config.auth = Some(auth);
    config.save()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_auth() {
        let config = Config::default();
        assert!(config.auth.is_none());
        assert!(config.links().is_ok());
    }

    #[test]
    fn bad_host_fails_validation() {
        let config = Config {
            host: Some("gopher://judge".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn auth_yaml_round_trip() {
        let auth = AuthData {
            login: "judge01".to_string(),
            password: None,
            contest_id: 130,
            judge: true,
        };
        let text = serde_yaml::to_string(&Config {
            auth: Some(auth),
            host: None,
            server_tz_secs: None,
        })
        .unwrap();
        assert!(!text.contains("password"));
        let parsed: Config = serde_yaml::from_str(&text).unwrap();
        let auth = parsed.auth.unwrap();
        assert_eq!(auth.login, "judge01");
        assert_eq!(auth.contest_id, 130);
        assert!(auth.judge);
        assert!(auth.password.is_none());
    }
}
