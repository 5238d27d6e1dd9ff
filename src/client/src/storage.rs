//! Durable local state shared across invocations.
//!
//! One JSON file, two logical records: the session record (tokens + judge
//! flag) and the filter record (which filter components were set by the
//! last list query, plus the cached server timezone). Access follows a
//! load-mutate-save discipline through [`StateGuard`]; concurrent local
//! invocations are resolved last-writer-wins.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::session::Sids;

const STATE_FILE: &str = "state.json";
const XDG_PREFIX: &str = "ejudge-client";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    pub sids: Option<Sids>,
    #[serde(default)]
    pub judge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRecord {
    /// (expression, first index, last index) of the last runs query.
    pub runs: [bool; 3],
    /// (first index, last index) of the last clars query.
    pub clars: [bool; 2],
    /// Cached server utc offset, seconds east.
    pub server_tz_secs: Option<i32>,
}

impl Default for FilterRecord {
    fn default() -> FilterRecord {
        FilterRecord {
            runs: [false; 3],
            clars: [false; 2],
            server_tz_secs: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    #[serde(default)]
    session: SessionRecord,
    #[serde(default)]
    filters: FilterRecord,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store in the XDG data directory.
    pub fn open_default() -> Result<StateStore, Error> {
        let dirs = xdg::BaseDirectories::with_prefix(XDG_PREFIX)
            .map_err(|e| Error::Storage(format!("xdg initialization failed: {}", e)))?;
        let path = dirs
            .place_data_file(STATE_FILE)
            .map_err(|e| Error::Storage(format!("cannot create data dir: {}", e)))?;
        Ok(StateStore { path })
    }

    pub fn at(path: impl Into<PathBuf>) -> StateStore {
        StateStore { path: path.into() }
    }

    /// Load the current state for a mutate-save scope. A missing or empty
    /// file yields the default state.
    pub fn open(&self) -> Result<StateGuard, Error> {
        let state = match fs::read(&self.path) {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)
                .map_err(|e| Error::Storage(format!("corrupt state file: {}", e)))?,
            Ok(_) => State::default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State::default(),
            Err(e) => return Err(Error::Storage(e.to_string())),
        };
        Ok(StateGuard {
            path: self.path.clone(),
            state,
        })
    }
}

#[derive(Debug)]
pub struct StateGuard {
    path: PathBuf,
    state: State,
}

impl StateGuard {
    pub fn session(&self) -> &SessionRecord {
        &self.state.session
    }

    pub fn session_mut(&mut self) -> &mut SessionRecord {
        &mut self.state.session
    }

    pub fn filters(&self) -> &FilterRecord {
        &self.state.filters
    }

    pub fn filters_mut(&mut self) -> &mut FilterRecord {
        &mut self.state.filters
    }

    /// Flush the whole state back to disk.
    pub fn save(&self) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(&self.state)
            .map_err(|e| Error::Storage(e.to_string()))?;
        fs::write(&self.path, bytes).map_err(|e| Error::Storage(e.to_string()))
    }
}
