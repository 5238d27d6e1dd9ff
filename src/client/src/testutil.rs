//! Scripted transport and session fixtures shared by unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tempfile::TempDir;

use crate::config::AuthData;
use crate::error::Error;
use crate::links::Links;
use crate::session::{EjudgeSession, Sids};
use crate::storage::StateStore;
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// A transport that replays canned responses and records every request.
pub struct ScriptedTransport {
    responses: Rc<RefCell<VecDeque<(HttpResponse, Option<String>)>>>,
    requests: Rc<RefCell<Vec<HttpRequest>>>,
    cookie: Rc<RefCell<Option<String>>>,
}

impl ScriptedTransport {
    pub fn new() -> ScriptedTransport {
        ScriptedTransport {
            responses: Rc::new(RefCell::new(VecDeque::new())),
            requests: Rc::new(RefCell::new(Vec::new())),
            cookie: Rc::new(RefCell::new(None)),
        }
    }

    pub fn push(&self, resp: HttpResponse) {
        self.responses.borrow_mut().push_back((resp, None));
    }

    /// Queue a response that also sets the `EJSID` cookie, the way the
    /// login redirect does.
    pub fn push_with_cookie(&self, resp: HttpResponse, ejsid: &str) {
        self.responses
            .borrow_mut()
            .push_back((resp, Some(ejsid.to_string())));
    }

    pub fn push_body(&self, body: Vec<u8>) {
        self.push(HttpResponse {
            status: 200,
            final_url: "https://judge.example.org/cgi-bin/new-master".to_string(),
            body,
        });
    }

    pub fn push_json(&self, json: &str) {
        self.push_body(json.as_bytes().to_vec());
    }

    /// Handle on the request log; keep it before moving the transport into
    /// a session.
    pub fn requests(&self) -> Rc<RefCell<Vec<HttpRequest>>> {
        self.requests.clone()
    }

    pub fn cookie(&self) -> Rc<RefCell<Option<String>>> {
        self.cookie.clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, req: HttpRequest) -> Result<HttpResponse, Error> {
        self.requests.borrow_mut().push(req);
        let (resp, cookie) = self
            .responses
            .borrow_mut()
            .pop_front()
            .expect("scripted transport ran out of responses");
        if let Some(cookie) = cookie {
            *self.cookie.borrow_mut() = Some(cookie);
        }
        Ok(resp)
    }

    fn set_session_cookie(&self, value: &str) {
        *self.cookie.borrow_mut() = Some(value.to_string());
    }

    fn expire_session_cookie(&self) {
        *self.cookie.borrow_mut() = None;
    }

    fn session_cookie(&self) -> Option<String> {
        self.cookie.borrow().clone()
    }
}

/// A session wired to a scripted transport and a throwaway state store.
/// With `authed`, the session starts in judge mode with dummy tokens.
pub fn scripted_session(
    transport: ScriptedTransport,
    auth: Option<AuthData>,
    authed: bool,
) -> (EjudgeSession, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = StateStore::at(dir.path().join("state.json"));
    let links = Links::new("https://judge.example.org").expect("links");
    let mut session = EjudgeSession::with_parts(Box::new(transport), links, store, auth, 3 * 3600);
    if authed {
        session.set_test_identity(
            Sids {
                sid: "sid0".to_string(),
                ejsid: "ejs0".to_string(),
            },
            true,
        );
    }
    (session, dir)
}
