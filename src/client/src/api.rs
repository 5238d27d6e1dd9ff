//! Token-authenticated JSON API.
//!
//! Every method is a POST carrying `action`, `json=1` and the session
//! tokens in the body. Responses come wrapped in an envelope
//! `{ok, result?, error?: {num, message}}`; a few endpoints return a raw
//! payload instead of JSON.

use serde_json::Value;

use crate::config::AuthData;
use crate::entities::RunStatus;
use crate::error::{api_code, Error};
use crate::links::{Links, CLIENT_CGI, REGISTER_CGI};
use crate::session::Sids;
use crate::transport::{FilePart, HttpRequest, ReqwestTransport, Transport};

pub struct Api {
    transport: Box<dyn Transport>,
    links: Links,
    sids: Option<Sids>,
}

enum Payload {
    Json(Value),
    Raw(Vec<u8>),
}

impl Payload {
    fn into_json(self) -> Result<Value, Error> {
        match self {
            Payload::Json(value) => Ok(value),
            Payload::Raw(_) => Err(Error::Api {
                code: api_code::INVALID_RESPONSE,
                message: "expected a json envelope".to_string(),
            }),
        }
    }

    fn into_raw(self) -> Result<Vec<u8>, Error> {
        match self {
            Payload::Raw(bytes) => Ok(bytes),
            Payload::Json(_) => Err(Error::Api {
                code: api_code::INVALID_RESPONSE,
                message: "expected a raw payload".to_string(),
            }),
        }
    }
}

impl Api {
    pub fn new(links: Links) -> Result<Api, Error> {
        let transport = ReqwestTransport::new(&links)?;
        Ok(Api::with_transport(Box::new(transport), links, None))
    }

    pub(crate) fn with_transport(
        transport: Box<dyn Transport>,
        links: Links,
        sids: Option<Sids>,
    ) -> Api {
        Api {
            transport,
            links,
            sids,
        }
    }

    pub fn sids(&self) -> Option<&Sids> {
        self.sids.as_ref()
    }

    /// Replace the tokens, e.g. after the owning session re-authenticated.
    pub fn set_sids(&mut self, sids: Sids) {
        self.sids = Some(sids);
    }

    fn own_sids(&self) -> Result<&Sids, Error> {
        self.sids
            .as_ref()
            .ok_or_else(|| Error::Auth("api session tokens are not set".to_string()))
    }

    /// One API call. `sids` overrides the stored tokens; `need_json`
    /// distinguishes envelope methods from raw-payload methods.
    fn call(
        &self,
        group: &str,
        action: &str,
        sids: Option<&Sids>,
        need_json: bool,
        params: Vec<(String, String)>,
        files: Vec<FilePart>,
    ) -> Result<Payload, Error> {
        let mut req = HttpRequest::post(self.links.api_url(group));
        req.form = params;
        req.form.push(("action".to_string(), action.to_string()));
        req.form.push(("json".to_string(), "1".to_string()));
        if let Some(sids) = sids {
            req.form.push(("SID".to_string(), sids.sid.clone()));
            req.form.push(("EJSID".to_string(), sids.ejsid.clone()));
        }
        req.files = files;

        tracing::debug!(action, group, "api request");
        let resp = self.transport.execute(req)?;
        if !resp.is_success() {
            return Err(Error::ServiceUnavailable(format!(
                "status code {}",
                resp.status
            )));
        }

        // All methods report errors as a JSON envelope, so the body is fed
        // to the JSON decoder even for raw-payload methods. A raw payload
        // that itself decodes as JSON is indistinguishable from an error
        // envelope and is reported as one.
        match serde_json::from_slice::<Value>(&resp.body) {
            Err(_) if !need_json => Ok(Payload::Raw(resp.body)),
            Err(e) => Err(Error::Api {
                code: api_code::INVALID_RESPONSE,
                message: format!("invalid response: {}", e),
            }),
            Ok(envelope) => {
                let ok = envelope.get("ok").and_then(Value::as_bool).unwrap_or(false);
                if need_json && ok {
                    Ok(Payload::Json(
                        envelope.get("result").cloned().unwrap_or(Value::Null),
                    ))
                } else {
                    let error = envelope.get("error");
                    Err(Error::Api {
                        code: error
                            .and_then(|e| e.get("num"))
                            .and_then(Value::as_i64)
                            .map(|num| num as i32)
                            .unwrap_or(api_code::UNKNOWN),
                        message: error
                            .and_then(|e| e.get("message"))
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error")
                            .to_string(),
                    })
                }
            }
        }
    }

    fn call_json(&self, action: &str, params: Vec<(String, String)>) -> Result<Value, Error> {
        self.call(
            CLIENT_CGI,
            action,
            Some(self.own_sids()?),
            true,
            params,
            Vec::new(),
        )?
        .into_json()
    }

    fn call_raw(&self, action: &str, params: Vec<(String, String)>) -> Result<Vec<u8>, Error> {
        self.call(
            CLIENT_CGI,
            action,
            Some(self.own_sids()?),
            false,
            params,
            Vec::new(),
        )?
        .into_raw()
    }

    /// Mint tokens for [`Api::enter_contest`].
    pub fn login(&self, login: &str, password: &str) -> Result<Sids, Error> {
        let params = vec![
            ("login".to_string(), login.to_string()),
            ("password".to_string(), password.to_string()),
        ];
        let result = self
            .call(REGISTER_CGI, "login-json", None, true, params, Vec::new())?
            .into_json()?;
        Sids::from_result(&result)
    }

    /// Exchange top-level tokens for contest-scoped ones.
    pub fn enter_contest(&self, sids: &Sids, contest_id: u32) -> Result<Sids, Error> {
        let params = vec![("contest_id".to_string(), contest_id.to_string())];
        let result = self
            .call(
                REGISTER_CGI,
                "enter-contest-json",
                Some(sids),
                true,
                params,
                Vec::new(),
            )?
            .into_json()?;
        Sids::from_result(&result)
    }

    /// Full login + enter-contest chain; stores the minted tokens.
    pub fn auth(&mut self, auth: &AuthData) -> Result<(), Error> {
        let password = auth
            .password
            .as_deref()
            .ok_or_else(|| Error::Auth("password is required for api auth".to_string()))?;
        let top_level = self.login(&auth.login, password)?;
        let sids = self.enter_contest(&top_level, auth.contest_id)?;
        self.sids = Some(sids);
        Ok(())
    }

    pub fn contest_status(&self) -> Result<Value, Error> {
        self.call_json("contest-status-json", Vec::new())
    }

    pub fn problem_status(&self, prob_id: u32) -> Result<Value, Error> {
        self.call_json(
            "problem-status-json",
            vec![("problem".to_string(), prob_id.to_string())],
        )
    }

    /// Statement markup; not JSON.
    pub fn problem_statement(&self, prob_id: u32) -> Result<Vec<u8>, Error> {
        self.call_raw(
            "problem-statement-json",
            vec![("problem".to_string(), prob_id.to_string())],
        )
    }

    /// Newest runs first. Without a problem id the whole run list is
    /// returned.
    pub fn list_runs(&self, prob_id: Option<u32>) -> Result<Vec<Value>, Error> {
        let mut params = Vec::new();
        if let Some(prob_id) = prob_id {
            params.push(("prob_id".to_string(), prob_id.to_string()));
        }
        let result = self.call_json("list-runs-json", params)?;
        result
            .get("runs")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| Error::schema("RunList", "missing runs array"))
    }

    pub fn run_status(&self, run_id: u64) -> Result<RunStatus, Error> {
        let result = self.call_json(
            "run-status-json",
            vec![("run_id".to_string(), run_id.to_string())],
        )?;
        RunStatus::from_result(&result)
    }

    /// Submitted source; not JSON (unless the submission itself is).
    pub fn download_run(&self, run_id: u64) -> Result<Vec<u8>, Error> {
        self.call_raw(
            "download-run",
            vec![("run_id".to_string(), run_id.to_string())],
        )
    }

    pub fn run_messages(&self, run_id: u64) -> Result<Value, Error> {
        self.call_json(
            "run-messages-json",
            vec![("run_id".to_string(), run_id.to_string())],
        )
    }

    /// Upload a solution. Some problems accept submissions without a
    /// language id.
    pub fn submit(
        &self,
        prob_id: u32,
        file_name: &str,
        contents: Vec<u8>,
        lang_id: Option<u32>,
    ) -> Result<Value, Error> {
        let mut params = vec![("prob_id".to_string(), prob_id.to_string())];
        if let Some(lang_id) = lang_id {
            params.push(("lang_id".to_string(), lang_id.to_string()));
        }
        let files = vec![FilePart {
            field: "file".to_string(),
            file_name: file_name.to_string(),
            bytes: contents,
        }];
        self.call(
            CLIENT_CGI,
            "submit-run",
            Some(self.own_sids()?),
            true,
            params,
            files,
        )?
        .into_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedTransport;

    fn api(transport: ScriptedTransport) -> Api {
        Api::with_transport(
            Box::new(transport),
            Links::new("https://judge.example.org").unwrap(),
            Some(Sids {
                sid: "s1".to_string(),
                ejsid: "e1".to_string(),
            }),
        )
    }

    #[test]
    fn call_carries_action_json_and_tokens() {
        let transport = ScriptedTransport::new();
        transport.push_json(r#"{"ok": true, "result": {"x": 1}}"#);
        let requests = transport.requests();
        let api = api(transport);
        let result = api.contest_status().unwrap();
        assert_eq!(result["x"], 1);

        let reqs = requests.borrow();
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].url.ends_with("/cgi-bin/new-client"));
        assert_eq!(reqs[0].form_param("action"), Some("contest-status-json"));
        assert_eq!(reqs[0].form_param("json"), Some("1"));
        assert_eq!(reqs[0].form_param("SID"), Some("s1"));
        assert_eq!(reqs[0].form_param("EJSID"), Some("e1"));
    }

    #[test]
    fn error_envelope_surfaces_code_and_message() {
        let transport = ScriptedTransport::new();
        transport.push_json(r#"{"ok": false, "error": {"num": 148, "message": "Invalid session"}}"#);
        let err = api(transport).contest_status().unwrap_err();
        assert!(err.is_invalid_session());
        match err {
            Error::Api { code, message } => {
                assert_eq!(code, 148);
                assert_eq!(message, "Invalid session");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn undecodable_json_is_invalid_response() {
        let transport = ScriptedTransport::new();
        transport.push_body(b"<html>oops</html>".to_vec());
        let err = api(transport).contest_status().unwrap_err();
        assert!(matches!(
            err,
            Error::Api {
                code: api_code::INVALID_RESPONSE,
                ..
            }
        ));
    }

    #[test]
    fn raw_method_passes_non_json_through() {
        let transport = ScriptedTransport::new();
        transport.push_body(b"#include <stdio.h>\n".to_vec());
        let bytes = api(transport).download_run(12).unwrap();
        assert_eq!(bytes, b"#include <stdio.h>\n".to_vec());
    }

    #[test]
    fn raw_method_rejects_json_envelopes() {
        // An expired session during a download comes back as an envelope.
        let transport = ScriptedTransport::new();
        transport.push_json(r#"{"ok": false, "error": {"num": 148, "message": "Invalid session"}}"#);
        let err = api(transport).download_run(12).unwrap_err();
        assert!(err.is_invalid_session());
    }

    #[test]
    fn login_chain_mints_contest_tokens() {
        let transport = ScriptedTransport::new();
        transport.push_json(r#"{"ok": true, "result": {"SID": "top", "EJSID": "tope"}}"#);
        transport.push_json(r#"{"ok": true, "result": {"SID": "in", "EJSID": "ine"}}"#);
        let requests = transport.requests();
        let mut api = Api::with_transport(
            Box::new(transport),
            Links::new("https://judge.example.org").unwrap(),
            None,
        );
        api.auth(&AuthData {
            login: "judge01".to_string(),
            password: Some("hunter2".to_string()),
            contest_id: 130,
            judge: true,
        })
        .unwrap();

        let sids = api.sids().unwrap();
        assert_eq!(sids.sid, "in");
        assert_eq!(sids.ejsid, "ine");

        let reqs = requests.borrow();
        assert_eq!(reqs.len(), 2);
        assert!(reqs[0].url.ends_with("/cgi-bin/register"));
        assert_eq!(reqs[0].form_param("action"), Some("login-json"));
        assert_eq!(reqs[0].form_param("SID"), None);
        assert_eq!(reqs[1].form_param("action"), Some("enter-contest-json"));
        assert_eq!(reqs[1].form_param("SID"), Some("top"));
        assert_eq!(reqs[1].form_param("contest_id"), Some("130"));
    }

    #[test]
    fn auth_without_password_fails_locally() {
        let transport = ScriptedTransport::new();
        let requests = transport.requests();
        let mut api = Api::with_transport(
            Box::new(transport),
            Links::new("https://judge.example.org").unwrap(),
            None,
        );
        let err = api
            .auth(&AuthData {
                login: "judge01".to_string(),
                password: None,
                contest_id: 130,
                judge: true,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(requests.borrow().is_empty());
    }

    #[test]
    fn list_runs_unwraps_the_runs_array() {
        let transport = ScriptedTransport::new();
        transport.push_json(r#"{"ok": true, "result": {"runs": [{"run_id": 1}, {"run_id": 2}]}}"#);
        let runs = api(transport).list_runs(Some(3)).unwrap();
        assert_eq!(runs.len(), 2);
    }
}
