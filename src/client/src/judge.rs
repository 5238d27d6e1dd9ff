//! Judge-only operations: filtered list queries, user listing, bulk
//! rejudge and run mutations.
//!
//! The list queries are stateful on the server side: it keeps the filter of
//! the previous query per session. Whenever a filter component that used to
//! be set becomes unset, a dedicated reset request has to be issued first,
//! otherwise the server silently serves the tail of the previous filter.
//! Which components were set last time is tracked in the durable state so
//! the dance works across process invocations.

use serde_json::Value;

use crate::entities::{Clar, RunStatus, Submission, User};
use crate::error::Error;
use crate::html;
use crate::pages::Page;
use crate::session::EjudgeSession;

/// Server-side clarification filter modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarFilter {
    All,
    Unanswered,
    AllWithComments,
    ToAll,
}

impl ClarFilter {
    fn mode(self) -> u32 {
        match self {
            ClarFilter::All => 1,
            ClarFilter::Unanswered => 2,
            ClarFilter::AllWithComments => 3,
            ClarFilter::ToAll => 4,
        }
    }
}

fn require_judge(session: &EjudgeSession) -> Result<(), Error> {
    if session.is_judge() {
        Ok(())
    } else {
        Err(Error::Access)
    }
}

/// A component going from set to unset forces a server-side reset.
fn needs_filter_reset(old: &[bool], new: &[bool]) -> bool {
    old.iter().zip(new).any(|(old, new)| *old && !*new)
}

fn reset_button(page: Page) -> (String, String) {
    (
        format!("action_{}", page.action_id()),
        "Reset filter".to_string(),
    )
}

/// Filtered view of the submissions table.
///
/// `filter` is a server-side filter expression; `first_run`/`last_run`
/// slice the filtered list (negative indices count from the end, index
/// order controls direction — reverse-engineered server semantics).
/// `None` means the filter produced no table: an empty match or a bad
/// expression, not a failure.
pub fn submissions(
    session: &mut EjudgeSession,
    filter: Option<&str>,
    first_run: Option<i64>,
    last_run: Option<i64>,
) -> Result<Option<Vec<Submission>>, Error> {
    require_judge(session)?;

    let filter = filter.filter(|expr| !expr.is_empty());
    let status = [filter.is_some(), first_run.is_some(), last_run.is_some()];
    let old = session.store().open()?.filters().runs;

    let mut page = None;
    if needs_filter_reset(&old, &status) {
        tracing::debug!("runs filter narrowed, resetting server-side state");
        let button = reset_button(Page::ResetRunFilter);
        page = Some(session.get_page(Page::Main, &[(button.0.as_str(), button.1.clone())])?);
    }
    {
        let mut guard = session.store().open()?;
        guard.filters_mut().runs = status;
        guard.save()?;
    }

    // The reset response doubles as the answer when nothing is filtered.
    let page = match page {
        Some(page) if status.iter().all(|set| !set) => page,
        _ => {
            let mut params: Vec<(&str, String)> = Vec::new();
            if let Some(expr) = filter {
                params.push(("filter_expr", expr.to_string()));
            }
            if let Some(first) = first_run {
                params.push(("filter_first_run", first.to_string()));
            }
            if let Some(last) = last_run {
                params.push(("filter_last_run", last.to_string()));
            }
            session.get_page(Page::Main, &params)?
        }
    };

    let server_tz = session.server_tz()?;
    let body = String::from_utf8_lossy(&page.body).into_owned();
    let rows = match html::extract_table(&body, "Submissions", "b1") {
        Some(rows) => rows,
        None => return Ok(None),
    };
    rows.iter()
        .skip(1)
        .map(|cells| Submission::from_row(cells, server_tz))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Filtered view of the clarifications table.
///
/// `first_clar` indexes the unfiltered list; `last_clar` is actually a
/// count whose sign selects the direction (reverse-engineered server
/// semantics, see the submissions query for the same caveat).
pub fn clars(
    session: &mut EjudgeSession,
    filter: ClarFilter,
    first_clar: Option<i64>,
    last_clar: Option<i64>,
) -> Result<Option<Vec<Clar>>, Error> {
    require_judge(session)?;

    let status = [first_clar.is_some(), last_clar.is_some()];
    let old = session.store().open()?.filters().clars;

    let mut page = None;
    if needs_filter_reset(&old, &status) {
        tracing::debug!("clars filter narrowed, resetting server-side state");
        let button = reset_button(Page::ResetClarFilter);
        page = Some(session.get_page(Page::Main, &[(button.0.as_str(), button.1.clone())])?);
    }
    {
        let mut guard = session.store().open()?;
        guard.filters_mut().clars = status;
        guard.save()?;
    }

    // The reset response lists unanswered clars, so it can only stand in
    // for the default query.
    let page = match page {
        Some(page)
            if status.iter().all(|set| !set) && filter == ClarFilter::Unanswered =>
        {
            page
        }
        _ => {
            let mut params: Vec<(&str, String)> =
                vec![("filter_mode_clar", filter.mode().to_string())];
            if let Some(first) = first_clar {
                params.push(("filter_first_clar", first.to_string()));
            }
            if let Some(last) = last_clar {
                params.push(("filter_last_clar", last.to_string()));
            }
            session.get_page(Page::Main, &params)?
        }
    };

    let server_tz = session.server_tz()?;
    let body = String::from_utf8_lossy(&page.body).into_owned();
    let rows = match html::extract_table(&body, "Messages", "b1") {
        Some(rows) => rows,
        None => return Ok(None),
    };
    rows.iter()
        .skip(1)
        .map(|cells| Clar::from_row(cells, server_tz))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Users from the "Regular users" tab, served as AJAX JSON.
pub fn users(
    session: &mut EjudgeSession,
    show_not_ok: bool,
    show_invisible: bool,
    show_banned: bool,
    show_only_pending: bool,
) -> Result<Vec<User>, Error> {
    require_judge(session)?;

    fn flag(value: bool) -> String {
        (value as u8).to_string()
    }
    let resp = session.get_page(
        Page::UsersAjax,
        &[
            ("show_not_ok", flag(show_not_ok)),
            ("show_invisible", flag(show_invisible)),
            ("show_banned", flag(show_banned)),
            ("show_only_pending", flag(show_only_pending)),
        ],
    )?;
    let value: Value = serde_json::from_slice(&resp.body)
        .map_err(|e| Error::schema("UserList", format!("not a json response: {}", e)))?;
    let records = match value.get("data").and_then(Value::as_array) {
        Some(records) => records,
        None => return Ok(Vec::new()),
    };
    records.iter().map(User::parse).collect()
}

/// Bitmask chunks of a run id set: bit `id % 64` inside chunk `id / 64`.
fn rejudge_mask(ids: &[u64]) -> Vec<u64> {
    let mut mask: Vec<u64> = Vec::new();
    for &id in ids {
        let chunk = (id / 64) as usize;
        if mask.len() <= chunk {
            mask.resize(chunk + 1, 0);
        }
        mask[chunk] |= 1 << (id % 64);
    }
    mask
}

fn format_mask(mask: &[u64]) -> String {
    mask.iter()
        .map(|chunk| format!("{:x}", chunk))
        .collect::<Vec<_>>()
        .join("+")
}

/// Queue the given runs for re-judging.
pub fn rejudge_runs(session: &mut EjudgeSession, ids: &[u64]) -> Result<(), Error> {
    require_judge(session)?;

    let mask = rejudge_mask(ids);
    session.post_page(
        Page::RejudgeDisplayed,
        &[
            ("run_mask_size", mask.len().to_string()),
            ("run_mask", format_mask(&mask)),
        ],
    )?;
    Ok(())
}

/// Raw source of a run, as submitted.
pub fn run_source(session: &mut EjudgeSession, run_id: u64) -> Result<Vec<u8>, Error> {
    let resp = session.get_page(Page::DownloadSource, &[("run_id", run_id.to_string())])?;
    Ok(resp.body)
}

/// Source view page markup (syntax-highlighted rendering of the run).
pub fn view_source(session: &mut EjudgeSession, run_id: u64) -> Result<Vec<u8>, Error> {
    let resp = session.get_page(Page::ViewSource, &[("run_id", run_id.to_string())])?;
    Ok(resp.body)
}

/// Comment actions double as status changes; only a fixed set of statuses
/// has a combined action.
fn comment_page(status: Option<i32>) -> Result<Page, Error> {
    match status {
        None => Ok(Page::SendComment),
        Some(RunStatus::IGNORED) => Ok(Page::IgnoreWithComment),
        Some(RunStatus::OK) => Ok(Page::OkWithComment),
        Some(RunStatus::REJECTED) => Ok(Page::RejectWithComment),
        Some(RunStatus::SUMMONED) => Ok(Page::SummonWithComment),
        Some(other) => Err(Error::InvalidArgument(format!(
            "unsupported status for a comment: {}",
            other
        ))),
    }
}

/// Mutations post to the run's hidden form actions. None of them updates
/// the decoded snapshot; re-fetch the table to observe the effect.
impl Submission {
    pub fn set_status(&self, session: &mut EjudgeSession, status: i32) -> Result<(), Error> {
        session.post_page(
            Page::SetRunStatus,
            &[
                ("run_id", self.id.to_string()),
                ("status", status.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn set_lang(&self, session: &mut EjudgeSession, lang_id: u32) -> Result<(), Error> {
        session.post_page(
            Page::ChangeRunLanguage,
            &[
                ("run_id", self.id.to_string()),
                ("param", lang_id.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn set_prob_id(&self, session: &mut EjudgeSession, prob_id: u32) -> Result<(), Error> {
        session.post_page(
            Page::ChangeRunProbId,
            &[
                ("run_id", self.id.to_string()),
                ("param", prob_id.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn set_score(&self, session: &mut EjudgeSession, score: i32) -> Result<(), Error> {
        session.post_page(
            Page::ChangeRunScore,
            &[
                ("run_id", self.id.to_string()),
                ("param", score.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn set_score_adj(&self, session: &mut EjudgeSession, score_adj: i32) -> Result<(), Error> {
        session.post_page(
            Page::ChangeRunScoreAdj,
            &[
                ("run_id", self.id.to_string()),
                ("param", score_adj.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn send_comment(
        &self,
        session: &mut EjudgeSession,
        comment: &str,
        status: Option<i32>,
    ) -> Result<(), Error> {
        let page = comment_page(status)?;
        session.post_page(
            page,
            &[
                ("run_id", self.id.to_string()),
                ("msg_text", comment.to_string()),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::config::AuthData;
    use crate::testutil::{scripted_session, ScriptedTransport};

    fn auth_data() -> AuthData {
        AuthData {
            login: "judge01".to_string(),
            password: Some("hunter2".to_string()),
            contest_id: 130,
            judge: true,
        }
    }

    fn runs_page() -> Vec<u8> {
        br#"<html><h2>Submissions</h2><table class="b1">
            <tr><th>Run ID</th><th>Time</th><th>Size</th><th>User</th><th>Problem</th>
                <th>Language</th><th>Result</th><th>Score</th><th>Score adj.</th></tr>
            <tr><td>12</td><td>2024/01/01 00:00:00</td><td>137</td><td>alice</td>
                <td>sm01-1</td><td>gcc</td><td>OK</td><td>100</td><td></td></tr>
        </table></html>"#
            .to_vec()
    }

    fn clars_page() -> Vec<u8> {
        br#"<html><h2>Messages</h2><table class="b1">
            <tr><th>Clar ID</th><th>Flags</th><th>Time</th><th>IP</th><th>Size</th>
                <th>From</th><th>To</th><th>Subject</th><th>View</th></tr>
            <tr><td>3</td><td>N</td><td>2024/01/01 12:00:00</td><td>10.0.0.1</td><td>80</td>
                <td>bob</td><td>judges</td><td>Help</td><td>View</td></tr>
        </table></html>"#
            .to_vec()
    }

    fn set_runs_filter(session: &EjudgeSession, tuple: [bool; 3]) {
        let mut guard = session.store().open().unwrap();
        guard.filters_mut().runs = tuple;
        guard.save().unwrap();
    }

    #[test]
    fn mask_chunks_follow_div_mod_64() {
        assert_eq!(rejudge_mask(&[0, 64, 130]), vec![0x1, 0x1, 0x4]);
        assert_eq!(format_mask(&[0x1, 0x1, 0x4]), "1+1+4");
    }

    #[test]
    fn mask_merges_ids_within_a_chunk() {
        assert_eq!(rejudge_mask(&[0, 1, 2, 65]), vec![0x7, 0x2]);
        // Duplicates must not carry into other bits.
        assert_eq!(rejudge_mask(&[3, 3]), vec![0x8]);
        assert!(rejudge_mask(&[]).is_empty());
    }

    #[test]
    fn reset_needed_only_when_narrowing() {
        assert!(!needs_filter_reset(
            &[true, false, false],
            &[true, false, false]
        ));
        assert!(needs_filter_reset(
            &[true, true, false],
            &[true, false, false]
        ));
        assert!(!needs_filter_reset(
            &[false, false, false],
            &[true, true, true]
        ));
        assert!(needs_filter_reset(&[false, true], &[true, false]));
    }

    #[test]
    fn unchanged_filter_issues_no_reset() {
        let transport = ScriptedTransport::new();
        transport.push_body(runs_page());
        let requests = transport.requests();
        let (mut session, _dir) = scripted_session(transport, Some(auth_data()), true);
        set_runs_filter(&session, [true, false, false]);

        let subs = submissions(&mut session, Some("prob == 'sm01-1'"), None, None)
            .unwrap()
            .unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, 12);
        assert_eq!(subs[0].user, "alice");

        let reqs = requests.borrow();
        assert_eq!(reqs.len(), 1, "no reset request");
        assert_eq!(
            reqs[0].query_param("filter_expr"),
            Some("prob == 'sm01-1'")
        );
    }

    #[test]
    fn narrowed_filter_resets_before_querying() {
        let transport = ScriptedTransport::new();
        transport.push_body(b"<html>reset ack</html>".to_vec());
        transport.push_body(runs_page());
        let requests = transport.requests();
        let (mut session, _dir) = scripted_session(transport, Some(auth_data()), true);
        set_runs_filter(&session, [true, true, false]);

        let subs = submissions(&mut session, Some("score > 0"), None, None)
            .unwrap()
            .unwrap();
        assert_eq!(subs.len(), 1);

        let reqs = requests.borrow();
        assert_eq!(reqs.len(), 2, "reset, then the substantive query");
        assert_eq!(reqs[0].query_param("action_65"), Some("Reset filter"));
        assert_eq!(reqs[1].query_param("filter_expr"), Some("score > 0"));

        // The new tuple is persisted.
        let guard = session.store().open().unwrap();
        assert_eq!(guard.filters().runs, [true, false, false]);
    }

    #[test]
    fn bare_query_reuses_the_reset_response() {
        let transport = ScriptedTransport::new();
        transport.push_body(runs_page());
        let requests = transport.requests();
        let (mut session, _dir) = scripted_session(transport, Some(auth_data()), true);
        set_runs_filter(&session, [true, false, false]);

        let subs = submissions(&mut session, None, None, None).unwrap().unwrap();
        assert_eq!(subs.len(), 1);

        let reqs = requests.borrow();
        assert_eq!(reqs.len(), 1, "the reset response is the answer");
        assert_eq!(reqs[0].query_param("action_65"), Some("Reset filter"));
    }

    #[test]
    fn missing_table_means_no_data() {
        let transport = ScriptedTransport::new();
        transport.push_body(b"<html><h2>Submissions</h2><p>Bad filter</p></html>".to_vec());
        let (mut session, _dir) = scripted_session(transport, Some(auth_data()), true);

        let subs = submissions(&mut session, Some("garbage ==="), None, None).unwrap();
        assert!(subs.is_none());
    }

    #[test]
    fn submissions_require_judge_mode() {
        let transport = ScriptedTransport::new();
        let requests = transport.requests();
        let (mut session, _dir) = scripted_session(transport, Some(auth_data()), false);
        let err = submissions(&mut session, None, None, None).unwrap_err();
        assert!(matches!(err, Error::Access));
        assert!(requests.borrow().is_empty());
    }

    #[test]
    fn clars_decode_with_default_filter() {
        let transport = ScriptedTransport::new();
        transport.push_body(clars_page());
        let requests = transport.requests();
        let (mut session, _dir) = scripted_session(transport, Some(auth_data()), true);

        let clars = clars(&mut session, ClarFilter::Unanswered, None, None)
            .unwrap()
            .unwrap();
        assert_eq!(clars.len(), 1);
        assert_eq!(clars[0].id, 3);
        assert_eq!(clars[0].from_user, "bob");

        let reqs = requests.borrow();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].query_param("filter_mode_clar"), Some("2"));
    }

    #[test]
    fn clar_reset_response_is_reused_only_for_default_mode() {
        // Narrowing with a non-default mode: reset, then re-query.
        let transport = ScriptedTransport::new();
        transport.push_body(b"<html>reset ack</html>".to_vec());
        transport.push_body(clars_page());
        let requests = transport.requests();
        let (mut session, _dir) = scripted_session(transport, Some(auth_data()), true);
        {
            let mut guard = session.store().open().unwrap();
            guard.filters_mut().clars = [true, true];
            guard.save().unwrap();
        }

        let result = clars(&mut session, ClarFilter::All, None, None).unwrap();
        assert!(result.is_some());
        let reqs = requests.borrow();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].query_param("action_73"), Some("Reset filter"));
        assert_eq!(reqs[1].query_param("filter_mode_clar"), Some("1"));
    }

    #[test]
    fn users_decode_from_ajax_json() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            r#"{"data": [{
                "user_id": 7, "user_login": "alice", "user_name": "Alice",
                "is_banned": 0, "is_invisible": 0, "is_locked": 0,
                "is_incomplete": 0, "is_disqualified": 0, "is_privileged": 0,
                "is_reg_readonly": 0,
                "run_count": 3, "run_size": 900, "clar_count": 0
            }]}"#,
        );
        let requests = transport.requests();
        let (mut session, _dir) = scripted_session(transport, Some(auth_data()), true);

        let users = users(&mut session, false, true, false, false).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].login, "alice");

        let reqs = requests.borrow();
        assert_eq!(reqs[0].query_param("show_invisible"), Some("1"));
        assert_eq!(reqs[0].query_param("show_banned"), Some("0"));
    }

    #[test]
    fn users_without_data_key_is_empty() {
        let transport = ScriptedTransport::new();
        transport.push_json(r#"{"status": "error"}"#);
        let (mut session, _dir) = scripted_session(transport, Some(auth_data()), true);
        assert!(users(&mut session, false, false, false, false)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn rejudge_posts_the_mask() {
        let transport = ScriptedTransport::new();
        transport.push_body(b"<html>ok</html>".to_vec());
        let requests = transport.requests();
        let (mut session, _dir) = scripted_session(transport, Some(auth_data()), true);

        rejudge_runs(&mut session, &[130, 0, 64]).unwrap();
        let reqs = requests.borrow();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].form_param("run_mask_size"), Some("3"));
        assert_eq!(reqs[0].form_param("run_mask"), Some("1+1+4"));
        assert_eq!(
            reqs[0].query_param("action"),
            Some(Page::RejudgeDisplayed.action_id().to_string()).as_deref()
        );
    }

    #[test]
    fn comment_page_mapping_is_exhaustive() {
        assert_eq!(comment_page(None).unwrap(), Page::SendComment);
        assert_eq!(
            comment_page(Some(RunStatus::IGNORED)).unwrap(),
            Page::IgnoreWithComment
        );
        assert_eq!(comment_page(Some(RunStatus::OK)).unwrap(), Page::OkWithComment);
        assert_eq!(
            comment_page(Some(RunStatus::REJECTED)).unwrap(),
            Page::RejectWithComment
        );
        assert_eq!(
            comment_page(Some(RunStatus::SUMMONED)).unwrap(),
            Page::SummonWithComment
        );
        assert!(matches!(
            comment_page(Some(RunStatus::WA)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn mutations_post_run_id_and_param() {
        let transport = ScriptedTransport::new();
        transport.push_body(b"<html>ok</html>".to_vec());
        let requests = transport.requests();
        let (mut session, _dir) = scripted_session(transport, Some(auth_data()), true);

        let submission = Submission {
            id: 12,
            time: chrono::FixedOffset::east_opt(3 * 3600)
                .unwrap()
                .with_ymd_and_hms(2024, 1, 1, 3, 0, 0)
                .unwrap(),
            size: 137,
            user: "alice".to_string(),
            problem: "sm01-1".to_string(),
            lang: "gcc".to_string(),
            status: "Pending review".to_string(),
            score: Some(90),
            score_adj: None,
        };
        submission
            .send_comment(&mut session, "nice proof", Some(RunStatus::OK))
            .unwrap();

        let reqs = requests.borrow();
        assert_eq!(
            reqs[0].query_param("action"),
            Some(Page::OkWithComment.action_id().to_string()).as_deref()
        );
        assert_eq!(reqs[0].form_param("run_id"), Some("12"));
        assert_eq!(reqs[0].form_param("msg_text"), Some("nice proof"));
    }
}
