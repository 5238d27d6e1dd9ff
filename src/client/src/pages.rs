//! Identifiers of the HTML interface pages.
//!
//! Every page request carries `action=<id>` in the query string. The ids
//! mirror the server's action table; only the actions this crate uses are
//! listed, the catalogue is much larger.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Page {
    Main,
    ViewSource,
    SendComment,
    ResetRunFilter,
    SetRunStatus,
    RejudgeDisplayedConfirm,
    RejudgeProblemConfirm,
    ResetClarFilter,
    RejudgeDisplayed,
    RejudgeProblem,
    DownloadSource,
    IgnoreWithComment,
    OkWithComment,
    SummonWithComment,
    RejectWithComment,
    ChangeRunProbId,
    ChangeRunLanguage,
    ChangeRunScore,
    ChangeRunScoreAdj,
    EditRunForm,
    EditRun,
    UsersAjax,
    DownloadArchiveForm,
    DownloadArchive,
}

impl Page {
    pub fn action_id(self) -> u32 {
        match self {
            Page::Main => 2,
            Page::ViewSource => 36,
            Page::SendComment => 64,
            Page::ResetRunFilter => 65,
            Page::SetRunStatus => 67,
            Page::RejudgeDisplayedConfirm => 68,
            Page::RejudgeProblemConfirm => 69,
            Page::ResetClarFilter => 73,
            Page::RejudgeDisplayed => 74,
            Page::RejudgeProblem => 75,
            Page::DownloadSource => 91,
            Page::IgnoreWithComment => 92,
            Page::OkWithComment => 93,
            Page::SummonWithComment => 94,
            Page::RejectWithComment => 95,
            Page::ChangeRunProbId => 144,
            Page::ChangeRunLanguage => 145,
            Page::ChangeRunScore => 146,
            Page::ChangeRunScoreAdj => 147,
            Page::EditRunForm => 152,
            Page::EditRun => 153,
            Page::UsersAjax => 278,
            Page::DownloadArchiveForm => 282,
            Page::DownloadArchive => 283,
        }
    }

    /// Pages served only by the master interface. Requesting one of these on
    /// a non-judge session fails locally, before any network call: the server
    /// would reject it anyway, but with an error shape that is useless to
    /// callers.
    pub fn judge_only(self) -> bool {
        !matches!(self, Page::Main)
    }
}
