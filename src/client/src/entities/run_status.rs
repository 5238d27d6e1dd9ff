use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;
use crate::parse;

const NO_COMPILER_OUTPUT: &str = "Compiler output is not available";
const BAD_COMPILER_OUTPUT: &str = "Cannot decode compiler output";

/// Per-test outcome inside a testing report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TestResult {
    pub num: i32,
    pub status: i32,
}

/// Decoded `run-status-json` response.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatus {
    pub status: i32,
    pub tests: Vec<TestResult>,
    pub compiler_output: String,
}

impl RunStatus {
    pub const COMPILING: i32 = 98;
    pub const COMPILED: i32 = 97;
    pub const RUNNING: i32 = 96;

    // This group also appears in per-test results.
    pub const OK: i32 = 0;
    pub const CE: i32 = 1;
    pub const RE: i32 = 2;
    pub const TL: i32 = 3;
    pub const PE: i32 = 4;
    pub const WA: i32 = 5;
    pub const ML: i32 = 12;
    pub const WT: i32 = 15;

    pub const CHECK_FAILED: i32 = 6;
    pub const PARTIAL: i32 = 7;
    pub const ACCEPTED: i32 = 8;
    pub const IGNORED: i32 = 9;
    pub const DISQUALIFIED: i32 = 10;
    pub const PENDING: i32 = 11;
    pub const SEC_ERR: i32 = 13;
    pub const STYLE_ERR: i32 = 14;
    pub const PENDING_REVIEW: i32 = 16;
    pub const REJECTED: i32 = 17;
    pub const SKIPPED: i32 = 18;
    pub const SYNC_ERR: i32 = 19;
    pub const SUMMONED: i32 = 23;

    pub const FULL_REJUDGE: i32 = 95;
    pub const REJUDGE: i32 = 99;
    pub const NO_CHANGE: i32 = 100;

    pub fn description(code: i32) -> String {
        let known = match code {
            Self::COMPILING => "Compiling",
            Self::COMPILED => "Compiled",
            Self::RUNNING => "Running",
            Self::OK => "OK",
            Self::CE => "Compilation error",
            Self::RE => "Runtime error",
            Self::TL => "Time limit exceeded",
            Self::PE => "Presentation error",
            Self::WA => "Wrong answer",
            Self::ML => "Memory limit exceeded",
            Self::WT => "Wall time-limit exceeded",
            Self::CHECK_FAILED => "Check failed",
            Self::PARTIAL => "Partial solution",
            Self::ACCEPTED => "Accepted for testing",
            Self::IGNORED => "Ignored",
            Self::DISQUALIFIED => "Disqualified",
            Self::PENDING => "Pending check",
            Self::SEC_ERR => "Security violation",
            Self::STYLE_ERR => "Coding style violation",
            Self::PENDING_REVIEW => "Pending review",
            Self::REJECTED => "Rejected",
            Self::SKIPPED => "Skipped",
            Self::SYNC_ERR => "Synchronization error",
            Self::SUMMONED => "Summoned for defence",
            Self::FULL_REJUDGE => "Full rejudge",
            Self::REJUDGE => "Rejudge",
            Self::NO_CHANGE => "No change",
            _ => return format!("Unknown status {}", code),
        };
        known.to_string()
    }

    /// Decode the API result object. The status code is mandatory; the
    /// testing report and compiler output are optional sections.
    pub fn from_result(result: &Value) -> Result<RunStatus, Error> {
        let status = result
            .get("run")
            .and_then(|run| run.get("status"))
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::schema("RunStatus", "missing run.status"))?
            as i32;

        let tests = match result
            .get("testing_report")
            .and_then(|report| report.get("tests"))
        {
            Some(tests) => serde_json::from_value(tests.clone())
                .map_err(|e| Error::schema("RunStatus", format!("bad testing report: {}", e)))?,
            None => Vec::new(),
        };

        let compiler_output = match result
            .get("compiler_output")
            .and_then(|output| output.get("content"))
            .and_then(|content| content.get("data"))
        {
            Some(data) => {
                let data = data.as_str().unwrap_or_default();
                parse::base64_text(data, BAD_COMPILER_OUTPUT)
            }
            None => NO_COMPILER_OUTPUT.to_string(),
        };

        Ok(RunStatus {
            status,
            tests,
            compiler_output,
        })
    }

    /// The 95..=99 band covers every "still being judged" state.
    pub fn is_testing(&self) -> bool {
        (95..=99).contains(&self.status)
    }

    pub fn with_tests(&self, failed_only: bool) -> String {
        if self.tests.is_empty() {
            return self.to_string();
        }
        let mut out = self.to_string();
        for test in &self.tests {
            if failed_only && (test.status == Self::OK || test.status == Self::SKIPPED) {
                continue;
            }
            out.push('\n');
            out.push_str(&format!("{} - {}", test.num, Self::description(test.status)));
        }
        out
    }

    pub fn with_compiler_output(&self) -> String {
        format!("{}\n\nCompiler output:\n{}", self, self.compiler_output)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Self::description(self.status))
    }
}
