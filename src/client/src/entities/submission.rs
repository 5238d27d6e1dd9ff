use chrono::{DateTime, FixedOffset};

use crate::error::Error;
use crate::parse;

/// One row of the privileged submissions table.
///
/// A snapshot: mutation requests (status, score, …) go through the session
/// and do not touch decoded values, so callers re-fetch after mutating.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub id: u64,
    pub time: DateTime<FixedOffset>,
    pub size: u64,
    pub user: String,
    pub problem: String,
    pub lang: String,
    pub status: String,
    pub score: Option<i32>,
    pub score_adj: Option<i32>,
}

/// Cell layout of the runs table on the master main page.
const CELLS: usize = 9;

impl Submission {
    pub fn from_row(cells: &[String], server_tz: FixedOffset) -> Result<Submission, Error> {
        if cells.len() < CELLS {
            return Err(Error::schema(
                "Submission",
                format!("expected {} cells, got {}", CELLS, cells.len()),
            ));
        }
        Ok(Submission {
            id: parse::run_id("id", &cells[0])?,
            time: parse::local_datetime("time", &cells[1], server_tz)?,
            size: parse::int("size", &cells[2])?,
            user: cells[3].trim().to_string(),
            problem: cells[4].trim().to_string(),
            lang: cells[5].trim().to_string(),
            status: cells[6].trim().to_string(),
            score: parse::opt_int("score", &cells[7])?,
            score_adj: parse::opt_int("score_adj", &cells[8])?,
        })
    }
}
