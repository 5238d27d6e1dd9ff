use chrono::{DateTime, FixedOffset};

use crate::error::Error;
use crate::parse;

/// Answer-state marker of a clarification row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClarFlag {
    /// Empty cell.
    None,
    /// `N` - not answered yet.
    Unanswered,
    /// `A` - answered.
    Answered,
    /// `R` - reserved by the server, not seen in the wild.
    Reserved,
}

impl ClarFlag {
    fn from_cell(field: &'static str, raw: &str) -> Result<ClarFlag, Error> {
        match raw.trim() {
            "" => Ok(ClarFlag::None),
            "N" => Ok(ClarFlag::Unanswered),
            "A" => Ok(ClarFlag::Answered),
            "R" => Ok(ClarFlag::Reserved),
            other => Err(Error::parse(field, other)),
        }
    }
}

/// One row of the clarifications table. Immutable after parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Clar {
    pub id: u64,
    pub flags: ClarFlag,
    /// Converted from the server timezone to the display timezone.
    pub time: DateTime<FixedOffset>,
    pub ip: String,
    pub size: u64,
    pub from_user: String,
    pub to: String,
    pub subject: String,
    pub details: String,
}

const CELLS: usize = 9;

impl Clar {
    pub fn from_row(cells: &[String], server_tz: FixedOffset) -> Result<Clar, Error> {
        if cells.len() < CELLS {
            return Err(Error::schema(
                "Clar",
                format!("expected {} cells, got {}", CELLS, cells.len()),
            ));
        }
        Ok(Clar {
            id: parse::int("id", &cells[0])?,
            flags: ClarFlag::from_cell("flags", &cells[1])?,
            time: parse::local_datetime("time", &cells[2], server_tz)?,
            ip: cells[3].trim().to_string(),
            size: parse::int("size", &cells[4])?,
            from_user: cells[5].trim().to_string(),
            to: cells[6].trim().to_string(),
            subject: cells[7].trim().to_string(),
            details: cells[8].trim().to_string(),
        })
    }
}
