use serde::{Deserialize, Deserializer};

use crate::error::Error;
use crate::parse;

/// Subset of the user record served by the users AJAX endpoint.
///
/// Keys the server sends but this client has no use for (row serial,
/// registration/login timestamps, `result_score`) are not mapped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct User {
    #[serde(rename = "user_id")]
    pub id: u64,
    #[serde(rename = "user_login")]
    pub login: String,
    #[serde(rename = "user_name", deserialize_with = "de_name")]
    pub name: String,
    #[serde(default, deserialize_with = "de_flag")]
    pub is_banned: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub is_invisible: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub is_locked: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub is_incomplete: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub is_disqualified: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub is_privileged: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub is_reg_readonly: bool,
    pub run_count: u64,
    pub run_size: u64,
    pub clar_count: u64,
}

fn de_name<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    let raw = String::deserialize(de)?;
    Ok(parse::fix_encoding(&raw))
}

fn de_flag<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(de)?;
    Ok(parse::presence_flag(value.as_ref()))
}

impl User {
    pub fn parse(record: &serde_json::Value) -> Result<User, Error> {
        serde_json::from_value(record.clone())
            .map_err(|e| Error::schema("User", e.to_string()))
    }
}
