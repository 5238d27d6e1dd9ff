//! Error taxonomy shared by the whole crate.

/// Numeric codes carried by [`Error::Api`].
///
/// Positive codes come from the server's error envelope; the negative ones
/// are assigned locally for conditions the server does not report itself.
pub mod api_code {
    /// Server reported an error without a usable `num` field.
    pub const UNKNOWN: i32 = -1;
    /// A JSON response was required but the body could not be decoded.
    pub const INVALID_RESPONSE: i32 = -2;
    /// The session tokens are expired or unknown to the server.
    pub const INVALID_SESSION: i32 = 148;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("page is not available without judge privileges")]
    Access,

    #[error("ejudge is not available: {0}")]
    ServiceUnavailable(String),

    #[error("api error {code}: {message}")]
    Api { code: i32, message: String },

    #[error("cannot parse field `{field}` from {value:?}")]
    Parse { field: &'static str, value: String },

    #[error("{entity} record does not match the expected schema: {detail}")]
    SchemaMismatch {
        entity: &'static str,
        detail: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("state store error: {0}")]
    Storage(String),
}

impl Error {
    pub(crate) fn parse(field: &'static str, value: &str) -> Error {
        Error::Parse {
            field,
            value: value.to_string(),
        }
    }

    pub(crate) fn schema(entity: &'static str, detail: impl Into<String>) -> Error {
        Error::SchemaMismatch {
            entity,
            detail: detail.into(),
        }
    }

    /// True for the one API error that is handled internally by re-auth.
    pub fn is_invalid_session(&self) -> bool {
        matches!(
            self,
            Error::Api {
                code: api_code::INVALID_SESSION,
                ..
            }
        )
    }
}
