//! Response envelope decoding
//!
//! Every webservice response is `{"success": bool, ...}`: success carries a
//! `result`, failure carries `error: {code, message}`. Anything else,
//! including a body that is not JSON at all, decodes to `Malformed` so callers
//! match once instead of probing fields.

use serde::Deserialize;
use serde_json::Value;

/// Error code the remote service uses when a session name is no longer valid.
pub const INVALID_SESSION_CODE: &str = "INVALID_SESSIONID";

/// Longest body excerpt kept in error messages and logs.
const MAX_BODY_EXCERPT: usize = 256;

/// A decoded webservice response.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success(Value),
    Failure { code: String, message: String },
    Malformed { raw: String },
}

#[derive(Deserialize)]
struct RawEnvelope {
    success: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RawError>,
}

#[derive(Deserialize)]
struct RawError {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

impl Envelope {
    /// Decode a raw response body.
    ///
    /// A success envelope without a `result` (or with `result: null`) and a
    /// failure envelope without an error code are both treated as malformed.
    pub fn decode(body: &str) -> Self {
        let raw: RawEnvelope = match serde_json::from_str(body) {
            Ok(raw) => raw,
            Err(_) => return Self::malformed(body),
        };

        if raw.success {
            return match raw.result {
                Some(Value::Null) | None => Self::malformed(body),
                Some(result) => Envelope::Success(result),
            };
        }

        let Some(error) = raw.error else {
            return Self::malformed(body);
        };
        let code = match error.code {
            Some(Value::String(code)) => code,
            Some(Value::Null) | None => return Self::malformed(body),
            Some(other) => other.to_string(),
        };
        Envelope::Failure {
            code,
            message: error.message.unwrap_or_default(),
        }
    }

    /// True for a failure envelope reporting an invalid session.
    pub fn is_invalid_session(&self) -> bool {
        matches!(self, Envelope::Failure { code, .. } if code == INVALID_SESSION_CODE)
    }

    fn malformed(body: &str) -> Self {
        Envelope::Malformed {
            raw: truncate_body(body),
        }
    }
}

/// Shorten a response body for diagnostics, respecting char boundaries.
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
