//! Challenge and login calls
//!
//! Handles the two authentication round trips against `webservice.php`:
//! 1. `GET ?operation=getchallenge&username=...` → token + lifetime
//! 2. `POST operation=login, username, accessKey` → session name
//!
//! Both decode the shared envelope; a failure envelope is a rejection, an
//! unparseable body or a success missing required fields is malformed.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use webservice::{Envelope, RequestOptions, Transport, WEBSERVICE_PATH, truncate_body};

use crate::constants::{CHALLENGE_OPERATION, LOGIN_OPERATION};
use crate::error::{Error, Result};

/// Result payload of `getchallenge`.
///
/// `expire_time` and `server_time` are both server-side unix seconds; only
/// their difference is meaningful locally.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub token: String,
    pub expire_time: i64,
    pub server_time: i64,
}

impl ChallengeResponse {
    /// Relative token lifetime. Negative offsets clamp to zero.
    pub fn lifetime(&self) -> Duration {
        let secs = self.expire_time.saturating_sub(self.server_time).max(0);
        Duration::from_secs(secs as u64)
    }
}

/// Result payload of `login`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session_name: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Ask the service for a challenge token.
pub async fn request_challenge(
    transport: &dyn Transport,
    username: &str,
) -> Result<ChallengeResponse> {
    let options = RequestOptions::get(WEBSERVICE_PATH)
        .with_query("operation", CHALLENGE_OPERATION)
        .with_query("username", username);

    let body = transport.call(&options).await?;
    match Envelope::decode(&body) {
        Envelope::Success(result) => {
            let challenge: ChallengeResponse = serde_json::from_value(result)
                .map_err(|_| malformed(CHALLENGE_OPERATION, &body))?;
            if challenge.token.is_empty() {
                return Err(malformed(CHALLENGE_OPERATION, &body));
            }
            debug!(
                lifetime_secs = challenge.lifetime().as_secs(),
                "challenge token received"
            );
            Ok(challenge)
        }
        Envelope::Failure { code, message } => Err(Error::ChallengeRejected { code, message }),
        Envelope::Malformed { raw } => Err(Error::MalformedResponse {
            operation: CHALLENGE_OPERATION.into(),
            body: raw,
        }),
    }
}

/// Log in with a precomputed access key and return the new session.
///
/// A failure envelope means the token (or the credentials) were refused;
/// callers usually invalidate the token and start over.
pub async fn login(
    transport: &dyn Transport,
    username: &str,
    access_key: &str,
) -> Result<LoginResponse> {
    let options = RequestOptions::post(
        WEBSERVICE_PATH,
        vec![
            ("operation".into(), LOGIN_OPERATION.into()),
            ("username".into(), username.into()),
            ("accessKey".into(), access_key.into()),
        ],
    );

    let body = transport.call(&options).await?;
    match Envelope::decode(&body) {
        Envelope::Success(result) => {
            let response: LoginResponse = serde_json::from_value(result)
                .map_err(|_| malformed(LOGIN_OPERATION, &body))?;
            if response.session_name.is_empty() {
                return Err(malformed(LOGIN_OPERATION, &body));
            }
            Ok(response)
        }
        Envelope::Failure { code, message } => Err(Error::LoginRejected { code, message }),
        Envelope::Malformed { raw } => Err(Error::MalformedResponse {
            operation: LOGIN_OPERATION.into(),
            body: raw,
        }),
    }
}

fn malformed(operation: &str, body: &str) -> Error {
    Error::MalformedResponse {
        operation: operation.into(),
        body: truncate_body(body),
    }
}
