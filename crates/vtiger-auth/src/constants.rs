//! Webservice operation names used during authentication

/// Operation that issues a challenge token for a username.
pub const CHALLENGE_OPERATION: &str = "getchallenge";

/// Operation that exchanges an access key for a session name.
pub const LOGIN_OPERATION: &str = "login";
