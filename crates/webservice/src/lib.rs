//! Transport abstraction for the vtiger webservice endpoint
//!
//! Defines the `Transport` trait that decouples the session dispatcher from
//! the HTTP client. `HttpTransport` is the reqwest-backed implementation;
//! `ScriptedTransport` (feature `test-util`) answers from a closure so the
//! pool and auth crates can be exercised without a network.
//!
//! Response bodies are decoded once, at this boundary, into an `Envelope`.

pub mod envelope;
pub mod http;
pub mod resolver;
#[cfg(feature = "test-util")]
pub mod scripted;

pub use envelope::{Envelope, INVALID_SESSION_CODE, truncate_body};
pub use http::HttpTransport;
pub use resolver::{OperationResolver, ResolveError, StaticResolver, operation_name};
#[cfg(feature = "test-util")]
pub use scripted::ScriptedTransport;

use std::future::Future;
use std::pin::Pin;

/// Relative path of the webservice entry point on the remote host.
pub const WEBSERVICE_PATH: &str = "webservice.php";

/// HTTP method, derived from the request options rather than set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A single outbound call.
///
/// `form` present means a form-encoded POST; absent means a GET carrying only
/// `query`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
}

impl RequestOptions {
    /// GET request to `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Form POST to `path`.
    pub fn post(path: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
            form: Some(form),
        }
    }

    /// Append a query-string parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn method(&self) -> Method {
        if self.form.is_some() {
            Method::Post
        } else {
            Method::Get
        }
    }

    /// Look up a parameter by name, form fields first, then the query string.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .flatten()
            .chain(self.query.iter())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Errors from the transport itself. Never retried by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),
}

/// Result alias for transport calls.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Performs the network round trip for one request.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`), so the dispatcher can be handed any implementation.
pub trait Transport: Send + Sync {
    /// Send the request and return the raw response body.
    fn call<'a>(
        &'a self,
        options: &'a RequestOptions,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}
