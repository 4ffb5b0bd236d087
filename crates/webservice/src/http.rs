//! reqwest-backed transport
//!
//! Joins `host` and the request path, encodes the query string into the URL,
//! and sends a form POST when form fields are present (GET otherwise). A
//! non-2xx status is reported as `TransportError::Status` with a body excerpt.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{ACCEPT, USER_AGENT};
use tracing::debug;

use crate::{RequestOptions, Result, Transport, TransportError, truncate_body};

/// User-Agent sent on every request.
const USER_AGENT_VALUE: &str = concat!("vtiger-gateway/", env!("CARGO_PKG_VERSION"));

/// HTTP transport for a single remote host.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    host: String,
    timeout: Duration,
}

impl HttpTransport {
    /// `host` is the base URL, e.g. `https://crm.example.com`.
    pub fn new(client: reqwest::Client, host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            host: host.into(),
            timeout,
        }
    }

    /// Build the absolute URL for a request, query string included.
    fn url(&self, options: &RequestOptions) -> Result<reqwest::Url> {
        let joined = format!(
            "{}/{}",
            self.host.trim_end_matches('/'),
            options.path.trim_start_matches('/')
        );
        let mut url = reqwest::Url::parse(&joined)
            .map_err(|e| TransportError::Request(format!("invalid url {joined}: {e}")))?;
        if !options.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&options.query);
        }
        Ok(url)
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}

impl Transport for HttpTransport {
    fn call<'a>(
        &'a self,
        options: &'a RequestOptions,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.url(options)?;
            let method = options.method();

            let request = match &options.form {
                Some(form) => self.client.post(url).form(form),
                None => self.client.get(url),
            };

            let response = request
                .timeout(self.timeout)
                .header(USER_AGENT, USER_AGENT_VALUE)
                .header(ACCEPT, "application/json")
                .send()
                .await
                .map_err(classify)?;

            let status = response.status();
            let body = response.text().await.map_err(classify)?;

            debug!(
                method = method.as_str(),
                path = %options.path,
                status = status.as_u16(),
                bytes = body.len(),
                "webservice call completed"
            );

            if !status.is_success() {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body: truncate_body(&body),
                });
            }
            Ok(body)
        })
    }
}
