//! In-memory transport driven by a closure
//!
//! Every call is recorded before the handler runs, so tests can assert on how
//! many challenge, login or operation requests were issued, including while
//! they are still in flight.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{RequestOptions, Result, Transport};

type Handler = dyn Fn(&RequestOptions) -> Result<String> + Send + Sync;

/// Transport that answers each request by calling a handler.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    delay: Duration,
    calls: Mutex<Vec<RequestOptions>>,
}

impl ScriptedTransport {
    pub fn new(handler: impl Fn(&RequestOptions) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long before answering, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Snapshot of every request seen so far.
    pub fn calls(&self) -> Vec<RequestOptions> {
        self.calls.lock().clone()
    }

    /// Number of requests whose `operation` parameter equals `operation`.
    pub fn count_operation(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.param("operation") == Some(operation))
            .count()
    }
}

impl Transport for ScriptedTransport {
    fn call<'a>(
        &'a self,
        options: &'a RequestOptions,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.lock().push(options.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.handler)(options)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportError;

    #[tokio::test]
    async fn records_calls_and_answers_from_handler() {
        let transport = ScriptedTransport::new(|options| match options.param("operation") {
            Some("getchallenge") => Ok(r#"{"success":true}"#.into()),
            _ => Err(TransportError::Connect("refused".into())),
        });

        let challenge = RequestOptions::get("webservice.php").with_query("operation", "getchallenge");
        assert!(transport.call(&challenge).await.is_ok());

        let other = RequestOptions::post("webservice.php", vec![("operation".into(), "login".into())]);
        assert!(transport.call(&other).await.is_err());

        assert_eq!(transport.calls().len(), 2);
        assert_eq!(transport.count_operation("getchallenge"), 1);
        assert_eq!(transport.count_operation("login"), 1);
    }
}
