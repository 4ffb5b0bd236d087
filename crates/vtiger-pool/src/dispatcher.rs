//! Authenticated request dispatcher
//!
//! The façade callers use: it warms the session pool, checks out a session
//! per request with bounded backoff, sends the operation, and recovers from
//! `INVALID_SESSIONID` by evicting the session and retrying on a fresh one.
//!
//! Two independent bounds apply to one `execute` call:
//! - `checkout`: attempts to obtain a session (empty pool, warm-up pending)
//! - `max_invalid_session_retries`: fresh sessions tried after the server
//!   rejects one

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use vtiger_auth::{TokenStore, compute_access_key, login};
use webservice::{
    Envelope, OperationResolver, RequestOptions, ResolveError, Transport, WEBSERVICE_PATH,
    operation_name,
};

use crate::config::{Credentials, DispatcherConfig, WarmUpMode};
use crate::error::{Error, Result};
use crate::lease::{SessionLease, prefix};
use crate::pool::{PoolSnapshot, SessionPool};

/// Session pool plus the request loop around it.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn OperationResolver>,
    credentials: Credentials,
    tokens: TokenStore,
    pool: Arc<SessionPool>,
    config: DispatcherConfig,
    warmed: AtomicBool,
    warm_up_started: AtomicBool,
}

/// Sets the warmed flag when warm-up ends, whichever way it ends.
struct MarkWarm<'a>(&'a AtomicBool);

impl Drop for MarkWarm<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn OperationResolver>,
        credentials: Credentials,
        config: DispatcherConfig,
    ) -> Self {
        Self::with_pool(
            transport,
            resolver,
            credentials,
            config,
            Arc::new(SessionPool::new()),
        )
    }

    /// Build around an existing pool, e.g. one seeded with sessions that are
    /// still valid from a previous run.
    pub fn with_pool(
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn OperationResolver>,
        credentials: Credentials,
        config: DispatcherConfig,
        pool: Arc<SessionPool>,
    ) -> Self {
        let tokens = TokenStore::new(
            Arc::clone(&transport),
            credentials.username.clone(),
            config.token,
        );
        Self {
            transport,
            resolver,
            credentials,
            tokens,
            pool,
            config,
            warmed: AtomicBool::new(false),
            warm_up_started: AtomicBool::new(false),
        }
    }

    /// Run startup according to the configured warm-up mode.
    ///
    /// Eager mode returns the warm-up error when no session could be created.
    /// Lazy mode returns immediately; the first checkout warms the pool.
    pub async fn start(&self) -> Result<()> {
        match self.config.warm_up {
            WarmUpMode::Eager => self.warm_up(self.config.pool_size).await.map(|_| ()),
            WarmUpMode::Lazy => {
                info!(
                    pool_size = self.config.pool_size,
                    "lazy warm-up, deferring logins to the first request"
                );
                Ok(())
            }
        }
    }

    /// Log in up to `target` sessions in parallel and mark the pool warm.
    ///
    /// Returns how many sessions were created. Skipped when the pool already
    /// holds `target` sessions. Fails only when every login failed; the pool
    /// is marked warm either way so waiting callers stop waiting.
    pub async fn warm_up(&self, target: usize) -> Result<usize> {
        self.warm_up_started.store(true, Ordering::Release);
        self.run_warm_up(target).await
    }

    async fn run_warm_up(&self, target: usize) -> Result<usize> {
        let _mark = MarkWarm(&self.warmed);

        let existing = self.pool.count();
        if existing >= target {
            info!(existing, target, "pool already populated, skipping warm-up");
            return Ok(0);
        }

        let missing = target - existing;
        info!(sessions = missing, "warming session pool");
        let results = join_all((0..missing).map(|_| self.connect())).await;

        let mut created = 0;
        let mut last_error = None;
        for result in results {
            match result {
                Ok(name) => {
                    self.pool.add(name);
                    created += 1;
                }
                Err(err) => {
                    warn!(error = %err, "warm-up login failed");
                    last_error = Some(err);
                }
            }
        }

        if created == 0 {
            let reason = last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no login attempted".into());
            warn!(target, "warm-up produced no sessions");
            return Err(Error::Authentication(format!(
                "warm-up produced no sessions: {reason}"
            )));
        }

        info!(created, requested = missing, "session pool warmed");
        Ok(created)
    }

    /// Token + login for one new session.
    ///
    /// A rejected login discards the token it used and starts over with a
    /// fresh challenge, up to `max_login_attempts` times. Transport and
    /// malformed-response errors are returned at once.
    async fn connect(&self) -> Result<String> {
        let username = self.credentials.username.as_str();
        let mut last_rejection = None;

        for attempt in 1..=self.config.max_login_attempts {
            let token = self.tokens.get_token().await?;
            let access_key = compute_access_key(token.value(), self.credentials.password.expose());

            match login(self.transport.as_ref(), username, &access_key).await {
                Ok(response) => {
                    metrics::counter!("vtiger_sessions_created_total").increment(1);
                    info!(
                        session_prefix = %prefix(&response.session_name),
                        user_id = response.user_id.as_deref().unwrap_or("-"),
                        "session created"
                    );
                    return Ok(response.session_name);
                }
                Err(err @ vtiger_auth::Error::LoginRejected { .. }) => {
                    warn!(attempt, error = %err, "login rejected, discarding challenge token");
                    self.tokens.discard(&token);
                    last_rejection = Some(err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(match last_rejection {
            Some(err) => err.into(),
            None => Error::Authentication("login attempts set to zero".into()),
        })
    }

    /// Obtain a session, waiting or logging in as needed.
    ///
    /// Until the pool is warm an empty pool means "wait", not "exhausted".
    /// Afterwards an empty pool triggers one incremental login per attempt.
    pub async fn checkout_session(&self) -> Result<SessionLease> {
        if !self.is_warmed()
            && self.config.warm_up == WarmUpMode::Lazy
            && self
                .warm_up_started
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            self.run_warm_up(self.config.pool_size).await?;
        }

        let policy = self.config.checkout;
        for attempt in policy.attempts() {
            if self.is_warmed() {
                if let Some(lease) = SessionLease::checkout(&self.pool) {
                    return Ok(lease);
                }

                match self.connect().await {
                    Ok(name) => {
                        self.pool.add(name);
                        if let Some(lease) = SessionLease::checkout(&self.pool) {
                            return Ok(lease);
                        }
                        debug!(attempt, "new session taken by another caller");
                    }
                    Err(err) => warn!(attempt, error = %err, "incremental login failed"),
                }
            } else {
                debug!(attempt, "pool not warmed yet, waiting");
            }

            if !policy.is_last(attempt) {
                tokio::time::sleep(policy.interval).await;
            }
        }

        metrics::counter!("vtiger_checkout_exhausted_total").increment(1);
        warn!(attempts = policy.max_attempts, "no session available");
        Err(Error::PoolExhausted {
            attempts: policy.max_attempts,
        })
    }

    /// Run `operation` on `entity` with `payload` and return the `result`.
    ///
    /// The payload is sent as a JSON string in the `data` form field.
    #[instrument(skip_all, fields(entity = %entity, operation = %operation))]
    pub async fn execute(&self, entity: &str, operation: &str, payload: &Value) -> Result<Value> {
        let prefix_name = self.resolver.resolve(entity).map_err(|e| match e {
            ResolveError::UnknownEntity(name) => Error::UnknownEntity(name),
        })?;
        let remote_operation = operation_name(prefix_name, operation);
        let data = payload.to_string();
        let max_retries = self.config.max_invalid_session_retries;

        for attempt in 0..=max_retries {
            let lease = self.checkout_session().await?;
            let options = RequestOptions::post(
                WEBSERVICE_PATH,
                vec![
                    ("operation".into(), remote_operation.clone()),
                    ("data".into(), data.clone()),
                    ("sessionName".into(), lease.name().to_string()),
                ],
            );

            let body = match self.transport.call(&options).await {
                Ok(body) => body,
                Err(err) => {
                    lease.release();
                    warn!(error = %err, "transport error");
                    return Err(err.into());
                }
            };

            match Envelope::decode(&body) {
                Envelope::Success(result) => {
                    lease.release();
                    return Ok(result);
                }
                envelope if envelope.is_invalid_session() => {
                    warn!(
                        attempt,
                        session_prefix = %prefix(lease.name()),
                        "session reported invalid, evicting"
                    );
                    lease.evict();
                }
                Envelope::Failure { code, message } => {
                    lease.release();
                    debug!(code = %code, "remote operation failed");
                    return Err(Error::RemoteOperation {
                        entity: entity.to_string(),
                        operation: remote_operation,
                        code,
                        message,
                    });
                }
                Envelope::Malformed { raw } => {
                    lease.release();
                    warn!(body = %raw, "malformed response");
                    return Err(Error::MalformedResponse {
                        context: format!("{entity} {remote_operation}"),
                        body: raw,
                    });
                }
            }
        }

        warn!(attempts = max_retries + 1, "giving up, every session was rejected");
        Err(Error::SessionInvalid {
            entity: entity.to_string(),
            operation: remote_operation,
            attempts: max_retries + 1,
        })
    }

    /// Drain the pool and drop the cached token. Returns the number of
    /// sessions dropped. Requests still in flight finish, but their sessions
    /// are not returned.
    pub fn shutdown(&self) -> usize {
        let drained = self.pool.drain();
        self.tokens.invalidate();
        info!(sessions = drained.len(), "dispatcher shut down");
        drained.len()
    }

    /// Ready to take requests: warm with at least one live session, or lazy
    /// and still waiting for the first request to warm the pool.
    pub fn is_healthy(&self) -> bool {
        matches!(
            self.status(&self.pool.snapshot()),
            "lazy-pending" | "degraded" | "healthy"
        )
    }

    /// Health snapshot for the gateway's `/health` endpoint.
    pub fn health(&self) -> Value {
        let pool = self.pool.snapshot();
        serde_json::json!({
            "status": self.status(&pool),
            "warmed": self.is_warmed(),
            "token_valid": self.tokens.is_valid(),
            "pool": {
                "available": pool.available,
                "in_use": pool.in_use,
                "target": self.config.pool_size,
            },
            "warm_up": self.config.warm_up.label(),
        })
    }

    fn status(&self, pool: &PoolSnapshot) -> &'static str {
        if pool.closed {
            "stopped"
        } else if !self.is_warmed() {
            if self.config.warm_up == WarmUpMode::Lazy
                && !self.warm_up_started.load(Ordering::Acquire)
            {
                "lazy-pending"
            } else {
                "starting"
            }
        } else if pool.live() == 0 {
            "unhealthy"
        } else if pool.live() < self.config.pool_size {
            "degraded"
        } else {
            "healthy"
        }
    }

    pub fn is_warmed(&self) -> bool {
        self.warmed.load(Ordering::Acquire)
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }
}
