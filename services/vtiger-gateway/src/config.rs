//! Configuration types and loading
//!
//! Config path precedence: `--config` > `CONFIG_PATH` > `vtiger-gateway.toml`.
//! The vtiger password is loaded from the VTIGER_PASSWORD env var or
//! `password_file`, never stored in the TOML directly.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::{RetryPolicy, Secret};
use serde::Deserialize;
use vtiger_pool::{Credentials, DispatcherConfig, WarmUpMode};

/// Env var holding the vtiger user's access key.
pub const PASSWORD_ENV: &str = "VTIGER_PASSWORD";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub vtiger: VtigerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    pub server: ServerConfig,
    /// Entity type → webservice operation prefix, e.g. `Contact = "Contacts"`
    pub entities: BTreeMap<String, String>,
}

/// Remote service and identity
#[derive(Debug, Deserialize)]
pub struct VtigerConfig {
    pub host: String,
    pub username: String,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Path to a file containing the password (alternative to VTIGER_PASSWORD)
    #[serde(default)]
    pub password_file: Option<PathBuf>,
}

/// Session pool sizing and retry budgets
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub size: usize,
    pub max_checkout_attempts: u32,
    pub retry_interval_ms: u64,
    pub max_token_attempts: u32,
    pub token_retry_interval_ms: u64,
    pub max_login_attempts: u32,
    pub max_invalid_session_retries: u32,
    pub warm_up: WarmUpMode,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let d = DispatcherConfig::default();
        Self {
            size: d.pool_size,
            max_checkout_attempts: d.checkout.max_attempts,
            retry_interval_ms: d.checkout.interval.as_millis() as u64,
            max_token_attempts: d.token.max_attempts,
            token_retry_interval_ms: d.token.interval.as_millis() as u64,
            max_login_attempts: d.max_login_attempts,
            max_invalid_session_retries: d.max_invalid_session_retries,
            warm_up: d.warm_up,
        }
    }
}

impl PoolConfig {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            pool_size: self.size,
            checkout: RetryPolicy::new(
                self.max_checkout_attempts,
                Duration::from_millis(self.retry_interval_ms),
            ),
            token: RetryPolicy::new(
                self.max_token_attempts,
                Duration::from_millis(self.token_retry_interval_ms),
            ),
            max_login_attempts: self.max_login_attempts,
            max_invalid_session_retries: self.max_invalid_session_retries,
            warm_up: self.warm_up,
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load configuration from a TOML file, validate it, then resolve the
    /// password.
    ///
    /// Password resolution order:
    /// 1. VTIGER_PASSWORD env var
    /// 2. password_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.vtiger.password = Some(Secret::new(password));
        } else if let Some(ref password_file) = config.vtiger.password_file {
            let password = std::fs::read_to_string(password_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read password_file {}: {e}",
                    password_file.display()
                ))
            })?;
            config.vtiger.password = Some(Secret::new(password.trim().to_owned()));
        }

        if !config.vtiger.password.as_ref().is_some_and(|p| !p.is_blank()) {
            return Err(common::Error::MissingSecret(format!(
                "set {PASSWORD_ENV} or vtiger.password_file"
            )));
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.vtiger.host.starts_with("http://") && !self.vtiger.host.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "host must start with http:// or https://, got: {}",
                self.vtiger.host
            )));
        }

        let nonzero = [
            ("pool.size", self.pool.size as u64),
            ("pool.max_checkout_attempts", self.pool.max_checkout_attempts.into()),
            ("pool.max_token_attempts", self.pool.max_token_attempts.into()),
            ("pool.max_login_attempts", self.pool.max_login_attempts.into()),
            ("server.timeout_secs", self.server.timeout_secs),
            ("server.max_connections", self.server.max_connections as u64),
        ];
        if let Some((name, _)) = nonzero.iter().find(|(_, value)| *value == 0) {
            return Err(common::Error::Config(format!(
                "{name} must be greater than 0"
            )));
        }

        if self.entities.is_empty() {
            return Err(common::Error::Config(
                "at least one entry is required in [entities]".into(),
            ));
        }

        Ok(())
    }

    /// Login identity for the dispatcher.
    pub fn credentials(&self) -> common::Result<Credentials> {
        let password = self
            .vtiger
            .password
            .clone()
            .ok_or_else(|| common::Error::MissingSecret(PASSWORD_ENV.into()))?;
        Ok(Credentials {
            username: self.vtiger.username.clone(),
            password,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("vtiger-gateway.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Serializes tests that read or mutate environment variables.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    const VALID: &str = r#"
[vtiger]
host = "https://crm.example.com"
username = "admin"

[server]
listen_addr = "127.0.0.1:8080"

[entities]
Contact = "Contacts"
Lead = "Leads"
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_config_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env(PASSWORD_ENV, "Kp7xQ2vL9mN4") };
        let file = write_config(VALID);

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.vtiger.host, "https://crm.example.com");
        assert_eq!(config.vtiger.username, "admin");
        assert_eq!(config.entities["Contact"], "Contacts");
        assert_eq!(config.server.timeout_secs, 60);
        assert_eq!(config.server.max_connections, 1000);

        let dispatcher = config.pool.dispatcher_config();
        assert_eq!(dispatcher, DispatcherConfig::default());
        assert_eq!(dispatcher.checkout.interval, Duration::from_millis(300));
        assert_eq!(dispatcher.token.interval, Duration::from_millis(500));

        unsafe { remove_env(PASSWORD_ENV) };
    }

    #[test]
    fn test_pool_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env(PASSWORD_ENV, "Kp7xQ2vL9mN4") };
        let file = write_config(&format!(
            "{VALID}\n[pool]\nsize = 5\nmax_checkout_attempts = 4\nretry_interval_ms = 50\nwarm_up = \"lazy\"\n"
        ));

        let config = Config::load(file.path()).unwrap();
        let dispatcher = config.pool.dispatcher_config();
        assert_eq!(dispatcher.pool_size, 5);
        assert_eq!(dispatcher.checkout, RetryPolicy::new(4, Duration::from_millis(50)));
        assert_eq!(dispatcher.warm_up, WarmUpMode::Lazy);
        assert_eq!(dispatcher.max_login_attempts, 3);

        unsafe { remove_env(PASSWORD_ENV) };
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = write_config("not valid {{{{ toml");
        let result = Config::load(file.path());
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_password_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(PASSWORD_ENV) };
        let secret = write_config("from-file-secret\n");
        let file = write_config(&VALID.replace(
            "username = \"admin\"",
            &format!("username = \"admin\"\npassword_file = \"{}\"", secret.path().display()),
        ));

        let config = Config::load(file.path()).unwrap();
        let creds = config.credentials().unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password.expose(), "from-file-secret");
    }

    #[test]
    fn test_password_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env(PASSWORD_ENV, "from-env") };
        let file = write_config(&VALID.replace(
            "username = \"admin\"",
            "username = \"admin\"\npassword_file = \"/nonexistent/password\"",
        ));

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.vtiger.password.as_ref().unwrap().expose(), "from-env");

        unsafe { remove_env(PASSWORD_ENV) };
    }

    #[test]
    fn test_missing_password_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(PASSWORD_ENV) };
        let file = write_config(VALID);

        let result = Config::load(file.path());
        assert!(matches!(result, Err(common::Error::MissingSecret(_))));
    }

    #[test]
    fn test_blank_password_file_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(PASSWORD_ENV) };
        let secret = write_config("  \n  ");
        let file = write_config(&VALID.replace(
            "username = \"admin\"",
            &format!("username = \"admin\"\npassword_file = \"{}\"", secret.path().display()),
        ));

        let result = Config::load(file.path());
        assert!(matches!(result, Err(common::Error::MissingSecret(_))));
    }

    #[test]
    fn test_nonexistent_password_file_is_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env(PASSWORD_ENV) };
        let file = write_config(&VALID.replace(
            "username = \"admin\"",
            "username = \"admin\"\npassword_file = \"/nonexistent/password\"",
        ));

        let err = Config::load(file.path()).unwrap_err().to_string();
        assert!(err.contains("failed to read password_file"), "got: {err}");
    }

    #[test]
    fn test_host_without_scheme_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env(PASSWORD_ENV, "Kp7xQ2vL9mN4") };
        let file = write_config(&VALID.replace("https://crm.example.com", "crm.example.com"));

        let err = Config::load(file.path()).unwrap_err().to_string();
        assert!(err.contains("host must start with http"), "got: {err}");

        unsafe { remove_env(PASSWORD_ENV) };
    }

    #[test]
    fn test_zero_values_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env(PASSWORD_ENV, "Kp7xQ2vL9mN4") };

        for (section, line, name) in [
            ("[pool]", "size = 0", "pool.size"),
            ("[pool]", "max_checkout_attempts = 0", "pool.max_checkout_attempts"),
            ("[pool]", "max_token_attempts = 0", "pool.max_token_attempts"),
            ("[pool]", "max_login_attempts = 0", "pool.max_login_attempts"),
        ] {
            let file = write_config(&format!("{VALID}\n{section}\n{line}\n"));
            let err = Config::load(file.path()).unwrap_err().to_string();
            assert!(err.contains(name), "{line}: got {err}");
        }

        for (line, name) in [
            ("timeout_secs = 0", "server.timeout_secs"),
            ("max_connections = 0", "server.max_connections"),
        ] {
            let file = write_config(&VALID.replace(
                "listen_addr = \"127.0.0.1:8080\"",
                &format!("listen_addr = \"127.0.0.1:8080\"\n{line}"),
            ));
            let err = Config::load(file.path()).unwrap_err().to_string();
            assert!(err.contains(name), "{line}: got {err}");
        }

        unsafe { remove_env(PASSWORD_ENV) };
    }

    #[test]
    fn test_zero_invalid_session_retries_allowed() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env(PASSWORD_ENV, "Kp7xQ2vL9mN4") };
        let file = write_config(&format!("{VALID}\n[pool]\nmax_invalid_session_retries = 0\n"));

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.pool.max_invalid_session_retries, 0);

        unsafe { remove_env(PASSWORD_ENV) };
    }

    #[test]
    fn test_empty_entities_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env(PASSWORD_ENV, "Kp7xQ2vL9mN4") };
        let file = write_config(
            r#"
[vtiger]
host = "https://crm.example.com"
username = "admin"

[server]
listen_addr = "127.0.0.1:8080"

[entities]
"#,
        );

        let err = Config::load(file.path()).unwrap_err().to_string();
        assert!(err.contains("[entities]"), "got: {err}");

        unsafe { remove_env(PASSWORD_ENV) };
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("vtiger-gateway.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(path, PathBuf::from("/cli/wins.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }
}
