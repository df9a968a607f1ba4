//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Secrets (signing secret, database URL, bootstrap admin secret) are loaded
//! from env vars or `*_file` paths, never stored in the TOML directly.

use common::{Secret, resolve_secret};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub bootstrap: Option<BootstrapConfig>,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Token issuance settings
#[derive(Debug, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    /// Path to a file containing the signing secret (alternative to SIGNING_SECRET)
    #[serde(default)]
    pub signing_secret_file: Option<PathBuf>,
    #[serde(skip)]
    pub signing_secret: Option<Secret<String>>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            signing_secret_file: None,
            signing_secret: None,
        }
    }
}

impl TokenConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Which credential store adapter to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File,
    Postgres,
}

/// Credential store settings
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// JSON document path (file backend)
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Path to a file containing the database URL (alternative to DATABASE_URL)
    #[serde(default)]
    pub database_url_file: Option<PathBuf>,
    #[serde(skip)]
    pub database_url: Option<Secret<String>>,
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
    /// Upper bound on each store call
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Administrator seeded at startup when absent from the store
#[derive(Debug, Deserialize)]
pub struct BootstrapConfig {
    pub admin_client_id: String,
    /// Path to a file containing the admin secret (alternative to BOOTSTRAP_ADMIN_SECRET)
    #[serde(default)]
    pub admin_secret_file: Option<PathBuf>,
    #[serde(skip)]
    pub admin_secret: Option<Secret<String>>,
}

fn default_max_connections() -> usize {
    1000
}

fn default_ttl() -> u64 {
    1800
}

fn default_pool_size() -> u32 {
    5
}

fn default_store_timeout() -> u64 {
    5
}

impl Config {
    /// Load configuration from a TOML file, then overlay secrets from the
    /// environment.
    ///
    /// Secret resolution order for each secret:
    /// 1. env var (SIGNING_SECRET, DATABASE_URL, BOOTSTRAP_ADMIN_SECRET)
    /// 2. the matching `*_file` path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.tokens.ttl_secs == 0 {
            return Err(common::Error::Config(
                "ttl_secs must be greater than 0".into(),
            ));
        }

        if config.store.timeout_secs == 0 {
            return Err(common::Error::Config(
                "store timeout_secs must be greater than 0".into(),
            ));
        }

        config.tokens.signing_secret = resolve_secret(
            "SIGNING_SECRET",
            config.tokens.signing_secret_file.as_deref(),
        )?;
        if config.tokens.signing_secret.is_none() {
            return Err(common::Error::Config(
                "signing secret missing: set SIGNING_SECRET or tokens.signing_secret_file".into(),
            ));
        }

        match config.store.backend {
            StoreBackend::Memory => {}
            StoreBackend::File => {
                if config.store.path.is_none() {
                    return Err(common::Error::Config(
                        "store.path is required for the file backend".into(),
                    ));
                }
            }
            StoreBackend::Postgres => {
                config.store.database_url = resolve_secret(
                    "DATABASE_URL",
                    config.store.database_url_file.as_deref(),
                )?;
                if config.store.database_url.is_none() {
                    return Err(common::Error::Config(
                        "database URL missing: set DATABASE_URL or store.database_url_file".into(),
                    ));
                }
            }
        }

        if let Some(ref mut bootstrap) = config.bootstrap {
            if bootstrap.admin_client_id.trim().is_empty() {
                return Err(common::Error::Config(
                    "bootstrap.admin_client_id must not be empty".into(),
                ));
            }
            bootstrap.admin_secret = resolve_secret(
                "BOOTSTRAP_ADMIN_SECRET",
                bootstrap.admin_secret_file.as_deref(),
            )?;
            if bootstrap.admin_secret.is_none() {
                return Err(common::Error::Config(
                    "bootstrap admin secret missing: set BOOTSTRAP_ADMIN_SECRET or bootstrap.admin_secret_file".into(),
                ));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("credential-server.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    /// Clear every secret env var the loader reads.
    unsafe fn clear_secret_env() {
        unsafe {
            remove_env("SIGNING_SECRET");
            remove_env("DATABASE_URL");
            remove_env("BOOTSTRAP_ADMIN_SECRET");
        }
    }

    /// Write `toml` plus a signing secret file into a fresh temp dir.
    fn write_config(toml: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("signing_secret");
        std::fs::write(&secret_path, "file-signing-secret\n").unwrap();

        let contents = toml.replace("{SECRET_FILE}", &secret_path.display().to_string());
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, contents).unwrap();
        (dir, config_path)
    }

    const MEMORY_TOML: &str = r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
signing_secret_file = "{SECRET_FILE}"

[store]
backend = "memory"
"#;

    #[test]
    fn test_load_valid_config_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let (_dir, path) = write_config(MEMORY_TOML);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.tokens.ttl_secs, 1800);
        assert_eq!(config.tokens.ttl(), Duration::from_secs(1800));
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.timeout(), Duration::from_secs(5));
        assert_eq!(config.store.max_connections, 5);
        assert!(config.bootstrap.is_none());
        assert_eq!(
            config.tokens.signing_secret.as_ref().unwrap().expose(),
            "file-signing-secret"
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let (_dir, path) = write_config("not valid {{{{ toml");
        let result = Config::load(&path);
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_signing_secret_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let (_dir, path) = write_config(MEMORY_TOML);

        unsafe { set_env("SIGNING_SECRET", "env-signing-secret") };
        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.tokens.signing_secret.as_ref().unwrap().expose(),
            "env-signing-secret"
        );
        unsafe { remove_env("SIGNING_SECRET") };
    }

    #[test]
    fn test_missing_signing_secret_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let (_dir, path) = write_config(
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[store]
backend = "memory"
"#,
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("signing secret missing"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_signing_secret_never_in_debug_output() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let (_dir, path) = write_config(MEMORY_TOML);

        let config = Config::load(&path).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("file-signing-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let (_dir, path) = write_config(
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
ttl_secs = 0
signing_secret_file = "{SECRET_FILE}"

[store]
backend = "memory"
"#,
        );

        let result = Config::load(&path);
        assert!(result.is_err(), "ttl_secs = 0 must be rejected");
    }

    #[test]
    fn test_zero_max_connections_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let (_dir, path) = write_config(
            r#"
[server]
listen_addr = "127.0.0.1:8080"
max_connections = 0

[tokens]
signing_secret_file = "{SECRET_FILE}"

[store]
backend = "memory"
"#,
        );

        let result = Config::load(&path);
        assert!(result.is_err(), "max_connections = 0 must be rejected");
    }

    #[test]
    fn test_zero_store_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let (_dir, path) = write_config(
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
signing_secret_file = "{SECRET_FILE}"

[store]
backend = "memory"
timeout_secs = 0
"#,
        );

        let result = Config::load(&path);
        assert!(result.is_err(), "store timeout_secs = 0 must be rejected");
    }

    #[test]
    fn test_file_backend_requires_path() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let (_dir, path) = write_config(
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
signing_secret_file = "{SECRET_FILE}"

[store]
backend = "file"
"#,
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("store.path"), "got: {err}");
    }

    #[test]
    fn test_file_backend_with_path() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let (_dir, path) = write_config(
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
signing_secret_file = "{SECRET_FILE}"

[store]
backend = "file"
path = "/var/lib/credentials/store.json"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(
            config.store.path.as_deref(),
            Some(Path::new("/var/lib/credentials/store.json"))
        );
    }

    #[test]
    fn test_postgres_backend_requires_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let postgres_toml = r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
signing_secret_file = "{SECRET_FILE}"

[store]
backend = "postgres"
max_connections = 10
"#;
        let (_dir, path) = write_config(postgres_toml);
        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("database URL missing"), "got: {err}");

        unsafe { set_env("DATABASE_URL", "postgres://auth:pw@db/credentials") };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.store.max_connections, 10);
        assert_eq!(
            config.store.database_url.as_ref().unwrap().expose(),
            "postgres://auth:pw@db/credentials"
        );
        unsafe { remove_env("DATABASE_URL") };
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let (_dir, path) = write_config(
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
signing_secret_file = "{SECRET_FILE}"

[store]
backend = "redis"
"#,
        );

        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_bootstrap_secret_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let bootstrap_toml = r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
signing_secret_file = "{SECRET_FILE}"

[store]
backend = "memory"

[bootstrap]
admin_client_id = "root"
"#;
        let (_dir, path) = write_config(bootstrap_toml);

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("bootstrap admin secret missing"), "got: {err}");

        unsafe { set_env("BOOTSTRAP_ADMIN_SECRET", "root-secret") };
        let config = Config::load(&path).unwrap();
        let bootstrap = config.bootstrap.unwrap();
        assert_eq!(bootstrap.admin_client_id, "root");
        assert_eq!(bootstrap.admin_secret.unwrap().expose(), "root-secret");
        unsafe { remove_env("BOOTSTRAP_ADMIN_SECRET") };
    }

    #[test]
    fn test_empty_bootstrap_client_id_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { clear_secret_env() };
        let (_dir, path) = write_config(
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[tokens]
signing_secret_file = "{SECRET_FILE}"

[store]
backend = "memory"

[bootstrap]
admin_client_id = "  "
"#,
        );

        assert!(Config::load(&path).is_err());
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
        assert_eq!(path, PathBuf::from("credential-server.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
