// Configuration management for the Oncely server
// Layers conf/oncely.yml, ONCELY_* environment variables and CLI overrides

use std::time::Duration;

use actix_web::http::header::HeaderName;
use clap::Parser;
use config::{Config, Environment};
use oncely_common::{DEFAULT_HTTP_HEADER, DEFAULT_KEY_PREFIX, StoreKind};
use oncely_core::IdempotencyConfig;
use sea_orm::ConnectOptions;

use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/oncely.yml";
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Command line arguments for the server
#[derive(Debug, Default, Parser)]
#[command(name = "oncely-server", about = "Idempotent order API")]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,
    /// Store backend: memory | database
    #[arg(short = 's', long = "store")]
    pub store: Option<String>,
    /// Database URL for the database store
    #[arg(long = "db-url")]
    pub database_url: Option<String>,
    /// HTTP listen port
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
}

#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Build from process arguments, the configuration file and the environment
    pub fn new() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> anyhow::Result<Self> {
        let file = args
            .config
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let mut config_builder = Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                Environment::with_prefix("ONCELY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = args.store {
            config_builder = config_builder.set_override("store.mode", v)?;
        }
        if let Some(v) = args.database_url {
            config_builder = config_builder.set_override("db.url", v)?;
        }
        if let Some(v) = args.port {
            config_builder = config_builder.set_override("server.port", v)?;
        }

        Ok(Configuration {
            config: config_builder.build()?,
        })
    }

    fn millis(&self, key: &str, default: u64) -> Duration {
        Duration::from_millis(
            self.config
                .get_int(key)
                .ok()
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(default),
        )
    }

    fn seconds(&self, key: &str, default: u64) -> Duration {
        Duration::from_secs(
            self.config
                .get_int(key)
                .ok()
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(default),
        )
    }

    // ========================================================================
    // Server
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or_else(|_| DEFAULT_SERVER_ADDRESS.to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int("server.port")
            .ok()
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    // ========================================================================
    // Store
    // ========================================================================

    pub fn store_kind(&self) -> anyhow::Result<StoreKind> {
        match self.config.get_string("store.mode") {
            Ok(mode) => mode.parse().map_err(anyhow::Error::msg),
            Err(_) => Ok(StoreKind::default()),
        }
    }

    /// Period of the memory store's expired-entry sweep
    pub fn memory_cleanup_interval(&self) -> Duration {
        self.seconds("store.memory.cleanup_interval_secs", 60)
    }

    /// Period of the database store's expired-row purge, zero disables it
    pub fn database_purge_interval(&self) -> Duration {
        self.seconds("store.database.purge_interval_secs", 300)
    }

    pub fn database_connect_options(&self) -> anyhow::Result<ConnectOptions> {
        let url = self.config.get_string("db.url")?;

        let max_connections = self
            .config
            .get_int("db.pool.max_connections")
            .unwrap_or(10) as u32;
        let min_connections = self
            .config
            .get_int("db.pool.min_connections")
            .unwrap_or(1) as u32;
        let connect_timeout = self.seconds("db.pool.connect_timeout_secs", 30);
        let acquire_timeout = self.seconds("db.pool.acquire_timeout_secs", 30);
        let idle_timeout = self.seconds("db.pool.idle_timeout_secs", 600);
        let max_lifetime = self.seconds("db.pool.max_lifetime_secs", 1800);
        let sqlx_logging = self.config.get_bool("db.pool.sqlx_logging").unwrap_or(false);

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(connect_timeout)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .max_lifetime(max_lifetime)
            .sqlx_logging(sqlx_logging);

        tracing::info!(
            max_connections = max_connections,
            min_connections = min_connections,
            connect_timeout = ?connect_timeout,
            idle_timeout = ?idle_timeout,
            max_lifetime = ?max_lifetime,
            sqlx_logging = sqlx_logging,
            "Database connection pool configured"
        );

        Ok(opt)
    }

    // ========================================================================
    // Idempotency
    // ========================================================================

    pub fn idempotency_config(&self) -> IdempotencyConfig {
        let key_prefix = self
            .config
            .get_string("idempotency.key_prefix")
            .unwrap_or_else(|_| DEFAULT_KEY_PREFIX.to_string());

        IdempotencyConfig::default()
            .with_result_ttl(self.seconds("idempotency.result_ttl_secs", 24 * 60 * 60))
            .with_lock_ttl(self.millis("idempotency.lock_ttl_ms", 30_000))
            .with_wait_timeout(self.millis("idempotency.wait_timeout_ms", 10_000))
            .with_poll_interval(
                self.millis("idempotency.poll_interval_min_ms", 50),
                self.millis("idempotency.poll_interval_max_ms", 500),
            )
            .with_key_prefix(key_prefix)
    }

    /// Header carrying the idempotency key on HTTP requests
    pub fn http_header(&self) -> anyhow::Result<HeaderName> {
        let name = self
            .config
            .get_string("idempotency.http_header")
            .unwrap_or_else(|_| DEFAULT_HTTP_HEADER.to_string());
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid idempotency header '{}': {}", name, e))
    }

    // ========================================================================
    // Logging
    // ========================================================================

    /// `ONCELY_LOG_*` variables first, then `log.*` keys override them
    pub fn logging_config(&self) -> LoggingConfig {
        let env = LoggingConfig::from_env();

        let log_dir = self
            .config
            .get_string("log.dir")
            .unwrap_or_else(|_| env.log_dir.display().to_string());
        let console = self.config.get_bool("log.console").unwrap_or(env.console_output);
        let file = self.config.get_bool("log.file").unwrap_or(env.file_logging);
        let level = self
            .config
            .get_string("log.level")
            .unwrap_or_else(|_| env.level.to_string());
        let rotation = self
            .config
            .get_string("log.rotation")
            .unwrap_or_else(|_| env.rotation.as_str().to_string());

        LoggingConfig::from_config(Some(log_dir), console, file, level, rotation)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn from_yaml(yaml: &str, args: Cli) -> Configuration {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        Configuration::from_cli(Cli {
            config: Some(file.path().display().to_string()),
            ..args
        })
        .unwrap()
    }

    #[test]
    fn test_defaults_without_config_file() {
        let configuration = Configuration::from_cli(Cli {
            config: Some("does/not/exist.yml".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(configuration.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(configuration.store_kind().unwrap(), StoreKind::Memory);
        assert_eq!(
            configuration.http_header().unwrap().as_str(),
            "idempotency-key"
        );

        let idempotency = configuration.idempotency_config();
        assert_eq!(idempotency.lock_ttl, Duration::from_secs(30));
        assert_eq!(idempotency.key_prefix, DEFAULT_KEY_PREFIX);
    }

    #[test]
    fn test_values_from_file() {
        let configuration = from_yaml(
            r#"
server:
  port: 9090
store:
  mode: database
db:
  url: "sqlite::memory:"
idempotency:
  lock_ttl_ms: 2000
  wait_timeout_ms: 250
  key_prefix: "orders:"
  http_header: "X-Request-Id"
"#,
            Cli::default(),
        );

        assert_eq!(configuration.server_port(), 9090);
        assert_eq!(configuration.store_kind().unwrap(), StoreKind::Database);
        assert!(configuration.database_connect_options().is_ok());
        assert_eq!(configuration.http_header().unwrap().as_str(), "x-request-id");

        let idempotency = configuration.idempotency_config();
        assert_eq!(idempotency.lock_ttl, Duration::from_secs(2));
        assert_eq!(idempotency.wait_timeout, Duration::from_millis(250));
        assert_eq!(idempotency.key_prefix, "orders:");
        assert!(idempotency.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides_file() {
        let configuration = from_yaml(
            "server:\n  port: 9090\nstore:\n  mode: database\n",
            Cli {
                store: Some("memory".to_string()),
                port: Some(7070),
                ..Default::default()
            },
        );

        assert_eq!(configuration.server_port(), 7070);
        assert_eq!(configuration.store_kind().unwrap(), StoreKind::Memory);
    }

    #[test]
    fn test_invalid_store_mode() {
        let configuration = Configuration::from_cli(Cli {
            config: Some("does/not/exist.yml".to_string()),
            store: Some("redis".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert!(configuration.store_kind().is_err());
    }

    #[test]
    fn test_database_requires_url() {
        let configuration = Configuration::from_cli(Cli {
            config: Some("does/not/exist.yml".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert!(configuration.database_connect_options().is_err());
    }

    #[test]
    fn test_logging_from_file() {
        let configuration = from_yaml(
            "log:\n  dir: /tmp/oncely-test-logs\n  console: false\n  level: debug\n  rotation: never\n",
            Cli::default(),
        );

        let logging = configuration.logging_config();
        assert_eq!(logging.log_dir, std::path::PathBuf::from("/tmp/oncely-test-logs"));
        assert!(!logging.console_output);
        assert_eq!(logging.level, tracing::Level::DEBUG);
        assert_eq!(logging.rotation, crate::startup::LogRotation::Never);
    }
}
