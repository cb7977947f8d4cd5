use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::services::link_probe::ProbeConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_address: String,
    pub log_dir: String,
    pub token_ttl_hours: i64,
    pub probe_timeout_secs: u64,
    pub probe_user_agent: Option<String>,
    pub probe_max_body_bytes: usize,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub struct PartialServerConfig {
    pub database_url: Option<String>,
    pub jwt_secret: Option<String>,
    pub bind_address: Option<String>,
    pub log_dir: Option<String>,
    pub token_ttl_hours: Option<i64>,
    pub probe_timeout_secs: Option<u64>,
    pub probe_user_agent: Option<String>,
    pub probe_max_body_bytes: Option<usize>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_probe_max_body_bytes() -> usize {
    1024 * 1024
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, String> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("{key} has an invalid value: {raw}")),
        _ => Ok(None),
    }
}

impl PartialServerConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))
    }

    pub fn from_env() -> Result<Self, String> {
        Ok(PartialServerConfig {
            database_url: parse_env("DATABASE_URL")?,
            jwt_secret: parse_env("JWT_SECRET")?,
            bind_address: parse_env("BIND_ADDRESS")?,
            log_dir: parse_env("LOG_DIR")?,
            token_ttl_hours: parse_env("TOKEN_TTL_HOURS")?,
            probe_timeout_secs: parse_env("PROBE_TIMEOUT_SECS")?,
            probe_user_agent: parse_env("PROBE_USER_AGENT")?,
            probe_max_body_bytes: parse_env("PROBE_MAX_BODY_BYTES")?,
            admin_username: parse_env("ADMIN_USERNAME")?,
            admin_password: parse_env("ADMIN_PASSWORD")?,
        })
    }
}

impl ServerConfig {
    /// Minimal config with every optional setting at its default.
    pub fn new(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        ServerConfig {
            database_url: database_url.into(),
            jwt_secret: jwt_secret.into(),
            bind_address: default_bind_address(),
            log_dir: default_log_dir(),
            token_ttl_hours: default_token_ttl_hours(),
            probe_timeout_secs: default_probe_timeout_secs(),
            probe_user_agent: None,
            probe_max_body_bytes: default_probe_max_body_bytes(),
            admin_username: None,
            admin_password: None,
        }
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path.map(Path::new) {
            Some(path) if path.exists() => PartialServerConfig::from_toml_file(path)?,
            _ => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config = PartialServerConfig::from_env()?;

        // 3. Merge: environment overrides file
        Self::merge(file_config, env_config)
    }

    pub fn merge(file_config: PartialServerConfig, env_config: PartialServerConfig) -> Result<Self, String> {
        let final_config = ServerConfig {
            database_url: env_config.database_url.or(file_config.database_url)
                .ok_or("DATABASE_URL is required")?,
            jwt_secret: env_config.jwt_secret.or(file_config.jwt_secret)
                .ok_or("JWT_SECRET is required")?,
            bind_address: env_config.bind_address.or(file_config.bind_address)
                .unwrap_or_else(default_bind_address),
            log_dir: env_config.log_dir.or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            token_ttl_hours: env_config.token_ttl_hours.or(file_config.token_ttl_hours)
                .unwrap_or_else(default_token_ttl_hours),
            probe_timeout_secs: env_config.probe_timeout_secs.or(file_config.probe_timeout_secs)
                .unwrap_or_else(default_probe_timeout_secs),
            probe_user_agent: env_config.probe_user_agent.or(file_config.probe_user_agent),
            probe_max_body_bytes: env_config.probe_max_body_bytes.or(file_config.probe_max_body_bytes)
                .unwrap_or_else(default_probe_max_body_bytes),
            admin_username: env_config.admin_username.or(file_config.admin_username),
            admin_password: env_config.admin_password.or(file_config.admin_password),
        };

        if final_config.jwt_secret.trim().is_empty() {
            return Err("JWT_SECRET must not be empty".to_string());
        }

        Ok(final_config)
    }

    pub fn probe_config(&self) -> ProbeConfig {
        let mut probe = ProbeConfig {
            timeout: Duration::from_secs(self.probe_timeout_secs.max(1)),
            max_body_bytes: self.probe_max_body_bytes,
            ..ProbeConfig::default()
        };
        if let Some(user_agent) = &self.probe_user_agent {
            probe.user_agent = user_agent.clone();
        }
        probe
    }
}
