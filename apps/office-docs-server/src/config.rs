//! Configuration management for Office Docs Server

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub spool: SpoolConfig,
    pub engine: EngineConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpoolConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub kind: EngineKind,
    pub host: String,
    pub port: u16,
    /// Per-request timeout for the bridge client
    pub timeout_secs: u64,
    /// Connection attempts made by the guard before giving up
    pub connect_attempts: u32,
    /// Pause between connection attempts
    pub retry_delay_secs: u64,
    /// Path of the soffice binary (soffice engine only)
    pub soffice_bin: String,
}

impl EngineConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Bridge,
    Soffice,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub kind: AuthKind,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    Anonymous,
    Simple,
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0} must be set when AUTH_TYPE=simple")]
    MissingCredential(&'static str),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8989,
            },
            spool: SpoolConfig {
                dir: default_spool_dir(),
            },
            engine: EngineConfig {
                kind: EngineKind::Bridge,
                host: "localhost".to_string(),
                port: 8100,
                timeout_secs: 120,
                connect_attempts: 3,
                retry_delay_secs: 3,
                soffice_bin: "soffice".to_string(),
            },
            auth: AuthConfig {
                kind: AuthKind::Anonymous,
                username: None,
                password: None,
            },
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let auth_kind = match lookup("AUTH_TYPE").as_deref().unwrap_or("anonymous") {
            "anonymous" => AuthKind::Anonymous,
            "simple" => AuthKind::Simple,
            other => {
                return Err(ConfigError::InvalidValue {
                    name: "AUTH_TYPE",
                    value: other.to_string(),
                })
            }
        };
        let username = lookup("AUTH_USERNAME");
        let password = lookup("AUTH_PASSWORD");
        if auth_kind == AuthKind::Simple {
            if username.is_none() {
                return Err(ConfigError::MissingCredential("AUTH_USERNAME"));
            }
            if password.is_none() {
                return Err(ConfigError::MissingCredential("AUTH_PASSWORD"));
            }
        }

        let connect_attempts = parse_var(
            &lookup,
            "ENGINE_CONNECT_ATTEMPTS",
            defaults.engine.connect_attempts,
        )?;
        if connect_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "ENGINE_CONNECT_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var(&lookup, "SERVER_PORT", defaults.server.port)?,
            },
            spool: SpoolConfig {
                dir: lookup("SPOOL_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.spool.dir),
            },
            engine: EngineConfig {
                kind: match lookup("ENGINE_KIND").as_deref().unwrap_or("bridge") {
                    "bridge" => EngineKind::Bridge,
                    "soffice" => EngineKind::Soffice,
                    other => {
                        return Err(ConfigError::InvalidValue {
                            name: "ENGINE_KIND",
                            value: other.to_string(),
                        })
                    }
                },
                host: lookup("ENGINE_HOST").unwrap_or(defaults.engine.host),
                port: parse_var(&lookup, "ENGINE_PORT", defaults.engine.port)?,
                timeout_secs: parse_var(&lookup, "ENGINE_TIMEOUT_SECS", defaults.engine.timeout_secs)?,
                connect_attempts,
                retry_delay_secs: parse_var(
                    &lookup,
                    "ENGINE_RETRY_DELAY_SECS",
                    defaults.engine.retry_delay_secs,
                )?,
                soffice_bin: lookup("SOFFICE_BIN").unwrap_or(defaults.engine.soffice_bin),
            },
            auth: AuthConfig {
                kind: auth_kind,
                username,
                password,
            },
        })
    }
}

fn default_spool_dir() -> PathBuf {
    env::temp_dir().join("office-docs-spool")
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}
