//! Startup configuration
//!
//! Server flags come from the command line or environment; database
//! credentials come from the environment only.

use crate::state_machine::DEFAULT_MAX_CYCLES;
use clap::{Parser, ValueEnum};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SYSTEM_PROMPT: &str = "Be a helpful assistant";

const DEFAULT_DB_PORT: u16 = 5432;

const APPLICATION_NAME: &str = "thread_agent";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required database environment variables: {}", .0.join(", "))]
    MissingDatabaseVars(Vec<&'static str>),
    #[error("Invalid DB_PORT {0:?}: expected a port number")]
    InvalidPort(String),
    #[error("POSTGRES_URI must be set in managed persistence mode")]
    MissingManagedUri,
    #[error("Invalid POSTGRES_URI: {0}")]
    InvalidManagedUri(String),
}

/// Where thread state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PersistenceMode {
    /// Hosting platform supplies the database through `POSTGRES_URI`
    Managed,
    /// Database built from `DB_HOST`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`, `DB_PORT`
    SelfProvisioned,
    /// Threads live in process memory
    Memory,
    /// Nothing is retained between runs
    None,
}

/// Command line / environment flags
#[derive(Debug, Clone, Parser)]
#[command(name = "thread-agent", version, about = "Tool-using chat agent over HTTP")]
pub struct ServerArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    #[arg(long, env = "PERSISTENCE_MODE", value_enum, default_value_t = PersistenceMode::SelfProvisioned)]
    pub persistence_mode: PersistenceMode,

    /// Maximum model calls per chat request
    #[arg(long, env = "AGENT_MAX_CYCLES", default_value_t = DEFAULT_MAX_CYCLES,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub max_cycles: u32,

    #[arg(long, env = "MODEL_TIMEOUT_SECS", default_value_t = 120)]
    pub model_timeout_secs: u64,

    #[arg(long, env = "TOOL_TIMEOUT_SECS", default_value_t = 30)]
    pub tool_timeout_secs: u64,

    #[arg(long, env = "SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,
}

impl ServerArgs {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// Credentials for a self-provisioned database
#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub name: String,
    pub port: u16,
}

// Keep the password out of logs
impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .field("name", &self.name)
            .field("port", &self.port)
            .finish()
    }
}

impl DbConfig {
    /// Build from any variable source; empty values count as missing
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let host = get("DB_HOST");
        let user = get("DB_USER");
        let password = get("DB_PASSWORD");
        let name = get("DB_NAME");

        let missing: Vec<&'static str> = [
            ("DB_HOST", host.is_none()),
            ("DB_USER", user.is_none()),
            ("DB_PASSWORD", password.is_none()),
            ("DB_NAME", name.is_none()),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();

        let (Some(host), Some(user), Some(password), Some(name)) = (host, user, password, name)
        else {
            return Err(ConfigError::MissingDatabaseVars(missing));
        };

        let port = match get("DB_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_DB_PORT,
        };

        Ok(Self {
            host,
            user,
            password,
            name,
            port,
        })
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
            .ssl_mode(PgSslMode::Require)
            .application_name(APPLICATION_NAME)
    }
}

/// Connection options for a platform-managed database
pub fn managed_connect_options(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<PgConnectOptions, ConfigError> {
    let uri = lookup("POSTGRES_URI")
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingManagedUri)?;
    uri.parse::<PgConnectOptions>()
        .map(|opts| opts.application_name(APPLICATION_NAME))
        .map_err(|e| ConfigError::InvalidManagedUri(e.to_string()))
}
