//! Application configuration.
//!
//! [`AppConfig::from_env`] loads a `.env` file (if present) and then reads process
//! environment variables. [`AppConfig::from_lookup`] takes any key lookup, which is how tests
//! and embedding applications supply values without touching the process environment.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{ExtractError, ExtractResult};
use crate::logging::{LogConfig, LogLevel};

/// Default schema holding converted tables.
pub const DEFAULT_CONVERTED_SCHEMA: &str = "CONVERTED_FILES";
/// Default name of the driver's named connection.
pub const DEFAULT_CONNECTION_NAME: &str = "snowflake";
/// Directory that only exists inside the managed execution environment.
pub const DEFAULT_MANAGED_MARKER: &str = "/home/udf";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub warehouse: WarehouseConfig,
    pub pipeline: PipelineConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub credentials: Credentials,
    /// Name passed to the driver for the named-connection fallback.
    pub connection_name: String,
    pub environment: EnvironmentDetection,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            connection_name: DEFAULT_CONNECTION_NAME.to_string(),
            environment: EnvironmentDetection::default(),
        }
    }
}

/// Credentials for a driver-level connection.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub account: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            account: None,
            user: None,
            password: None,
            warehouse: None,
            database: None,
            schema: "PUBLIC".to_string(),
        }
    }
}

impl Credentials {
    /// Account and user are the minimum a driver needs to attempt a connection.
    pub fn is_complete(&self) -> bool {
        non_empty(&self.account) && non_empty(&self.user)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish()
    }
}

/// How to tell whether the process runs inside the warehouse's managed environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvironmentDetection {
    pub managed_marker: PathBuf,
    /// Set when `SNOWFLAKE_ENVIRONMENT` is present.
    pub managed_flag: bool,
}

impl Default for EnvironmentDetection {
    fn default() -> Self {
        Self {
            managed_marker: PathBuf::from(DEFAULT_MANAGED_MARKER),
            managed_flag: false,
        }
    }
}

impl EnvironmentDetection {
    pub fn is_managed(&self) -> bool {
        self.managed_flag || Path::new(&self.managed_marker).exists()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of lines kept in the rolling session log.
    pub session_log_capacity: usize,
    /// Rows per `INSERT` statement when materializing tables.
    pub insert_batch_size: usize,
    pub converted_schema: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            session_log_capacity: 50,
            insert_batch_size: 500,
            converted_schema: DEFAULT_CONVERTED_SCHEMA.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `.env` and the process environment.
    pub fn from_env() -> ExtractResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from a key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> ExtractResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let credentials = Credentials {
            account: get("SNOWFLAKE_ACCOUNT"),
            user: get("SNOWFLAKE_USER"),
            password: get("SNOWFLAKE_PASSWORD"),
            warehouse: get("SNOWFLAKE_WAREHOUSE"),
            database: get("SNOWFLAKE_DATABASE"),
            schema: get("SNOWFLAKE_SCHEMA").unwrap_or(defaults.warehouse.credentials.schema),
        };

        let environment = EnvironmentDetection {
            managed_marker: get("STAGE_EXTRACT_MANAGED_MARKER")
                .map(PathBuf::from)
                .unwrap_or(defaults.warehouse.environment.managed_marker),
            managed_flag: lookup("SNOWFLAKE_ENVIRONMENT").is_some(),
        };

        let pipeline = PipelineConfig {
            session_log_capacity: parse_or(
                get("STAGE_EXTRACT_SESSION_LOG_CAPACITY"),
                "STAGE_EXTRACT_SESSION_LOG_CAPACITY",
                defaults.pipeline.session_log_capacity,
            )?,
            insert_batch_size: parse_or(
                get("STAGE_EXTRACT_INSERT_BATCH_SIZE"),
                "STAGE_EXTRACT_INSERT_BATCH_SIZE",
                defaults.pipeline.insert_batch_size,
            )?,
            converted_schema: get("STAGE_EXTRACT_CONVERTED_SCHEMA")
                .unwrap_or(defaults.pipeline.converted_schema),
        };
        if pipeline.insert_batch_size == 0 {
            return Err(ExtractError::config("STAGE_EXTRACT_INSERT_BATCH_SIZE must be > 0"));
        }

        let logging = LogConfig {
            level: parse_or(get("STAGE_EXTRACT_LOG_LEVEL"), "STAGE_EXTRACT_LOG_LEVEL", LogLevel::Info)?,
            ansi: parse_or(get("STAGE_EXTRACT_LOG_ANSI"), "STAGE_EXTRACT_LOG_ANSI", defaults.logging.ansi)?,
        };

        Ok(Self {
            warehouse: WarehouseConfig {
                credentials,
                connection_name: get("SNOWFLAKE_CONNECTION_NAME")
                    .unwrap_or(defaults.warehouse.connection_name),
                environment,
            },
            pipeline,
            logging,
        })
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> ExtractResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ExtractError::config(format!("{key}={raw:?}: {e}"))),
    }
}
