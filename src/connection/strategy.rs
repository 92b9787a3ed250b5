use std::sync::Arc;

use crate::config::{Credentials, EnvironmentDetection, WarehouseConfig};
use crate::error::ExtractResult;

use super::Connection;

/// One way of obtaining a warehouse connection.
pub trait ConnectStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Ok(None)` means the strategy does not apply in this environment.
    fn connect(&self) -> ExtractResult<Option<Arc<dyn Connection>>>;
}

/// Source of the active session when running inside the managed environment.
pub trait SessionSource: Send + Sync {
    fn active_session(&self) -> ExtractResult<Arc<dyn Connection>>;
}

/// Driver able to open connections from credentials or by configured name.
pub trait Driver: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> ExtractResult<Arc<dyn Connection>>;

    fn connect_named(&self, name: &str) -> ExtractResult<Arc<dyn Connection>>;
}

/// Uses the platform's active session; only applies inside the managed environment.
pub struct ManagedSessionStrategy {
    detection: EnvironmentDetection,
    source: Arc<dyn SessionSource>,
}

impl ManagedSessionStrategy {
    pub fn new(detection: EnvironmentDetection, source: Arc<dyn SessionSource>) -> Self {
        Self { detection, source }
    }
}

impl ConnectStrategy for ManagedSessionStrategy {
    fn name(&self) -> &'static str {
        "managed-session"
    }

    fn connect(&self) -> ExtractResult<Option<Arc<dyn Connection>>> {
        if !self.detection.is_managed() {
            return Ok(None);
        }
        self.source.active_session().map(Some)
    }
}

/// Opens a driver connection from configured credentials.
pub struct CredentialStrategy {
    credentials: Credentials,
    driver: Arc<dyn Driver>,
}

impl CredentialStrategy {
    pub fn new(credentials: Credentials, driver: Arc<dyn Driver>) -> Self {
        Self {
            credentials,
            driver,
        }
    }
}

impl ConnectStrategy for CredentialStrategy {
    fn name(&self) -> &'static str {
        "credentials"
    }

    fn connect(&self) -> ExtractResult<Option<Arc<dyn Connection>>> {
        if !self.credentials.is_complete() {
            return Ok(None);
        }
        self.driver.connect(&self.credentials).map(Some)
    }
}

/// Last resort: the driver's named connection.
pub struct NamedConnectionStrategy {
    name: String,
    driver: Arc<dyn Driver>,
}

impl NamedConnectionStrategy {
    pub fn new(name: impl Into<String>, driver: Arc<dyn Driver>) -> Self {
        Self {
            name: name.into(),
            driver,
        }
    }
}

impl ConnectStrategy for NamedConnectionStrategy {
    fn name(&self) -> &'static str {
        "named-connection"
    }

    fn connect(&self) -> ExtractResult<Option<Arc<dyn Connection>>> {
        self.driver.connect_named(&self.name).map(Some)
    }
}

/// Managed session (when a source is available), then credentials, then the named connection.
pub fn default_strategies(
    config: &WarehouseConfig,
    driver: Arc<dyn Driver>,
    session: Option<Arc<dyn SessionSource>>,
) -> Vec<Box<dyn ConnectStrategy>> {
    let mut strategies: Vec<Box<dyn ConnectStrategy>> = Vec::with_capacity(3);
    if let Some(source) = session {
        strategies.push(Box::new(ManagedSessionStrategy::new(
            config.environment.clone(),
            source,
        )));
    }
    strategies.push(Box::new(CredentialStrategy::new(
        config.credentials.clone(),
        Arc::clone(&driver),
    )));
    strategies.push(Box::new(NamedConnectionStrategy::new(
        config.connection_name.clone(),
        driver,
    )));
    strategies
}
