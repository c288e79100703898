//! Host configuration.
//!
//! ```toml
//! debug = false
//! strict_dispatch = false
//! stations = [21, 22]
//!
//! [connection]
//! server = "/var/lib/wcs/snapshots"
//! database = "plant"
//! login = "svc_wcs"
//! auth = "password"
//!
//! [scan]
//! interval_ms = 250
//! failure_policy = "continue"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::ControllerOptions;
use crate::error::{CoreError, CoreResult};
use crate::model::StationId;
use crate::scheduler::FailurePolicy;
use crate::session::{AuthMode, ConnectionSettings};

/// Environment variable overriding `connection.password`.
pub const PASSWORD_ENV: &str = "WCS_DB_PASSWORD";

fn default_interval_ms() -> u64 {
    250
}

/// Scan scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanSettings {
    /// Milliseconds between cycles of one station
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Stop after this many cycles per station (unbounded if absent)
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            failure_policy: FailurePolicy::default(),
            max_cycles: None,
        }
    }
}

impl ScanSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WcsConfig {
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub scan: ScanSettings,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub strict_dispatch: bool,
    /// Stations to run when none are given on the command line
    #[serde(default)]
    pub stations: Vec<StationId>,
}

impl WcsConfig {
    /// Load, apply the password override from the environment, validate.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?.with_password_override(std::env::var(PASSWORD_ENV).ok());
        config.validate()?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse TOML without validating.
    pub fn parse(content: &str) -> CoreResult<Self> {
        toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Replace the password when an override is present and non-empty.
    pub fn with_password_override(mut self, password: Option<String>) -> Self {
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.connection.password = password;
        }
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.connection.server.trim().is_empty() {
            return Err(CoreError::Config("connection.server must not be empty".into()));
        }
        if self.connection.database.trim().is_empty() {
            return Err(CoreError::Config("connection.database must not be empty".into()));
        }
        if self.connection.auth == AuthMode::Password && self.connection.login.trim().is_empty() {
            return Err(CoreError::Config(
                "connection.login is required for password authentication".into(),
            ));
        }
        if self.scan.interval_ms == 0 {
            return Err(CoreError::Config("scan.interval_ms must be positive".into()));
        }
        if self.scan.max_cycles == Some(0) {
            return Err(CoreError::Config("scan.max_cycles must be positive".into()));
        }
        if let Some(bad) = self.stations.iter().find(|id| !id.is_valid()) {
            return Err(CoreError::InvalidStationId(bad.get()));
        }
        Ok(())
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions::default()
            .debug(self.debug)
            .strict_dispatch(self.strict_dispatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
stations = [21, 22]

[connection]
server = "/srv/wcs"
database = "plant"
login = "svc_wcs"
"#;

    #[test]
    fn test_defaults() {
        let config = WcsConfig::parse(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.scan, ScanSettings::default());
        assert_eq!(config.scan.interval(), Duration::from_millis(250));
        assert_eq!(config.stations, vec![StationId(21), StationId(22)]);
        assert_eq!(config.connection.auth, AuthMode::Password);
        assert_eq!(config.controller_options(), ControllerOptions::default());
    }

    #[test]
    fn test_full_config() {
        let config = WcsConfig::parse(
            r#"
debug = true
strict_dispatch = true

[connection]
server = "db01"
database = "wcs"
auth = "integrated"

[scan]
interval_ms = 100
failure_policy = "stop"
max_cycles = 50
"#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.scan.failure_policy, FailurePolicy::Stop);
        assert_eq!(config.scan.max_cycles, Some(50));
        let options = config.controller_options();
        assert!(options.debug);
        assert!(options.strict_dispatch);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = WcsConfig::parse(MINIMAL).unwrap();
        config.scan.interval_ms = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let mut config = WcsConfig::parse(MINIMAL).unwrap();
        config.connection.login.clear();
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let mut config = WcsConfig::parse(MINIMAL).unwrap();
        config.stations.push(StationId(-1));
        assert!(matches!(config.validate(), Err(CoreError::InvalidStationId(-1))));
    }

    #[test]
    fn test_unparseable_config() {
        let err = WcsConfig::parse("[connection\nserver =").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn test_password_override() {
        let config = WcsConfig::parse(MINIMAL)
            .unwrap()
            .with_password_override(Some("from-env".to_string()));
        assert_eq!(config.connection.password, "from-env");

        let config = config.with_password_override(Some(String::new()));
        assert_eq!(config.connection.password, "from-env");
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wcs.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = WcsConfig::load(&path).unwrap();
        assert_eq!(config.connection.database, "plant");
    }
}
