//! Subsystem policy values, loadable from a file and the environment

use super::DEFAULT_DISCOVERY_TIMEOUT_MS;
use ::config::{Config, ConfigError, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Environment variable prefix for [`SubsystemSettings`] overrides
pub const ENV_PREFIX: &str = "SVC_DISC";

/// Environment variable naming an optional settings file
pub const CONFIG_FILE_VAR: &str = "SVC_DISC_CONFIG_FILE";

/// Timing and sizing policy for the discovery controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsystemSettings {
    /// Delay between completion checks while stopping a run
    pub stop_poll_interval_ms: u64,
    /// Completion checks made before the run is aborted
    pub stop_poll_attempts: u32,
    /// Upper bound on records requested from a single query
    pub max_results: usize,
    /// Query timeout suggested for callers that do not pick one
    pub default_timeout_ms: u64,
}

impl Default for SubsystemSettings {
    fn default() -> Self {
        Self {
            stop_poll_interval_ms: 100,
            stop_poll_attempts: 50,
            max_results: 20,
            default_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
        }
    }
}

impl SubsystemSettings {
    /// Load defaults, then the file named by `SVC_DISC_CONFIG_FILE`, then `SVC_DISC_*` variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_vars(std::env::vars())
    }

    /// Like [`load`](Self::load), but reads variables from `vars` instead of the process environment
    pub fn load_from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: Map<String, String> = vars.into_iter().collect();
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = vars.get(CONFIG_FILE_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .try_parsing(true)
                .source(Some(vars)),
        );

        Self::from_config(builder.build()?)
    }

    /// Deserialize and validate settings from an already-built [`Config`]
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Self = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would make `stop` or `start` meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stop_poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "stop_poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.stop_poll_attempts == 0 {
            return Err(ConfigError::Message(
                "stop_poll_attempts must be greater than zero".into(),
            ));
        }
        if self.max_results == 0 {
            return Err(ConfigError::Message("max_results must be greater than zero".into()));
        }
        Ok(())
    }

    /// Delay between completion checks as a Duration
    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_interval_ms)
    }

    /// Total graceful window granted to a run before it is aborted
    pub fn stop_grace_period(&self) -> Duration {
        self.stop_poll_interval() * self.stop_poll_attempts
    }

    /// Default query timeout as a Duration
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}
