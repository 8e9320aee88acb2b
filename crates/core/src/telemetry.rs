//! Logging bootstrap for host processes embedding the recommender.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::errors::ApplicationError;

/// Install a global `tracing` subscriber in the configured format.
///
/// `RUST_LOG` takes precedence over `logging.level` when set. Fails if a
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ApplicationError> {
    let filter = env_filter(config)?;

    let installed = match config.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().try_init()
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().try_init()
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().try_init()
        }
    };

    installed.map_err(|error| {
        ApplicationError::Configuration(format!("failed to install log subscriber: {error}"))
    })
}

fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ApplicationError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(config.level.trim()).map_err(|error| {
        ApplicationError::Configuration(format!("invalid log level `{}`: {error}", config.level))
    })
}
