//! Logger setup.

use serde::{Deserialize, Serialize};

/// How [`init_logging`] configures `env_logger`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set, in `env_logger` syntax.
    pub default_filter: String,
    /// Include timestamps in log lines.
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            timestamps: true,
        }
    }
}

/// Installs the global logger.
///
/// `RUST_LOG` takes precedence over the configured default filter. Calling this
/// again, or after another logger was installed, is a no-op; returns whether this
/// call installed the logger.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let env = env_logger::Env::default().default_filter_or(config.default_filter.as_str());
    let mut builder = env_logger::Builder::from_env(env);
    if !config.timestamps {
        builder.format_timestamp(None);
    }
    let installed = builder.try_init().is_ok();
    if installed {
        log::debug!("logging initialised (default filter '{}')", config.default_filter);
    }
    installed
}
