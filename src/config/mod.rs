mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, FetchSettings, LogSettings, Settings};

/// Prefix for environment overrides, e.g. `AMQPC_BROKER__URL`.
pub const ENV_PREFIX: &str = "AMQPC";

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    let default = Settings::default();

    Ok(Settings {
        broker: BrokerSettings {
            url: partial
                .broker
                .as_ref()
                .and_then(|b| b.url.clone())
                .unwrap_or(default.broker.url),
        },
        fetch: FetchSettings {
            wait_secs: partial
                .fetch
                .as_ref()
                .and_then(|f| f.wait_secs)
                .unwrap_or(default.fetch.wait_secs),
        },
        log: LogSettings {
            level: partial
                .log
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.log.level),
        },
    })
}
