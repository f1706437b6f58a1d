mod settings;

use config::{Config, Environment, File};

use crate::utils::Result;

pub use settings::{
    BridgeSettings, DestinationSettings, LogSettings, PartialSettings, Settings, SourceSettings,
};

/// Prefix of every environment variable read by the bridge.
pub const ENV_PREFIX: &str = "WIS2BRIDGE";

/// Loads the configuration from the default file and environment variables
/// and merges it with default values.
///
/// Environment variables use `__` between sections and keys, e.g.
/// `WIS2BRIDGE_SOURCE__HOST` or `WIS2BRIDGE_SOURCE__TOPICS=a/#,b/#`.
pub fn load_config() -> Result<Settings> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("source.topics")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
