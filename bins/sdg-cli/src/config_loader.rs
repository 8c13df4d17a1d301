//! Configuration loading: pipeline config from plain YAML, broker config
//! from YAML layered with `SDG_BROKER__*` environment overrides.

use sdg_core::{BrokerConfig, CorrelationConfig};

pub fn load_correlation_config(path: &std::path::Path) -> anyhow::Result<CorrelationConfig> {
    let yaml = std::fs::read_to_string(path)?;
    let config: CorrelationConfig = serde_yaml::from_str(&yaml)?;
    Ok(config)
}

/// Broker config supports environment overlay (e.g. `SDG_BROKER__BOOTSTRAP.SERVERS`)
/// so CI and local runs can swap brokers without editing the file.
pub fn load_broker_config(path: &std::path::Path) -> anyhow::Result<BrokerConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()))
        .add_source(config::Environment::with_prefix("SDG_BROKER").separator("__"));
    let settings = builder.build()?;
    let broker: BrokerConfig = settings.try_deserialize()?;
    Ok(broker)
}
