//! Configuration loader for Confidant.
//!
//! Reads `config.toml` from the data directory (`~/.confidant/` in production)
//! and deserializes it into [`EngineConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use confidant_types::config::EngineConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CONFIDANT_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `CONFIDANT_DATA_DIR` environment variable
/// 2. `~/.confidant`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".confidant");
    }

    PathBuf::from(".confidant")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => sanitize(config),
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

/// Clamp values that would disable the engine's guarantees.
fn sanitize(mut config: EngineConfig) -> EngineConfig {
    let defaults = EngineConfig::default();
    let memory = &mut config.memory;
    if memory.thread_cap == 0 {
        tracing::warn!("memory.thread_cap must be positive, using default");
        memory.thread_cap = defaults.memory.thread_cap;
    }
    if memory.compression_window == 0 {
        tracing::warn!("memory.compression_window must be positive, using default");
        memory.compression_window = defaults.memory.compression_window;
    }
    if config.provider.timeout_ms == 0 {
        tracing::warn!("provider.timeout_ms must be positive, using default");
        config.provider.timeout_ms = defaults.provider.timeout_ms;
    }
    let relay = &mut config.relay;
    if relay.heartbeat_ms == 0 {
        relay.heartbeat_ms = defaults.relay.heartbeat_ms;
    }
    if relay.stream_idle_ms == 0 {
        tracing::warn!("relay.stream_idle_ms must be positive, using default");
        relay.stream_idle_ms = defaults.relay.stream_idle_ms;
    }
    if relay.stream_max_ms < relay.stream_idle_ms {
        tracing::warn!("relay.stream_max_ms is below relay.stream_idle_ms, raising it");
        relay.stream_max_ms = relay.stream_idle_ms;
    }
    if relay.channel_capacity == 0 {
        relay.channel_capacity = 1;
    }
    config.provider.retry_budget_factor = config.provider.retry_budget_factor.clamp(0.1, 1.0);
    config
}
