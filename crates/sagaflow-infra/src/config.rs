//! Engine configuration loader.
//!
//! Reads `sagaflow.toml` and deserializes it into [`EngineConfig`]. Falls back
//! to defaults when the file is missing or malformed.

use std::path::Path;

use sagaflow_types::config::EngineConfig;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "sagaflow.toml";

/// Smallest event channel the engine will use.
const MIN_EVENT_CAPACITY: usize = 16;

/// Load engine configuration from `path`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config with floors applied.
pub async fn load_engine_config(path: &Path) -> EngineConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(mut config) => {
            config.event_capacity = resolve_event_capacity(config.event_capacity);
            config
        }
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            EngineConfig::default()
        }
    }
}

/// Enforce the event channel floor.
pub fn resolve_event_capacity(configured: usize) -> usize {
    configured.max(MIN_EVENT_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(&tmp.path().join(CONFIG_FILE_NAME)).await;
        assert_eq!(config.event_capacity, 1024);
        assert_eq!(config.default_retry.max_attempts, 1);
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(
            &config_path,
            r#"
max_backoff_ms = 250

[default_retry]
maxAttempts = 4
backoffMs = 10
backoffMultiplier = 1.5

[simulation]
fail_actions = ["payments.charge"]
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(&config_path).await;
        assert_eq!(config.max_backoff_ms, 250);
        assert_eq!(config.default_retry.max_attempts, 4);
        assert_eq!(config.simulation.fail_actions, vec!["payments.charge"]);
    }

    #[tokio::test]
    async fn load_engine_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&config_path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_engine_config(&config_path).await;
        assert_eq!(config.event_capacity, 1024);
        assert!(config.simulation.fail_actions.is_empty());
    }

    #[tokio::test]
    async fn load_engine_config_applies_capacity_floor() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&config_path, "event_capacity = 2").await.unwrap();

        let config = load_engine_config(&config_path).await;
        assert_eq!(config.event_capacity, MIN_EVENT_CAPACITY);
    }

    #[test]
    fn resolve_event_capacity_keeps_larger_values() {
        assert_eq!(resolve_event_capacity(4096), 4096);
        assert_eq!(resolve_event_capacity(0), MIN_EVENT_CAPACITY);
    }
}
