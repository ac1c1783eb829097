use std::{env, fmt, path::PathBuf, str::FromStr, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigValueError {
    #[error("`{key}` has invalid value `{value}`: {reason}")]
    Invalid { key: String, value: String, reason: String },
}

/// Key/value configuration source.
#[async_trait]
pub trait ConfigManagerType: Send + Sync {
    async fn keys(&self) -> Vec<String>;
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str);
    async fn del(&self, key: &str);

    fn name(&self) -> &'static str;
}

#[derive(Clone)]
pub struct ConfigManager(pub Arc<dyn ConfigManagerType>);

impl ConfigManager {
    pub fn new<C: ConfigManagerType + 'static>(inner: C) -> Self {
        ConfigManager(Arc::new(inner))
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).await
    }

    pub async fn set(&self, key: &str, value: &str) {
        self.0.set(key, value).await
    }

    /// Parsed value of `key`, or `default` when unset or blank.
    pub async fn get_parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigValueError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.0.get(key).await {
            Some(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map_err(|e| ConfigValueError::Invalid {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
            _ => Ok(default),
        }
    }

    pub async fn get_or(&self, key: &str, default: &str) -> String {
        match self.0.get(key).await {
            Some(value) if !value.trim().is_empty() => value,
            _ => default.to_string(),
        }
    }
}

impl fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConfigManager").field(&self.0.name()).finish()
    }
}

/// Process environment, optionally seeded from a `.env` file. Values set at
/// runtime stay in this manager and never touch the process environment.
#[derive(Debug, Default)]
pub struct EnvConfigManager {
    env_file: Option<PathBuf>,
    overrides: DashMap<String, String>,
}

impl EnvConfigManager {
    pub fn new(env_file: Option<PathBuf>) -> Self {
        if let Some(path) = &env_file {
            match dotenvy::from_path(path) {
                Ok(()) => info!("Loaded .env from {}", path.display()),
                Err(e) => warn!("could not load .env from {}: {e}", path.display()),
            }
        }
        Self { env_file, overrides: DashMap::new() }
    }

    pub fn env_file(&self) -> Option<&PathBuf> {
        self.env_file.as_ref()
    }
}

#[async_trait]
impl ConfigManagerType for EnvConfigManager {
    async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = env::vars().map(|(k, _)| k).collect();
        keys.extend(self.overrides.iter().map(|kv| kv.key().clone()));
        keys.sort();
        keys.dedup();
        keys
    }

    async fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(key) {
            return Some(value.clone());
        }
        env::var(key).ok()
    }

    async fn set(&self, key: &str, value: &str) {
        self.overrides.insert(key.to_string(), value.to_string());
    }

    async fn del(&self, key: &str) {
        self.overrides.remove(key);
    }

    fn name(&self) -> &'static str {
        "env"
    }
}

/// In-memory source, used by tests and embedders.
#[derive(Debug, Default)]
pub struct MapConfigManager {
    map: DashMap<String, String>,
}

impl MapConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.map.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl ConfigManagerType for MapConfigManager {
    async fn keys(&self) -> Vec<String> {
        self.map.iter().map(|kv| kv.key().clone()).collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    async fn set(&self, key: &str, value: &str) {
        self.map.insert(key.to_string(), value.to_string());
    }

    async fn del(&self, key: &str) {
        self.map.remove(key);
    }

    fn name(&self) -> &'static str {
        "map"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn map_manager_round_trip() {
        let config = ConfigManager::new(MapConfigManager::new().with("A", "1"));
        assert_eq!(config.get("A").await, Some("1".into()));
        config.set("B", "2").await;
        config.0.del("A").await;
        assert_eq!(config.get("A").await, None);
        let mut keys = config.0.keys().await;
        keys.sort();
        assert_eq!(keys, vec!["B"]);
    }

    #[tokio::test]
    async fn parsed_values_and_defaults() {
        let config = ConfigManager::new(MapConfigManager::new().with("PORT", "9000").with("BAD", "x").with("BLANK", " "));
        assert_eq!(config.get_parsed::<u16>("PORT", 1).await, Ok(9000));
        assert_eq!(config.get_parsed::<u16>("MISSING", 1).await, Ok(1));
        assert_eq!(config.get_parsed::<u16>("BLANK", 1).await, Ok(1));
        assert!(config.get_parsed::<u16>("BAD", 1).await.is_err());
        assert_eq!(config.get_or("MISSING", "dflt").await, "dflt");
    }

    #[tokio::test]
    async fn env_file_values_are_visible() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "PIPEWRIGHT_TEST_FROM_FILE=loaded").unwrap();
        let manager = EnvConfigManager::new(Some(file.path().to_path_buf()));
        assert_eq!(manager.get("PIPEWRIGHT_TEST_FROM_FILE").await, Some("loaded".into()));

        manager.set("PIPEWRIGHT_TEST_FROM_FILE", "overridden").await;
        assert_eq!(manager.get("PIPEWRIGHT_TEST_FROM_FILE").await, Some("overridden".into()));
        manager.del("PIPEWRIGHT_TEST_FROM_FILE").await;
        assert_eq!(manager.get("PIPEWRIGHT_TEST_FROM_FILE").await, Some("loaded".into()));
    }
}
