use std::path::PathBuf;

use crate::{
    config::{ConfigManager, ConfigValueError},
    logger::{convert_level, LogLevel},
    remoteadmin::Routes,
};

pub const ADMIN_HOST: &str = "PIPEWRIGHT_ADMIN_HOST";
pub const ADMIN_PORT: &str = "PIPEWRIGHT_ADMIN_PORT";
pub const LEGACY_PATH: &str = "PIPEWRIGHT_LEGACY_PATH";
pub const WS_PATH: &str = "PIPEWRIGHT_WS_PATH";
pub const LOG_LEVEL: &str = "PIPEWRIGHT_LOG_LEVEL";
pub const LOG_DIR: &str = "PIPEWRIGHT_LOG_DIR";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8091;

/// Runtime settings resolved from a [`ConfigManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub admin_host: String,
    pub admin_port: u16,
    pub routes: Routes,
    pub log_level: LogLevel,
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    pub async fn resolve(config: &ConfigManager) -> Result<Self, ConfigValueError> {
        let defaults = Routes::default();
        let log_dir = config.get_or(LOG_DIR, "").await;
        Ok(Self {
            admin_host: config.get_or(ADMIN_HOST, DEFAULT_HOST).await,
            admin_port: config.get_parsed(ADMIN_PORT, DEFAULT_PORT).await?,
            routes: Routes {
                legacy_path: config.get_or(LEGACY_PATH, &defaults.legacy_path).await,
                ws_path: config.get_or(WS_PATH, &defaults.ws_path).await,
            },
            log_level: convert_level(&config.get_or(LOG_LEVEL, "info").await),
            log_dir: (!log_dir.is_empty()).then(|| PathBuf::from(log_dir)),
        })
    }

    pub fn admin_addr(&self) -> String {
        format!("{}:{}", self.admin_host, self.admin_port)
    }
}
