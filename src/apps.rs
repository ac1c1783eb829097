// src/apps.rs
use std::path::Path;

use anyhow::{Context, Error, Result};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::{
    channel::{ChannelManager, ChannelsConfig},
    remoteadmin::{AdminServer, CommandDispatcher},
    settings::Settings,
};

/// The running process: every channel plus the admin listener in front of them.
#[derive(Debug, Default)]
pub struct App {
    channel_manager: Option<ChannelManager>,
    admin: Option<AdminServer>,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bootstraps pipewright:
    ///   - loads and checks the channels file
    ///   - builds and starts every channel
    ///   - opens the remote admin listener
    pub async fn bootstrap(&mut self, settings: &Settings, channels_path: &Path) -> Result<(), Error> {
        let config = ChannelsConfig::load(channels_path)
            .with_context(|| format!("failed to load channels from {}", channels_path.display()))?;
        let manager = ChannelManager::from_config(config, Handle::current())?;
        manager.start_all().await?;
        info!(channels = ?manager.list_channels(), "channels started");
        self.channel_manager = Some(manager.clone());

        let admin = AdminServer::bind(
            &settings.admin_addr(),
            settings.routes.clone(),
            CommandDispatcher::new(manager),
        )
        .await?;
        self.admin = Some(admin);
        Ok(())
    }

    pub fn channel_manager(&self) -> Option<&ChannelManager> {
        self.channel_manager.as_ref()
    }

    pub fn admin(&self) -> Option<&AdminServer> {
        self.admin.as_ref()
    }

    /// Closes the admin listener first so no command lands on a stopping channel.
    pub async fn shutdown(&mut self) {
        if let Some(admin) = self.admin.take() {
            admin.shutdown().await;
        }
        match self.channel_manager.take() {
            Some(manager) => manager.stop_all().await,
            None => warn!("shutdown called before bootstrap"),
        }
        info!("pipewright stopped");
    }
}
