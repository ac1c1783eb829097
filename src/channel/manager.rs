// src/channel/manager.rs

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use petgraph::{algo::toposort, graphmap::DiGraphMap};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{info, warn};

use super::{Channel, ChannelError};
use crate::{node::{Node, NodeError}, pipeline::Pipeline, store::StoreEngine};

/// The channels file: every channel, its chain and where it stores messages.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ChannelConfig {
    pub name: String,
    /// A sub-channel receives every output of its parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub message_store: StoreEngine,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse channels file: {0}")]
    Parse(String),
    #[error("channel `{0}` is declared twice")]
    DuplicateName(String),
    #[error("channel `{channel}` has unknown parent `{parent}`")]
    UnknownParent { channel: String, parent: String },
    #[error("channel `{0}` is its own ancestor")]
    ParentCycle(String),
    #[error("channel `{channel}`, node {index}: {error}")]
    InvalidNode {
        channel: String,
        index: usize,
        error: NodeError,
    },
}

impl ChannelsConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        serde_yaml_bw::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_yaml(&text)
    }

    /// Structural checks that need no runtime: unique names, known parents
    /// and an acyclic parent relation.
    pub fn check(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for channel in &self.channels {
            if !names.insert(channel.name.as_str()) {
                return Err(ConfigError::DuplicateName(channel.name.clone()));
            }
        }

        let mut graph = DiGraphMap::<&str, ()>::new();
        for channel in &self.channels {
            graph.add_node(channel.name.as_str());
            if let Some(parent) = &channel.parent {
                if !names.contains(parent.as_str()) {
                    return Err(ConfigError::UnknownParent {
                        channel: channel.name.clone(),
                        parent: parent.clone(),
                    });
                }
                graph.add_edge(parent.as_str(), channel.name.as_str(), ());
            }
        }
        toposort(&graph, None).map_err(|cycle| ConfigError::ParentCycle(cycle.node_id().to_string()))?;

        for channel in &self.channels {
            for (index, node) in channel.nodes.iter().enumerate() {
                node.validate().map_err(|error| ConfigError::InvalidNode {
                    channel: channel.name.clone(),
                    index,
                    error,
                })?;
            }
        }
        Ok(())
    }
}

/// Every configured channel, by name.
#[derive(Clone, Debug)]
pub struct ChannelManager {
    channels: Arc<DashMap<String, Arc<Channel>>>,
}

impl ChannelManager {
    pub fn from_config(config: ChannelsConfig, scheduler: Handle) -> Result<Self, ConfigError> {
        config.check()?;

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        let channels = DashMap::new();
        for cfg in config.channels {
            if let Some(parent) = &cfg.parent {
                children.entry(parent.clone()).or_default().push(cfg.name.clone());
            }
            let pipeline = Pipeline::new(cfg.nodes, scheduler.clone()).map_err(|(index, error)| {
                ConfigError::InvalidNode { channel: cfg.name.clone(), index, error }
            })?;
            let channel = Channel::new(cfg.name.clone(), cfg.parent, pipeline, cfg.message_store.build());
            channels.insert(cfg.name, Arc::new(channel));
        }

        for (parent, names) in children {
            let subs: Vec<Arc<Channel>> = names
                .iter()
                .filter_map(|name| channels.get(name).map(|c| Arc::clone(c.value())))
                .collect();
            if let Some(parent) = channels.get(&parent) {
                parent.set_subchannels(subs);
            }
        }

        info!(count = channels.len(), "channels loaded");
        Ok(Self { channels: Arc::new(channels) })
    }

    pub fn get_channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// All channels, sorted by name.
    pub fn all(&self) -> Vec<Arc<Channel>> {
        let mut all: Vec<Arc<Channel>> = self.channels.iter().map(|kv| Arc::clone(kv.value())).collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Channels without a parent, sorted by name.
    pub fn top_level(&self) -> Vec<Arc<Channel>> {
        self.all().into_iter().filter(|c| c.parent().is_none()).collect()
    }

    pub fn list_channels(&self) -> Vec<String> {
        self.all().iter().map(|c| c.name().to_string()).collect()
    }

    pub async fn start_all(&self) -> Result<(), ChannelError> {
        for channel in self.all() {
            channel.start().await?;
        }
        Ok(())
    }

    /// Stops every channel, logging failures instead of giving up early.
    pub async fn stop_all(&self) {
        for channel in self.all() {
            if let Err(e) = channel.stop().await {
                warn!(channel = %channel.name(), error = %e, "failed to stop channel");
            }
        }
    }
}
