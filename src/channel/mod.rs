/*
┌──────────────────────────────────────────────┐
│                ChannelManager                │
│   name → Arc<Channel>, built from YAML       │
└──────────────────────────────────────────────┘
                 │ get_channel / start / stop
                 ▼
┌──────────────────────────────────────────────┐
│                   Channel                    │
│  handle(msg):                                │
│    store (PENDING → PROCESSING)              │
│    pipeline.run ──▶ node 0 ▶ node 1 ▶ …      │
│    final state, forward to sub-channels      │
└──────────────────────────────────────────────┘
                 │ spawn per sub-channel
                 ▼
            sub-channel.handle(output)
*/
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{node::NodeError, store::StoreError};

pub mod base;
pub mod manager;

pub use base::Channel;
pub use manager::{ChannelConfig, ChannelManager, ChannelsConfig, ConfigError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChannelStatus {
    Stopped,
    Starting,
    Started,
    Stopping,
    Error,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Stopped => "STOPPED",
            ChannelStatus::Starting => "STARTING",
            ChannelStatus::Started => "STARTED",
            ChannelStatus::Stopping => "STOPPING",
            ChannelStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChannelError {
    #[error("channel `{name}` is {status}, not STARTED")]
    NotStarted { name: String, status: ChannelStatus },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("channel `{channel}` failed at node {index} ({node}): {error}")]
    Processing {
        channel: String,
        index: usize,
        node: String,
        error: NodeError,
    },
}
