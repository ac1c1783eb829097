use std::{sync::Arc, time::Instant};

use admin_protocol::command::{ChannelParams, Command, ListMsgsParams, MessageParams};
use serde_json::{json, Value};
use tracing::{debug, warn, Level};

use crate::{
    channel::{Channel, ChannelManager},
    pipeline::PipelineOutcome,
    store::SearchQuery,
};

/// Executes decoded admin commands against the channel registry.
///
/// Lookup failures become `{"error": ...}` entries inside the result;
/// nothing here ends a session.
#[derive(Clone, Debug)]
pub struct CommandDispatcher {
    channels: ChannelManager,
}

fn error_entry(e: impl std::fmt::Display) -> Value {
    json!({ "error": e.to_string() })
}

fn not_found(name: &str) -> Value {
    error_entry(format!("channel `{name}` not found"))
}

fn is_error(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.contains_key("error"),
        Value::Array(items) => items.iter().any(|item| item.get("error").is_some()),
        _ => false,
    }
}

impl CommandDispatcher {
    pub fn new(channels: ChannelManager) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    pub async fn dispatch(&self, command: Command) -> Value {
        let method = command.method();
        let started = Instant::now();
        debug!(method, "dispatching admin command");

        let result = match command {
            Command::ListChannels => self.list_channels(),
            Command::StartChannel(params) => self.start_channel(params).await,
            Command::StopChannel(params) => self.stop_channel(params).await,
            Command::ListMsgs(params) => self.list_msgs(params).await,
            Command::ViewMsg(params) => self.view_msg(params).await,
            Command::PreviewMsg(params) => self.preview_msg(params).await,
            Command::ReplayMsg(params) => self.replay_msg(params).await,
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let status = if is_error(&result) { "error" } else { "ok" };
        if status == "error" {
            warn!(method, %result, "admin command reported an error");
        }
        tracing::event!(target: "request", Level::INFO, method, latency_ms, status);
        result
    }

    fn list_channels(&self) -> Value {
        Value::Array(self.channels.top_level().iter().map(|c| c.to_dict()).collect())
    }

    async fn start_channel(&self, params: ChannelParams) -> Value {
        let Some(channel) = self.channels.get_channel(&params.channel) else {
            return not_found(&params.channel);
        };
        match channel.start().await {
            Ok(()) => json!({ "name": channel.name(), "status": channel.status().as_str() }),
            Err(e) => error_entry(e),
        }
    }

    async fn stop_channel(&self, params: ChannelParams) -> Value {
        let Some(channel) = self.channels.get_channel(&params.channel) else {
            return not_found(&params.channel);
        };
        match channel.stop().await {
            Ok(()) => json!({ "name": channel.name(), "status": channel.status().as_str() }),
            Err(e) => error_entry(e),
        }
    }

    async fn list_msgs(&self, params: ListMsgsParams) -> Value {
        let Some(channel) = self.channels.get_channel(&params.channel) else {
            return not_found(&params.channel);
        };
        let store = channel.store();
        let query = match SearchQuery::from_params(&params) {
            Ok(query) => query,
            Err(e) => return error_entry(e),
        };
        let found = match store.search(&query).await {
            Ok(found) => found,
            Err(e) => return error_entry(e),
        };
        let total = match store.total().await {
            Ok(total) => total,
            Err(e) => return error_entry(e),
        };
        let messages: Vec<Value> = found
            .into_iter()
            .map(|entry| {
                json!({
                    "id": entry.id,
                    "state": entry.state,
                    "timestamp": entry.message.timestamp_str(),
                    "message": entry.message.to_json(),
                })
            })
            .collect();
        json!({ "messages": messages, "total": total })
    }

    /// Per-message commands answer with a one-element list.
    async fn with_channel<F, Fut>(&self, params: MessageParams, f: F) -> Value
    where
        F: FnOnce(Arc<Channel>, String) -> Fut,
        Fut: std::future::Future<Output = Value>,
    {
        let entry = match self.channels.get_channel(&params.channel) {
            Some(channel) => f(channel, params.message_id).await,
            None => not_found(&params.channel),
        };
        Value::Array(vec![entry])
    }

    async fn view_msg(&self, params: MessageParams) -> Value {
        self.with_channel(params, |channel, id| async move {
            match channel.store().get_msg_content(&id).await {
                Ok(msg) => msg.to_dict(),
                Err(e) => error_entry(e),
            }
        })
        .await
    }

    async fn preview_msg(&self, params: MessageParams) -> Value {
        self.with_channel(params, |channel, id| async move {
            match channel.store().get_preview_str(&id).await {
                Ok(msg) => msg.to_dict(),
                Err(e) => error_entry(e),
            }
        })
        .await
    }

    async fn replay_msg(&self, params: MessageParams) -> Value {
        self.with_channel(params, |channel, id| async move {
            match channel.replay(&id).await {
                Ok(PipelineOutcome::Completed { message } | PipelineOutcome::Broken { message }) => {
                    message.to_dict()
                }
                Ok(PipelineOutcome::Dropped) => json!({ "dropped": true }),
                Ok(PipelineOutcome::Failed { error, .. }) => error_entry(error),
                Err(e) => error_entry(e),
            }
        })
        .await
    }
}
