use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    logger::LogLevel,
    message::Message,
    node::{ExecutionResult, NodeContext, NodeError, NodeType},
};

/// Identity stage.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PassNode {}

#[async_trait]
#[typetag::serde(name = "pass")]
impl NodeType for PassNode {
    fn type_name(&self) -> String {
        "pass".to_string()
    }

    fn process(&self, msg: Message, _ctx: &NodeContext) -> ExecutionResult {
        ExecutionResult::Continue(msg)
    }
}

/// Always fails. Used to exercise error paths of a channel.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RaiseErrorNode {
    #[serde(default = "RaiseErrorNode::default_reason")]
    pub reason: String,
}

impl RaiseErrorNode {
    fn default_reason() -> String {
        "Test node".to_string()
    }
}

impl Default for RaiseErrorNode {
    fn default() -> Self {
        RaiseErrorNode { reason: Self::default_reason() }
    }
}

#[async_trait]
#[typetag::serde(name = "raise_error")]
impl NodeType for RaiseErrorNode {
    fn type_name(&self) -> String {
        "raise_error".to_string()
    }

    fn process(&self, _msg: Message, _ctx: &NodeContext) -> ExecutionResult {
        ExecutionResult::Error(NodeError::ExecutionFailed(self.reason.clone()))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DropNode {}

#[async_trait]
#[typetag::serde(name = "drop")]
impl NodeType for DropNode {
    fn type_name(&self) -> String {
        "drop".to_string()
    }

    fn process(&self, _msg: Message, _ctx: &NodeContext) -> ExecutionResult {
        ExecutionResult::Drop
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct BreakNode {}

#[async_trait]
#[typetag::serde(name = "break")]
impl NodeType for BreakNode {
    fn type_name(&self) -> String {
        "break".to_string()
    }

    fn process(&self, msg: Message, _ctx: &NodeContext) -> ExecutionResult {
        ExecutionResult::Break(msg)
    }
}

/// Logs the owning channel and the payload, then passes the message on.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogNode {
    #[serde(default = "LogNode::default_level")]
    pub level: LogLevel,
}

impl LogNode {
    fn default_level() -> LogLevel {
        LogLevel::Info
    }
}

impl Default for LogNode {
    fn default() -> Self {
        LogNode { level: Self::default_level() }
    }
}

#[async_trait]
#[typetag::serde(name = "log")]
impl NodeType for LogNode {
    fn type_name(&self) -> String {
        "log".to_string()
    }

    fn process(&self, msg: Message, ctx: &NodeContext) -> ExecutionResult {
        let origin = ctx.origin();
        let context = format!("{} ({})", origin.name(), origin.uuid());
        self.level.log(&context, &msg.payload_text());
        ExecutionResult::Continue(msg)
    }
}

/// Replaces whatever came in with a fresh, empty message.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EmptyNode {}

#[async_trait]
#[typetag::serde(name = "empty")]
impl NodeType for EmptyNode {
    fn type_name(&self) -> String {
        "empty".to_string()
    }

    fn process(&self, _msg: Message, _ctx: &NodeContext) -> ExecutionResult {
        ExecutionResult::Continue(Message::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CONTENT_TYPE_TEXT;
    use crate::node::{ChannelOrigin, Node};
    use serde_json::{json, Value};
    use tokio::runtime::Handle;

    fn ctx() -> NodeContext {
        NodeContext::new(ChannelOrigin::new("test", "uuid-1"), Handle::current())
    }

    #[tokio::test]
    async fn pass_returns_message_unchanged() {
        let msg = Message::text("same");
        let out = PassNode {}.handle(msg.clone(), &ctx()).await;
        assert_eq!(out, ExecutionResult::Continue(msg));
    }

    #[tokio::test]
    async fn raise_error_always_errors() {
        let out = RaiseErrorNode::default().handle(Message::text("x"), &ctx()).await;
        assert_eq!(out, ExecutionResult::Error(NodeError::ExecutionFailed("Test node".into())));

        let custom = RaiseErrorNode { reason: "boom".into() };
        let out = custom.handle(Message::text("x"), &ctx()).await;
        assert_eq!(out, ExecutionResult::Error(NodeError::ExecutionFailed("boom".into())));
    }

    #[tokio::test]
    async fn drop_and_break_signal() {
        let msg = Message::text("x");
        assert_eq!(DropNode {}.handle(msg.clone(), &ctx()).await, ExecutionResult::Drop);
        assert_eq!(BreakNode {}.handle(msg.clone(), &ctx()).await, ExecutionResult::Break(msg));
    }

    #[tokio::test]
    async fn log_passes_through() {
        let msg = Message::text("logged");
        let out = LogNode { level: LogLevel::Debug }.handle(msg.clone(), &ctx()).await;
        assert_eq!(out, ExecutionResult::Continue(msg));
    }

    #[tokio::test]
    async fn empty_replaces_message() {
        let msg = Message::new(json!({"full": true}), "application/json");
        let ExecutionResult::Continue(out) = EmptyNode {}.handle(msg.clone(), &ctx()).await else {
            panic!("empty should continue");
        };
        assert_ne!(out.uuid(), msg.uuid());
        assert_eq!(out.payload(), &Value::Null);
        assert_eq!(out.content_type(), CONTENT_TYPE_TEXT);
    }

    #[test]
    fn yaml_declarations_pick_defaults() {
        let nodes: Vec<Node> = serde_yaml_bw::from_str(
            "- type: pass\n- type: log\n- type: raise_error\n  reason: nope\n- type: drop\n",
        )
        .unwrap();
        let names: Vec<String> = nodes.iter().map(|n| n.type_name()).collect();
        assert_eq!(names, vec!["pass", "log", "raise_error", "drop"]);
        assert_eq!(
            serde_json::to_value(&nodes[1]).unwrap(),
            json!({"type": "log", "level": "info"})
        );
    }
}
