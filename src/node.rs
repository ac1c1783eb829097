use std::{borrow::Cow, fmt};
use async_trait::async_trait;
use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;
use tokio::runtime::Handle;

use crate::{message::Message, nodes::BUILTIN_NODE_TYPES};

/// What a stage decided about the message it was handed.
///
/// Exactly one variant per invocation. `Drop` and `Break` are control
/// signals, not failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// Transformed; hand the message to the next stage.
    Continue(Message),
    /// Discard silently. Nothing downstream runs and nothing is reported as failed.
    Drop,
    /// Stop walking the chain; this message is the final output.
    Break(Message),
    /// The stage's own logic failed.
    Error(NodeError),
}

impl ExecutionResult {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionResult::Continue(_) => "continue",
            ExecutionResult::Drop => "drop",
            ExecutionResult::Break(_) => "break",
            ExecutionResult::Error(_) => "error",
        }
    }
}

impl From<Result<Message, NodeError>> for ExecutionResult {
    fn from(res: Result<Message, NodeError>) -> Self {
        match res {
            Ok(msg) => ExecutionResult::Continue(msg),
            Err(err) => ExecutionResult::Error(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum NodeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Processing error: {0}")]
    ExecutionFailed(String),
    #[error("Offloaded work failed: {0}")]
    Offload(String),
    #[error("Invalid node configuration: {0}")]
    Config(String),
}

/// Identity of the channel that owns a chain. Nodes read it for logging and
/// reporting only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelOrigin {
    name: String,
    uuid: String,
}

impl ChannelOrigin {
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self { name: name.into(), uuid: uuid.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}

/// Everything a node may look at besides the message itself.
#[derive(Clone, Debug)]
pub struct NodeContext {
    origin: ChannelOrigin,
    scheduler: Handle,
}

impl NodeContext {
    pub fn new(origin: ChannelOrigin, scheduler: Handle) -> Self {
        Self { origin, scheduler }
    }

    pub fn origin(&self) -> &ChannelOrigin {
        &self.origin
    }

    /// The scheduler the owning pipeline was built with.
    pub fn scheduler(&self) -> &Handle {
        &self.scheduler
    }
}

/// One stage of a chain.
///
/// Implementors usually only write [`NodeType::process`], a synchronous
/// transform. [`NodeType::handle`] is what the runner awaits; its default
/// runs `process` inline on the scheduler. Stages whose work blocks are
/// wrapped in an `offload` node instead of overriding `handle` themselves.
///
/// A node processes one message at a time and its configuration never
/// changes after construction.
#[async_trait]
#[typetag::serde(tag = "type")]
pub trait NodeType: Send + Sync + Debug {
    fn type_name(&self) -> String;

    /// Construction-time checks of the node's configuration.
    fn validate(&self) -> Result<(), NodeError> {
        Ok(())
    }

    fn process(&self, msg: Message, ctx: &NodeContext) -> ExecutionResult;

    async fn handle(&self, msg: Message, ctx: &NodeContext) -> ExecutionResult {
        self.process(msg, ctx)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Node(pub Box<dyn NodeType>);

impl Node {
    pub fn new<N: NodeType + 'static>(node: N) -> Self {
        Node(Box::new(node))
    }
}

impl std::ops::Deref for Node {
    type Target = dyn NodeType;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // This will call the concrete node’s `Debug` impl
        f.debug_tuple("Node").field(&self.0).finish()
    }
}

/// Nodes are a typetag registry, so the schema only pins the `type` tag.
impl JsonSchema for Node {
    fn schema_name() -> Cow<'static, str> {
        "Node".into()
    }

    fn json_schema(_generator: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": "object",
            "required": ["type"],
            "properties": {
                "type": { "type": "string", "enum": BUILTIN_NODE_TYPES }
            },
            "additionalProperties": true
        })
    }
}
