use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::{
    message::Message,
    node::{ChannelOrigin, ExecutionResult, Node, NodeContext, NodeError},
};

/// One record per executed node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRecord {
    pub index: usize,
    pub node: String,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    /// `continue`, `drop`, `break` or `error`.
    pub step: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Every node ran; this is the last node's output.
    Completed { message: Message },
    /// A node consumed the message.
    Dropped,
    /// A node stopped the walk early with this as the final output.
    Broken { message: Message },
    Failed { index: usize, node: String, error: NodeError },
}

impl PipelineOutcome {
    /// The message a successful run produced, if any.
    pub fn output(&self) -> Option<&Message> {
        match self {
            PipelineOutcome::Completed { message } | PipelineOutcome::Broken { message } => Some(message),
            PipelineOutcome::Dropped | PipelineOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PipelineOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub records: Vec<NodeRecord>,
    pub outcome: PipelineOutcome,
    /// total elapsed wall time
    pub total_ms: i64,
}

/// An ordered chain of nodes bound to the scheduler it runs on.
///
/// The order is fixed at construction. A message visits the nodes one after
/// another and no node starts before the previous one has returned.
#[derive(Debug)]
pub struct Pipeline {
    nodes: Vec<Node>,
    scheduler: Handle,
}

impl Pipeline {
    /// Validates every node's configuration before accepting the chain.
    pub fn new(nodes: Vec<Node>, scheduler: Handle) -> Result<Self, (usize, NodeError)> {
        for (index, node) in nodes.iter().enumerate() {
            node.validate().map_err(|e| (index, e))?;
        }
        Ok(Self { nodes, scheduler })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn scheduler(&self) -> &Handle {
        &self.scheduler
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub async fn run(&self, msg: Message, origin: &ChannelOrigin) -> ExecutionReport {
        let run_start = Utc::now();
        let ctx = NodeContext::new(origin.clone(), self.scheduler.clone());
        let mut records = Vec::with_capacity(self.nodes.len());
        let mut current = msg;

        let outcome = 'walk: {
            for (index, node) in self.nodes.iter().enumerate() {
                let started = Utc::now();
                let result = node.handle(current, &ctx).await;
                let finished = Utc::now();
                let name = node.type_name();
                trace!(channel = %origin.name(), index, node = %name, step = result.label(), "node finished");
                records.push(NodeRecord {
                    index,
                    node: name.clone(),
                    started,
                    finished,
                    step: result.label(),
                });

                current = match result {
                    ExecutionResult::Continue(next) => next,
                    ExecutionResult::Drop => break 'walk PipelineOutcome::Dropped,
                    ExecutionResult::Break(message) => break 'walk PipelineOutcome::Broken { message },
                    ExecutionResult::Error(error) => {
                        break 'walk PipelineOutcome::Failed { index, node: name, error };
                    }
                };
            }
            PipelineOutcome::Completed { message: current }
        };
        let total_ms = (Utc::now() - run_start).num_milliseconds();
        debug!(channel = %origin.name(), nodes = records.len(), total_ms, "pipeline run finished");
        ExecutionReport { records, outcome, total_ms }
    }
}
