//! Runs a wrapped stage off the scheduler threads.
//!
//! The scheduler must never block on slow synchronous work, so `offload`
//! moves the inner stage's `process` somewhere it is allowed to block:
//!
//! * `dedicated` (default): one named worker thread per stage instance,
//!   spawned on first use. Jobs queue in arrival order and the thread exits
//!   once the stage is dropped.
//! * `per_call`: every invocation borrows a blocking thread from the
//!   scheduler handle, serialized by a per-stage lock.
//!
//! Either way the inner stage sees one message at a time.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
    thread,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    message::Message,
    node::{ExecutionResult, Node, NodeContext, NodeError, NodeType},
};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffloadMode {
    #[default]
    Dedicated,
    PerCall,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OffloadNode {
    pub node: Arc<Node>,
    #[serde(default)]
    pub mode: OffloadMode,
    #[serde(skip)]
    worker: Arc<Mutex<Option<mpsc::UnboundedSender<Job>>>>,
    #[serde(skip)]
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl OffloadNode {
    pub fn new(node: Node, mode: OffloadMode) -> Self {
        Self {
            node: Arc::new(node),
            mode,
            worker: Arc::default(),
            gate: Arc::default(),
        }
    }

    fn worker(&self) -> Result<mpsc::UnboundedSender<Job>, NodeError> {
        let mut slot = self
            .worker
            .lock()
            .map_err(|_| NodeError::Offload("worker slot poisoned".to_string()))?;
        if let Some(tx) = slot.as_ref() {
            if !tx.is_closed() {
                return Ok(tx.clone());
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let name = format!("offload-{}", self.node.type_name());
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    job();
                }
                debug!(worker = %name, "offload worker stopped");
            })
            .map_err(|e| NodeError::Offload(format!("cannot start worker thread: {e}")))?;
        debug!(node = %self.node.type_name(), "offload worker started");
        *slot = Some(tx.clone());
        Ok(tx)
    }

    async fn run_dedicated(&self, msg: Message, ctx: &NodeContext) -> Result<ExecutionResult, NodeError> {
        let tx = self.worker()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        let node = Arc::clone(&self.node);
        let ctx = ctx.clone();
        let job: Job = Box::new(move || {
            let out = panic::catch_unwind(AssertUnwindSafe(|| node.process(msg, &ctx)))
                .unwrap_or_else(|payload| ExecutionResult::Error(panicked(payload)));
            let _ = reply_tx.send(out);
        });
        tx.send(job)
            .map_err(|_| NodeError::Offload("worker thread has exited".to_string()))?;
        reply_rx
            .await
            .map_err(|_| NodeError::Offload("worker dropped the job".to_string()))
    }

    async fn run_per_call(&self, msg: Message, ctx: &NodeContext) -> Result<ExecutionResult, NodeError> {
        let _turn = self.gate.lock().await;
        let node = Arc::clone(&self.node);
        let job_ctx = ctx.clone();
        ctx.scheduler()
            .spawn_blocking(move || node.process(msg, &job_ctx))
            .await
            .map_err(|e| {
                if e.is_panic() {
                    panicked(e.into_panic())
                } else {
                    NodeError::Offload(e.to_string())
                }
            })
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> NodeError {
    let reason = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    NodeError::Offload(format!("stage panicked: {reason}"))
}

#[async_trait]
#[typetag::serde(name = "offload")]
impl NodeType for OffloadNode {
    fn type_name(&self) -> String {
        "offload".to_string()
    }

    fn validate(&self) -> Result<(), NodeError> {
        if self.node.type_name() == "offload" {
            return Err(NodeError::Config("offload cannot wrap another offload".to_string()));
        }
        self.node.validate()
    }

    /// Synchronous callers get the inner stage inline.
    fn process(&self, msg: Message, ctx: &NodeContext) -> ExecutionResult {
        self.node.process(msg, ctx)
    }

    async fn handle(&self, msg: Message, ctx: &NodeContext) -> ExecutionResult {
        let out = match self.mode {
            OffloadMode::Dedicated => self.run_dedicated(msg, ctx).await,
            OffloadMode::PerCall => self.run_per_call(msg, ctx).await,
        };
        out.unwrap_or_else(|e| {
            warn!(node = %self.node.type_name(), error = %e, "offloaded stage failed");
            ExecutionResult::Error(e)
        })
    }
}
