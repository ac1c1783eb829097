use std::sync::{Arc, OnceLock};

use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use super::{ChannelError, ChannelStatus};
use crate::{
    message::Message,
    node::ChannelOrigin,
    pipeline::{Pipeline, PipelineOutcome},
    store::{MessageState, MessageStore},
};

/// Counts a message as in flight until dropped.
struct InFlight<'a>(&'a watch::Sender<usize>);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a watch::Sender<usize>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// A named pipeline with a message store and optional sub-channels that
/// receive whatever it outputs.
#[derive(Debug)]
pub struct Channel {
    name: String,
    uuid: String,
    parent: Option<String>,
    status: watch::Sender<ChannelStatus>,
    in_flight: watch::Sender<usize>,
    lifecycle: Mutex<()>,
    pipeline: Pipeline,
    store: Arc<dyn MessageStore>,
    subchannels: OnceLock<Vec<Arc<Channel>>>,
}

impl Channel {
    pub fn new(
        name: impl Into<String>,
        parent: Option<String>,
        pipeline: Pipeline,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            name: name.into(),
            uuid: uuid::Uuid::new_v4().to_string(),
            parent,
            status: watch::Sender::new(ChannelStatus::Stopped),
            in_flight: watch::Sender::new(0),
            lifecycle: Mutex::new(()),
            pipeline,
            store,
            subchannels: OnceLock::new(),
        }
    }

    /// Wire the channels fed by this one. Only the first call has an effect.
    pub fn set_subchannels(&self, subchannels: Vec<Arc<Channel>>) -> bool {
        self.subchannels.set(subchannels).is_ok()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn subchannels(&self) -> &[Arc<Channel>] {
        self.subchannels.get().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn origin(&self) -> ChannelOrigin {
        ChannelOrigin::new(&self.name, &self.uuid)
    }

    fn set_status(&self, status: ChannelStatus) {
        debug!(channel = %self.name, %status, "status change");
        self.status.send_replace(status);
    }

    pub async fn start(&self) -> Result<(), ChannelError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.status() == ChannelStatus::Started {
            return Ok(());
        }
        self.set_status(ChannelStatus::Starting);
        if let Err(e) = self.store.start().await {
            self.set_status(ChannelStatus::Error);
            error!(channel = %self.name, error = %e, "channel failed to start");
            return Err(e.into());
        }
        self.set_status(ChannelStatus::Started);
        info!(channel = %self.name, store = self.store.name(), "channel started");
        Ok(())
    }

    /// Refuse new messages, then wait for those already inside to finish.
    pub async fn stop(&self) -> Result<(), ChannelError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.status() == ChannelStatus::Stopped {
            return Ok(());
        }
        self.set_status(ChannelStatus::Stopping);
        let mut in_flight = self.in_flight.subscribe();
        let _ = in_flight.wait_for(|n| *n == 0).await;
        self.set_status(ChannelStatus::Stopped);
        info!(channel = %self.name, "channel stopped");
        Ok(())
    }

    /// Run one message through the channel.
    ///
    /// Boxed because forwarding to sub-channels calls back into `handle`.
    pub fn handle(&self, msg: Message) -> BoxFuture<'_, Result<PipelineOutcome, ChannelError>> {
        Box::pin(async move {
            let _in_flight = InFlight::enter(&self.in_flight);
            let status = self.status();
            if status != ChannelStatus::Started {
                return Err(ChannelError::NotStarted { name: self.name.clone(), status });
            }

            let id = self.store.store(&msg).await?;
            self.store.change_message_state(&id, MessageState::Processing).await?;

            let report = self.pipeline.run(msg, &self.origin()).await;
            let final_state = match &report.outcome {
                PipelineOutcome::Completed { .. } | PipelineOutcome::Broken { .. } => MessageState::Processed,
                PipelineOutcome::Dropped => MessageState::Rejected,
                PipelineOutcome::Failed { .. } => MessageState::Error,
            };
            self.store.change_message_state(&id, final_state).await?;

            match report.outcome {
                PipelineOutcome::Failed { index, node, error } => {
                    error!(
                        channel = %self.name,
                        message_id = %id,
                        index,
                        node = %node,
                        error = %error,
                        "message processing failed"
                    );
                    Err(ChannelError::Processing { channel: self.name.clone(), index, node, error })
                }
                outcome => {
                    if let Some(output) = outcome.output() {
                        self.forward(output);
                    }
                    Ok(outcome)
                }
            }
        })
    }

    fn forward(&self, output: &Message) {
        for sub in self.subchannels() {
            let sub = Arc::clone(sub);
            let msg = output.clone();
            let from = self.name.clone();
            self.pipeline.scheduler().spawn(async move {
                if let Err(e) = sub.handle(msg).await {
                    warn!(channel = %from, subchannel = %sub.name(), error = %e, "forwarding failed");
                }
            });
        }
    }

    /// Re-submit a stored message.
    pub async fn replay(&self, id: &str) -> Result<PipelineOutcome, ChannelError> {
        let msg = self.store.get_msg_content(id).await?;
        info!(channel = %self.name, message_id = %id, "replaying message");
        self.handle(msg).await
    }

    pub fn to_dict(&self) -> Value {
        let subchannels: Vec<Value> = self.subchannels().iter().map(|sub| sub.to_dict()).collect();
        json!({
            "name": self.name,
            "status": self.status().as_str(),
            "has_message_store": self.store.persists(),
            "subchannels": subchannels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        node::{ExecutionResult, Node, NodeContext, NodeError, NodeType},
        nodes::{BreakNode, DropNode, JsonToNative, PassNode, RaiseErrorNode},
        store::{MemoryMessageStore, NullMessageStore, SearchQuery, StoreError},
    };
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use tokio::runtime::Handle;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct WaitNode {}

    #[async_trait]
    #[typetag::serde(name = "test_wait")]
    impl NodeType for WaitNode {
        fn type_name(&self) -> String {
            "test_wait".to_string()
        }

        fn process(&self, msg: Message, _ctx: &NodeContext) -> ExecutionResult {
            ExecutionResult::Continue(msg)
        }

        async fn handle(&self, msg: Message, ctx: &NodeContext) -> ExecutionResult {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.process(msg, ctx)
        }
    }

    fn channel(name: &str, nodes: Vec<Node>) -> Arc<Channel> {
        let pipeline = Pipeline::new(nodes, Handle::current()).unwrap();
        Arc::new(Channel::new(name, None, pipeline, Arc::new(MemoryMessageStore::new())))
    }

    async fn only_state(ch: &Channel) -> MessageState {
        let found = ch.store().search(&SearchQuery::default()).await.unwrap();
        assert_eq!(found.len(), 1);
        found[0].state
    }

    #[tokio::test]
    async fn rejects_until_started() {
        let ch = channel("idle", vec![Node::new(PassNode {})]);
        let err = ch.handle(Message::text("x")).await.unwrap_err();
        assert_eq!(err, ChannelError::NotStarted { name: "idle".into(), status: ChannelStatus::Stopped });
        ch.start().await.unwrap();
        assert_eq!(ch.status(), ChannelStatus::Started);
        assert!(ch.handle(Message::text("x")).await.is_ok());
    }

    #[tokio::test]
    async fn final_states_follow_outcome() {
        let ok = channel("ok", vec![Node::new(PassNode {})]);
        ok.start().await.unwrap();
        ok.handle(Message::text("x")).await.unwrap();
        assert_eq!(only_state(&ok).await, MessageState::Processed);

        let dropped = channel("dropped", vec![Node::new(DropNode {})]);
        dropped.start().await.unwrap();
        assert_eq!(dropped.handle(Message::text("x")).await.unwrap(), PipelineOutcome::Dropped);
        assert_eq!(only_state(&dropped).await, MessageState::Rejected);

        let failing = channel("failing", vec![Node::new(RaiseErrorNode::default())]);
        failing.start().await.unwrap();
        let err = failing.handle(Message::text("x")).await.unwrap_err();
        assert_eq!(
            err,
            ChannelError::Processing {
                channel: "failing".into(),
                index: 0,
                node: "raise_error".into(),
                error: NodeError::ExecutionFailed("Test node".into()),
            }
        );
        assert_eq!(only_state(&failing).await, MessageState::Error);
    }

    #[tokio::test]
    async fn output_is_forwarded_to_subchannels() {
        let parent = channel("parent", vec![Node::new(PassNode {})]);
        let child = channel("child", vec![Node::new(PassNode {})]);
        assert!(parent.set_subchannels(vec![Arc::clone(&child)]));
        parent.start().await.unwrap();
        child.start().await.unwrap();

        parent.handle(Message::text("fan out")).await.unwrap();
        for _ in 0..50 {
            if child.store().total().await.unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let got = child.store().search(&SearchQuery::default()).await.unwrap();
        assert_eq!(got[0].message.payload(), &json!("fan out"));
        assert_eq!(parent.to_dict()["subchannels"][0]["name"], json!("child"));
    }

    /// Waits for `expected` messages to finish processing in `ch`.
    async fn processed(ch: &Channel, expected: usize) -> usize {
        let mut done = 0;
        for _ in 0..50 {
            let found = ch.store().search(&SearchQuery::default()).await.unwrap();
            done = found.iter().filter(|m| m.state == MessageState::Processed).count();
            if done == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        done
    }

    #[tokio::test]
    async fn break_output_still_reaches_subchannels() {
        let parent = channel(
            "parent",
            vec![Node::new(JsonToNative {}), Node::new(BreakNode {}), Node::new(RaiseErrorNode::default())],
        );
        let child = channel("child", vec![Node::new(PassNode {})]);
        parent.set_subchannels(vec![Arc::clone(&child)]);
        parent.start().await.unwrap();
        child.start().await.unwrap();

        let outcome = parent.handle(Message::text(r#"{"stop": "here"}"#)).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Broken { .. }));
        assert_eq!(only_state(&parent).await, MessageState::Processed);

        assert_eq!(processed(&child, 1).await, 1);
        let got = child.store().search(&SearchQuery::default()).await.unwrap();
        assert_eq!(got[0].message.payload(), &json!({"stop": "here"}));
    }

    #[tokio::test]
    async fn dropped_message_reaches_no_subchannel() {
        let parent = channel("parent", vec![Node::new(PassNode {}), Node::new(DropNode {})]);
        let child = channel("child", vec![Node::new(PassNode {})]);
        parent.set_subchannels(vec![Arc::clone(&child)]);
        parent.start().await.unwrap();
        child.start().await.unwrap();

        assert_eq!(parent.handle(Message::text("gone")).await.unwrap(), PipelineOutcome::Dropped);
        assert_eq!(only_state(&parent).await, MessageState::Rejected);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(child.store().total().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_messages() {
        let ch = channel("slow", vec![Node::new(WaitNode {})]);
        ch.start().await.unwrap();
        let worker = {
            let ch = Arc::clone(&ch);
            tokio::spawn(async move { ch.handle(Message::text("x")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        ch.stop().await.unwrap();
        assert!(worker.is_finished());
        assert_eq!(ch.status(), ChannelStatus::Stopped);
        assert!(worker.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn replay_resubmits_stored_message() {
        let ch = channel("replay", vec![Node::new(PassNode {})]);
        ch.start().await.unwrap();
        let msg = Message::text("again");
        ch.handle(msg.clone()).await.unwrap();
        let outcome = ch.replay(msg.uuid()).await.unwrap();
        assert_eq!(outcome.output().map(|m| m.uuid()), Some(msg.uuid()));
        assert_eq!(
            ch.replay("missing").await.unwrap_err(),
            ChannelError::Store(StoreError::NotFound("missing".into()))
        );
    }

    #[tokio::test]
    async fn dict_reports_store_presence() {
        let pipeline = Pipeline::new(Vec::new(), Handle::current()).unwrap();
        let ch = Channel::new("bare", None, pipeline, Arc::new(NullMessageStore::new()));
        assert_eq!(
            ch.to_dict(),
            json!({"name": "bare", "status": "STOPPED", "has_message_store": false, "subchannels": []})
        );
    }
}
