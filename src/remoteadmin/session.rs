use admin_protocol::{
    command::Command,
    jsonrpc::{Request, Response},
    legacy::{self, LegacyError},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::broadcast,
};
use tokio_tungstenite::{tungstenite::Message as WsMsg, WebSocketStream};
use tracing::{debug, info, warn};

use super::dispatcher::CommandDispatcher;

/// Calling style spoken on an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// `{"method": ..., "params": {named}}`, raw result frames.
    Current,
    /// `{"method": ..., "params": [positional], "id": ...}`, JSON-RPC result frames.
    Legacy,
}

/// What to send back for one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameReply {
    Send(String),
    /// Send, then stop reading from this connection.
    SendAndClose(String),
}

impl FrameReply {
    pub fn text(&self) -> &str {
        match self {
            FrameReply::Send(text) | FrameReply::SendAndClose(text) => text,
        }
    }
}

fn undecodable(frame: &str) -> FrameReply {
    FrameReply::SendAndClose(format!("cannot parse ws json data ({frame})"))
}

/// One admin connection. Frames are handled strictly in arrival order.
#[derive(Debug, Clone)]
pub struct Session {
    dispatcher: CommandDispatcher,
    convention: Convention,
}

impl Session {
    pub fn new(dispatcher: CommandDispatcher, convention: Convention) -> Self {
        Self { dispatcher, convention }
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    pub async fn handle_frame(&self, frame: &str) -> FrameReply {
        let Ok(value) = serde_json::from_str::<Value>(frame) else {
            return undecodable(frame);
        };
        match self.convention {
            Convention::Current => self.handle_current(frame, value).await,
            Convention::Legacy => self.handle_legacy(frame, value).await,
        }
    }

    async fn handle_current(&self, frame: &str, value: Value) -> FrameReply {
        let Some(method) = value.get("method").and_then(Value::as_str).map(str::to_string) else {
            return undecodable(frame);
        };
        if !Command::METHODS.contains(&method.as_str()) {
            return FrameReply::Send(LegacyError::UnknownMethod(method).to_string());
        }
        let command = match serde_json::from_value::<Command>(value) {
            Ok(command) => command,
            Err(e) => {
                let err = LegacyError::InvalidParams { method, reason: e.to_string() };
                return FrameReply::Send(err.to_string());
            }
        };
        let result = self.dispatcher.dispatch(command).await;
        FrameReply::Send(result.to_string())
    }

    async fn handle_legacy(&self, frame: &str, value: Value) -> FrameReply {
        let Ok(request) = serde_json::from_value::<Request>(value) else {
            return undecodable(frame);
        };
        let method = match legacy::parse_method(&request.method) {
            Ok(method) => method,
            Err(e) => return FrameReply::Send(e.to_string()),
        };
        let Some(params) = request.positional() else {
            let err = LegacyError::InvalidParams {
                method: request.method.clone(),
                reason: "params must be an array".to_string(),
            };
            return FrameReply::Send(err.to_string());
        };
        let command = match legacy::translate(method, &params) {
            Ok(command) => command,
            Err(e) => return FrameReply::Send(e.to_string()),
        };
        let result = self.dispatcher.dispatch(command).await;
        let response = Response::success(request.correlation_id(), result);
        match serde_json::to_string(&response) {
            Ok(text) => FrameReply::Send(text),
            Err(e) => FrameReply::Send(format!("cannot encode response: {e}")),
        }
    }

    /// Serve one accepted WebSocket until the peer leaves, a frame is
    /// undecodable or shutdown is signalled.
    pub async fn run<S>(self, ws: WebSocketStream<S>, peer: String, mut shutdown: broadcast::Receiver<()>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!(%peer, convention = ?self.convention, "admin session opened");
        let (mut write, mut read) = ws.split();
        loop {
            let frame = tokio::select! {
                _ = shutdown.recv() => {
                    debug!(%peer, "admin session shutting down");
                    break;
                }
                frame = read.next() => frame,
            };

            let text = match frame {
                Some(Ok(WsMsg::Text(text))) => text.as_str().to_string(),
                Some(Ok(WsMsg::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
                Some(Ok(WsMsg::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(%peer, error = %e, "admin session read failed");
                    break;
                }
            };

            let reply = self.handle_frame(&text).await;
            if let Err(e) = write.send(WsMsg::Text(reply.text().to_string().into())).await {
                warn!(%peer, error = %e, "admin session write failed");
                break;
            }
            if let FrameReply::SendAndClose(_) = reply {
                debug!(%peer, "closing admin session after undecodable frame");
                let _ = write.send(WsMsg::Close(None)).await;
                break;
            }
        }
        info!(%peer, "admin session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelManager, ChannelsConfig};
    use serde_json::json;
    use tokio::runtime::Handle;

    fn session(convention: Convention) -> Session {
        let config = ChannelsConfig::from_yaml(
            "channels:\n  - name: orders\n    message_store: memory\n  - name: billing\n",
        )
        .unwrap();
        let manager = ChannelManager::from_config(config, Handle::current()).unwrap();
        Session::new(CommandDispatcher::new(manager), convention)
    }

    #[tokio::test]
    async fn malformed_frame_closes() {
        for convention in [Convention::Current, Convention::Legacy] {
            let reply = session(convention).handle_frame("{not json").await;
            assert_eq!(reply, FrameReply::SendAndClose("cannot parse ws json data ({not json)".into()));
        }
    }

    #[tokio::test]
    async fn unknown_method_keeps_session_open() {
        let reply = session(Convention::Legacy)
            .handle_frame(r#"{"method": "explode", "params": [], "id": 1}"#)
            .await;
        assert_eq!(reply, FrameReply::Send("explode is not a valid method".into()));

        let reply = session(Convention::Current).handle_frame(r#"{"method": "explode"}"#).await;
        assert_eq!(reply, FrameReply::Send("explode is not a valid method".into()));
    }

    #[tokio::test]
    async fn legacy_result_is_wrapped_with_request_id() {
        let s = session(Convention::Legacy);
        let reply = s.handle_frame(r#"{"method": "channels", "params": [null], "id": 7}"#).await;
        let wrapped: Value = serde_json::from_str(reply.text()).unwrap();
        let direct = s.dispatcher.dispatch(Command::ListChannels).await;
        assert_eq!(wrapped, json!({"jsonrpc": "2.0", "result": direct, "id": 7}));
    }

    #[tokio::test]
    async fn legacy_ids_of_any_shape_are_echoed() {
        let s = session(Convention::Legacy);
        for id in [json!(1.5), json!({"req": 7})] {
            let frame = json!({"method": "channels", "params": [null], "id": id}).to_string();
            let reply = s.handle_frame(&frame).await;
            let FrameReply::Send(text) = reply else {
                panic!("session closed on id {id}");
            };
            let wrapped: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(wrapped["id"], id);
            assert!(wrapped["result"].is_array());
        }
    }

    #[tokio::test]
    async fn current_convention_returns_raw_results() {
        let s = session(Convention::Current);
        let reply = s
            .handle_frame(r#"{"method": "start_channel", "params": {"channel": "orders"}}"#)
            .await;
        let result: Value = serde_json::from_str(reply.text()).unwrap();
        assert_eq!(result, json!({"name": "orders", "status": "STARTED"}));
    }

    #[tokio::test]
    async fn missing_params_are_reported() {
        let reply = session(Convention::Legacy)
            .handle_frame(r#"{"method": "view_msg", "params": ["orders"], "id": 2}"#)
            .await;
        assert_eq!(
            reply,
            FrameReply::Send("invalid params for view_msg: missing `message_id` at position 1".into())
        );

        let reply = session(Convention::Current)
            .handle_frame(r#"{"method": "stop_channel", "params": {}}"#)
            .await;
        assert!(reply.text().starts_with("invalid params for stop_channel:"), "{}", reply.text());
    }

    #[tokio::test]
    async fn legacy_list_msgs_of_unknown_channel() {
        let reply = session(Convention::Legacy)
            .handle_frame(r#"{"method": "list_msgs", "params": ["ghost", null, 5], "id": "abc"}"#)
            .await;
        let wrapped: Value = serde_json::from_str(reply.text()).unwrap();
        assert_eq!(wrapped["id"], json!("abc"));
        assert_eq!(wrapped["result"], json!({"error": "channel `ghost` not found"}));
    }
}
