use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    message::{Message, CONTENT_TYPE_JSON, CONTENT_TYPE_NATIVE},
    node::{ExecutionResult, NodeContext, NodeError, NodeType},
};

/// Parses a JSON text payload into a structured value.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct JsonToNative {}

impl JsonToNative {
    fn decode(&self, mut msg: Message) -> Result<Message, NodeError> {
        let parsed = match msg.payload() {
            Value::String(text) => serde_json::from_str::<Value>(text)
                .map_err(|e| NodeError::InvalidInput(format!("malformed JSON payload: {e}")))?,
            other => {
                return Err(NodeError::InvalidInput(format!(
                    "expected a JSON text payload, got {}",
                    kind_of(other)
                )));
            }
        };
        msg.set_payload(parsed);
        msg.set_content_type(CONTENT_TYPE_NATIVE);
        Ok(msg)
    }
}

#[async_trait]
#[typetag::serde(name = "json_to_native")]
impl NodeType for JsonToNative {
    fn type_name(&self) -> String {
        "json_to_native".to_string()
    }

    fn process(&self, msg: Message, _ctx: &NodeContext) -> ExecutionResult {
        self.decode(msg).into()
    }
}

/// Serializes a structured payload to JSON text.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NativeToJson {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pretty: bool,
}

impl NativeToJson {
    fn encode(&self, mut msg: Message) -> Result<Message, NodeError> {
        let text = if self.pretty {
            serde_json::to_string_pretty(msg.payload())
        } else {
            serde_json::to_string(msg.payload())
        }
        .map_err(|e| NodeError::ExecutionFailed(format!("could not encode JSON: {e}")))?;
        msg.set_payload(Value::String(text));
        msg.set_content_type(CONTENT_TYPE_JSON);
        Ok(msg)
    }
}

#[async_trait]
#[typetag::serde(name = "native_to_json")]
impl NodeType for NativeToJson {
    fn type_name(&self) -> String {
        "native_to_json".to_string()
    }

    fn process(&self, msg: Message, _ctx: &NodeContext) -> ExecutionResult {
        self.encode(msg).into()
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ChannelOrigin;
    use serde_json::json;
    use tokio::runtime::Handle;

    fn ctx() -> NodeContext {
        NodeContext::new(ChannelOrigin::new("json", "u"), Handle::current())
    }

    #[tokio::test]
    async fn decode_then_encode_round_trips() {
        let msg = Message::text(r#"{"a": 1}"#);
        let ExecutionResult::Continue(decoded) = JsonToNative {}.handle(msg, &ctx()).await else {
            panic!("decode failed");
        };
        assert_eq!(decoded.payload(), &json!({"a": 1}));
        assert_eq!(decoded.content_type(), CONTENT_TYPE_NATIVE);

        let ExecutionResult::Continue(encoded) = NativeToJson::default().handle(decoded, &ctx()).await
        else {
            panic!("encode failed");
        };
        assert_eq!(encoded.content_type(), CONTENT_TYPE_JSON);
        let text = encoded.payload().as_str().unwrap();
        assert_eq!(serde_json::from_str::<Value>(text).unwrap(), json!({"a": 1}));
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let out = JsonToNative {}.handle(Message::text("{not json"), &ctx()).await;
        assert!(matches!(out, ExecutionResult::Error(NodeError::InvalidInput(_))), "{out:?}");
    }

    #[tokio::test]
    async fn structured_payload_is_not_json_text() {
        let msg = Message::new(json!({"already": "decoded"}), CONTENT_TYPE_NATIVE);
        let out = JsonToNative {}.handle(msg, &ctx()).await;
        assert_eq!(
            out,
            ExecutionResult::Error(NodeError::InvalidInput(
                "expected a JSON text payload, got an object".into()
            ))
        );
    }

    #[tokio::test]
    async fn pretty_encoding_keeps_every_field() {
        let payload = json!({"nested": {"list": [1, 2, {"x": null}]}, "flag": true});
        let msg = Message::new(payload.clone(), CONTENT_TYPE_NATIVE);
        let ExecutionResult::Continue(out) = NativeToJson { pretty: true }.handle(msg, &ctx()).await
        else {
            panic!("encode failed");
        };
        let text = out.payload().as_str().unwrap();
        assert!(text.contains('\n'));
        assert_eq!(serde_json::from_str::<Value>(text).unwrap(), payload);
    }
}
