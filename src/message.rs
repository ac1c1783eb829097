use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const CONTENT_TYPE_TEXT: &str = "application/text";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_XML: &str = "application/xml";
/// Payload holds a decoded structured value rather than serialized text.
pub const CONTENT_TYPE_NATIVE: &str = "application/x-native";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// The envelope that travels down a chain. Each node receives it by value
/// and hands back the (possibly rewritten) next state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    uuid: String,
    timestamp: DateTime<Utc>,
    payload: Value,
    content_type: String,
    #[serde(default)]
    meta: HashMap<String, Value>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            payload: Value::Null,
            content_type: CONTENT_TYPE_TEXT.to_string(),
            meta: HashMap::new(),
        }
    }
}

impl Message {
    pub fn new(payload: Value, content_type: &str) -> Self {
        Self {
            payload,
            content_type: content_type.to_string(),
            ..Default::default()
        }
    }

    /// A text message, the shape most channel inputs arrive in.
    pub fn text(payload: impl Into<String>) -> Self {
        Self::new(Value::String(payload.into()), CONTENT_TYPE_TEXT)
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn timestamp_str(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: Value) {
        self.payload = payload;
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.content_type = content_type.to_string();
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.meta.get(name)
    }

    pub fn add(&mut self, name: impl Into<String>, value: Value) {
        self.meta.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) {
        self.meta.remove(name);
    }

    /// The payload as text: strings verbatim, anything else serialized.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn to_dict(&self) -> Value {
        json!({
            "uuid": self.uuid,
            "timestamp": self.timestamp_str(),
            "payload": self.payload,
            "content_type": self.content_type,
            "meta": self.meta,
        })
    }

    pub fn to_json(&self) -> String {
        self.to_dict().to_string()
    }

    /// Same message with its payload text cut to at most `max_chars` characters.
    pub fn preview(&self, max_chars: usize) -> Message {
        let text = self.payload_text();
        let truncated: String = text.chars().take(max_chars).collect();
        Message {
            payload: Value::String(truncated),
            ..self.clone()
        }
    }
}
