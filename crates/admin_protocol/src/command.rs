use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

pub const DEFAULT_START: usize = 0;
pub const DEFAULT_COUNT: usize = 10;
pub const DEFAULT_ORDER_BY: &str = "timestamp";

/// One admin command in the current (named parameter) convention.
///
/// On the wire: `{"method": "list_msgs", "params": {"channel": "orders", "count": 5}}`.
/// `list_channels` carries no params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Command {
    ListChannels,
    StartChannel(ChannelParams),
    StopChannel(ChannelParams),
    ListMsgs(ListMsgsParams),
    ViewMsg(MessageParams),
    PreviewMsg(MessageParams),
    ReplayMsg(MessageParams),
}

impl Command {
    /// Canonical method name, as used in request events and diagnostics.
    pub fn method(&self) -> &'static str {
        match self {
            Command::ListChannels => "list_channels",
            Command::StartChannel(_) => "start_channel",
            Command::StopChannel(_) => "stop_channel",
            Command::ListMsgs(_) => "list_msgs",
            Command::ViewMsg(_) => "view_msg",
            Command::PreviewMsg(_) => "preview_msg",
            Command::ReplayMsg(_) => "replay_msg",
        }
    }

    pub const METHODS: &'static [&'static str] = &[
        "list_channels",
        "start_channel",
        "stop_channel",
        "list_msgs",
        "view_msg",
        "preview_msg",
        "replay_msg",
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelParams {
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageParams {
    pub channel: String,
    #[serde(deserialize_with = "string_or_number")]
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMsgsParams {
    pub channel: String,
    #[serde(default = "default_start", deserialize_with = "usize_or_string")]
    pub start: usize,
    #[serde(default = "default_count", deserialize_with = "usize_or_string")]
    pub count: usize,
    #[serde(default = "default_order_by")]
    pub order_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_dt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_dt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtext: Option<String>,
}

impl ListMsgsParams {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            start: DEFAULT_START,
            count: DEFAULT_COUNT,
            order_by: DEFAULT_ORDER_BY.to_string(),
            start_dt: None,
            end_dt: None,
            text: None,
            rtext: None,
        }
    }
}

fn default_start() -> usize {
    DEFAULT_START
}

fn default_count() -> usize {
    DEFAULT_COUNT
}

fn default_order_by() -> String {
    DEFAULT_ORDER_BY.to_string()
}

/// Old clients built query strings, so offsets may arrive as `"20"`.
fn usize_or_string<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| de::Error::custom(format!("expected a non-negative integer, got {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<usize>()
            .map_err(|_| de::Error::custom(format!("expected a non-negative integer, got `{s}`"))),
        other => Err(de::Error::custom(format!("expected a non-negative integer, got {other}"))),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("expected a message id, got {other}"))),
    }
}
