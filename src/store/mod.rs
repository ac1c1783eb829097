use std::{fmt, sync::Arc};

use admin_protocol::command::ListMsgsParams;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;

pub mod memory;
pub mod null;

pub use memory::MemoryMessageStore;
pub use null::NullMessageStore;

/// Characters kept by [`MessageStore::get_preview_str`].
pub const PREVIEW_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageState {
    Pending,
    Processing,
    Error,
    Rejected,
    Processed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub state: MessageState,
    pub message: Message,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("message `{0}` not found")]
    NotFound(String),
    #[error("invalid message id `{0}`")]
    InvalidId(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// A validated `search` request. Build it with [`SearchQuery::new`] and the
/// `with_*` setters, which reject malformed dates, orderings and patterns.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub start: usize,
    pub count: usize,
    pub order: Order,
    pub start_dt: Option<DateTime<Utc>>,
    pub end_dt: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub rtext: Option<Regex>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            start: 0,
            count: 10,
            order: Order::Ascending,
            start_dt: None,
            end_dt: None,
            text: None,
            rtext: None,
        }
    }
}

impl SearchQuery {
    pub fn new(start: usize, count: usize) -> Self {
        Self { start, count, ..Default::default() }
    }

    /// `timestamp` for oldest first, `-timestamp` for newest first.
    pub fn with_order_by(mut self, order_by: &str) -> Result<Self, StoreError> {
        self.order = match order_by {
            "timestamp" => Order::Ascending,
            "-timestamp" => Order::Descending,
            other => return Err(StoreError::InvalidQuery(format!("cannot order by `{other}`"))),
        };
        Ok(self)
    }

    pub fn with_start_dt(mut self, start_dt: Option<&str>) -> Result<Self, StoreError> {
        self.start_dt = start_dt.map(parse_datetime).transpose()?;
        Ok(self)
    }

    pub fn with_end_dt(mut self, end_dt: Option<&str>) -> Result<Self, StoreError> {
        self.end_dt = end_dt.map(parse_datetime).transpose()?;
        Ok(self)
    }

    /// Query for a `list_msgs` admin command.
    pub fn from_params(params: &ListMsgsParams) -> Result<Self, StoreError> {
        SearchQuery::new(params.start, params.count)
            .with_order_by(&params.order_by)?
            .with_start_dt(params.start_dt.as_deref())?
            .with_end_dt(params.end_dt.as_deref())?
            .with_rtext(params.rtext.as_deref())
            .map(|q| q.with_text(params.text.as_deref()))
    }

    pub fn with_text(mut self, text: Option<&str>) -> Self {
        self.text = text.map(str::to_string);
        self
    }

    pub fn with_rtext(mut self, rtext: Option<&str>) -> Result<Self, StoreError> {
        self.rtext = rtext
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| StoreError::InvalidQuery(format!("bad pattern: {e}")))
            })
            .transpose()?;
        Ok(self)
    }

    /// Date and text filters, without pagination.
    pub fn matches(&self, msg: &Message) -> bool {
        let ts = msg.timestamp();
        if self.start_dt.is_some_and(|start| ts < start) || self.end_dt.is_some_and(|end| ts > end) {
            return false;
        }
        if self.text.is_none() && self.rtext.is_none() {
            return true;
        }
        let payload = msg.payload_text();
        self.text.as_deref().is_none_or(|text| payload.contains(text))
            && self.rtext.as_ref().is_none_or(|re| re.is_match(&payload))
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DDTHH:MM:SS[.f]`
/// and a bare `YYYY-MM-DD` (midnight). Naive values are taken as UTC.
pub fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| StoreError::InvalidQuery(format!("cannot parse date `{raw}`")))
}

/// Where a channel keeps the messages it has seen.
///
/// Implementations take concurrent reads and serialize their own writes;
/// callers never lock around them.
#[async_trait]
pub trait MessageStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether stored messages can be read back.
    fn persists(&self) -> bool {
        true
    }

    async fn start(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Store a message in `PENDING` state and return its id.
    async fn store(&self, msg: &Message) -> Result<String, StoreError>;

    async fn change_message_state(&self, id: &str, state: MessageState) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<StoredMessage, StoreError>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<StoredMessage>, StoreError>;

    /// Number of stored messages, ignoring any query.
    async fn total(&self) -> Result<usize, StoreError>;

    async fn get_msg_content(&self, id: &str) -> Result<Message, StoreError> {
        Ok(self.get(id).await?.message)
    }

    async fn get_preview_str(&self, id: &str) -> Result<Message, StoreError> {
        Ok(self.get_msg_content(id).await?.preview(PREVIEW_CHARS))
    }
}

impl fmt::Debug for dyn MessageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStore")
            .field("impl", &self.name())
            .finish()
    }
}

/// Store engine selected per channel in the channels file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StoreEngine {
    #[default]
    Null,
    Memory,
}

impl StoreEngine {
    pub fn build(&self) -> Arc<dyn MessageStore> {
        match self {
            StoreEngine::Null => Arc::new(NullMessageStore::new()),
            StoreEngine::Memory => Arc::new(MemoryMessageStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_supported_date_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_datetime("2024-03-01T12:30:00Z").unwrap(), expected);
        assert_eq!(parse_datetime("2024-03-01T14:30:00+02:00").unwrap(), expected);
        assert_eq!(parse_datetime("2024-03-01 12:30:00").unwrap(), expected);
        assert_eq!(parse_datetime("2024-03-01T12:30:00").unwrap(), expected);
        assert_eq!(
            parse_datetime("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert!(matches!(parse_datetime("yesterday"), Err(StoreError::InvalidQuery(_))));
    }

    #[test]
    fn query_builders_reject_bad_input() {
        assert!(SearchQuery::default().with_order_by("size").is_err());
        assert!(SearchQuery::default().with_rtext(Some("(")).is_err());
        let q = SearchQuery::default().with_order_by("-timestamp").unwrap();
        assert_eq!(q.order, Order::Descending);
    }

    #[test]
    fn query_from_list_msgs_params() {
        let mut params = ListMsgsParams::new("orders");
        params.start = 5;
        params.count = 3;
        params.order_by = "-timestamp".into();
        params.start_dt = Some("2024-01-01".into());
        params.text = Some("shipped".into());
        let q = SearchQuery::from_params(&params).unwrap();
        assert_eq!((q.start, q.count, q.order), (5, 3, Order::Descending));
        assert_eq!(q.start_dt, Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(q.text.as_deref(), Some("shipped"));

        params.rtext = Some("[".into());
        assert!(matches!(SearchQuery::from_params(&params), Err(StoreError::InvalidQuery(_))));
    }

    #[test]
    fn filters_combine() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let msg = Message::text("order 42 shipped").with_timestamp(ts);
        let q = SearchQuery::default()
            .with_start_dt(Some("2024-05-01"))
            .unwrap()
            .with_end_dt(Some("2024-07-01"))
            .unwrap()
            .with_text(Some("42"))
            .with_rtext(Some(r"^order \d+"))
            .unwrap();
        assert!(q.matches(&msg));
        assert!(!q.clone().with_text(Some("43")).matches(&msg));
        let late = q.with_start_dt(Some("2024-06-02")).unwrap();
        assert!(!late.matches(&msg));
    }

    #[test]
    fn states_render_uppercase() {
        assert_eq!(serde_json::to_string(&MessageState::Processed).unwrap(), "\"PROCESSED\"");
    }
}
