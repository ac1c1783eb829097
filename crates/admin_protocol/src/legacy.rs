//! Translation of the positional calling convention used by old admin clients.
//!
//! An old client sends `{"method": "list_msgs", "params": ["orders", 0, 10], "id": 3}`.
//! Every method is described once, in [`LegacyMethod::schema`], as an ordered
//! list of parameter names. Translation walks that list, drops `null`
//! positions so the named defaults apply, and decodes the result into a
//! [`Command`]. Nothing is looked up per call beyond the table.

use std::str::FromStr;

use serde_json::{Map, Value, json};
use strum_macros::{AsRefStr, EnumIter, EnumString};
use thiserror::Error;

use crate::command::Command;

/// Methods understood on the legacy endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum LegacyMethod {
    #[strum(serialize = "channels")]
    Channels,
    StartChannel,
    StopChannel,
    ListMsgs,
    ViewMsg,
    PreviewMsg,
    ReplayMsg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
}

const fn required(name: &'static str) -> ParamSpec {
    ParamSpec { name, required: true }
}

const fn optional(name: &'static str) -> ParamSpec {
    ParamSpec { name, required: false }
}

/// Schema of one legacy method: the current command it maps to, and the
/// meaning of each array position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacySchema {
    pub target: &'static str,
    pub params: &'static [ParamSpec],
}

const CHANNEL_ONLY: &[ParamSpec] = &[required("channel")];
const CHANNEL_AND_MESSAGE: &[ParamSpec] = &[required("channel"), required("message_id")];
const LIST_MSGS: &[ParamSpec] = &[
    required("channel"),
    optional("start"),
    optional("count"),
    optional("order_by"),
    optional("start_dt"),
    optional("end_dt"),
    optional("text"),
    optional("rtext"),
];

impl LegacyMethod {
    pub fn schema(&self) -> LegacySchema {
        match self {
            LegacyMethod::Channels => LegacySchema { target: "list_channels", params: &[] },
            LegacyMethod::StartChannel => LegacySchema { target: "start_channel", params: CHANNEL_ONLY },
            LegacyMethod::StopChannel => LegacySchema { target: "stop_channel", params: CHANNEL_ONLY },
            LegacyMethod::ListMsgs => LegacySchema { target: "list_msgs", params: LIST_MSGS },
            LegacyMethod::ViewMsg => LegacySchema { target: "view_msg", params: CHANNEL_AND_MESSAGE },
            LegacyMethod::PreviewMsg => LegacySchema { target: "preview_msg", params: CHANNEL_AND_MESSAGE },
            LegacyMethod::ReplayMsg => LegacySchema { target: "replay_msg", params: CHANNEL_AND_MESSAGE },
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LegacyError {
    #[error("{0} is not a valid method")]
    UnknownMethod(String),

    #[error("invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },
}

impl LegacyError {
    fn invalid(method: LegacyMethod, reason: impl Into<String>) -> Self {
        LegacyError::InvalidParams { method: method.as_ref().to_string(), reason: reason.into() }
    }
}

pub fn parse_method(method: &str) -> Result<LegacyMethod, LegacyError> {
    LegacyMethod::from_str(method).map_err(|_| LegacyError::UnknownMethod(method.to_string()))
}

/// Map a positional call onto the named command it stands for.
///
/// Positions beyond the schema are ignored, as old clients padded their
/// arrays. `null` positions are omitted; a required position that is absent or
/// `null` is an error.
pub fn translate(method: LegacyMethod, params: &[Value]) -> Result<Command, LegacyError> {
    let schema = method.schema();
    let mut named = Map::new();
    for (position, spec) in schema.params.iter().enumerate() {
        match params.get(position) {
            Some(Value::Null) | None if spec.required => {
                return Err(LegacyError::invalid(
                    method,
                    format!("missing `{}` at position {position}", spec.name),
                ));
            }
            Some(Value::Null) | None => {}
            Some(value) => {
                named.insert(spec.name.to_string(), value.clone());
            }
        }
    }

    let envelope = if schema.params.is_empty() {
        json!({ "method": schema.target })
    } else {
        json!({ "method": schema.target, "params": named })
    };
    serde_json::from_value(envelope).map_err(|e| LegacyError::invalid(method, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ChannelParams, ListMsgsParams, MessageParams};
    use serde_json::json;
    use strum::IntoEnumIterator;

    #[test]
    fn channels_maps_to_list_channels() {
        let method = parse_method("channels").unwrap();
        assert_eq!(method, LegacyMethod::Channels);
        assert_eq!(translate(method, &[Value::Null]).unwrap(), Command::ListChannels);
    }

    #[test]
    fn channel_name_is_first_position() {
        let cmd = translate(LegacyMethod::StopChannel, &[json!("orders")]).unwrap();
        assert_eq!(cmd, Command::StopChannel(ChannelParams { channel: "orders".into() }));
    }

    #[test]
    fn list_msgs_positions_map_in_order() {
        let params = [
            json!("orders"),
            json!(5),
            json!(2),
            json!("-timestamp"),
            json!("2024-01-01"),
            json!("2024-12-31"),
            json!("needle"),
            json!("^n.*e$"),
        ];
        let cmd = translate(LegacyMethod::ListMsgs, &params).unwrap();
        let expected = ListMsgsParams {
            channel: "orders".into(),
            start: 5,
            count: 2,
            order_by: "-timestamp".into(),
            start_dt: Some("2024-01-01".into()),
            end_dt: Some("2024-12-31".into()),
            text: Some("needle".into()),
            rtext: Some("^n.*e$".into()),
        };
        assert_eq!(cmd, Command::ListMsgs(expected));
    }

    #[test]
    fn null_positions_fall_back_to_defaults() {
        let params = [json!("orders"), Value::Null, Value::Null, Value::Null, Value::Null, Value::Null, json!("x")];
        let cmd = translate(LegacyMethod::ListMsgs, &params).unwrap();
        let mut expected = ListMsgsParams::new("orders");
        expected.text = Some("x".into());
        assert_eq!(cmd, Command::ListMsgs(expected));
    }

    #[test]
    fn message_id_taken_from_second_position() {
        let cmd = translate(LegacyMethod::ReplayMsg, &[json!("orders"), json!("abc")]).unwrap();
        assert_eq!(
            cmd,
            Command::ReplayMsg(MessageParams { channel: "orders".into(), message_id: "abc".into() })
        );
    }

    #[test]
    fn missing_required_position_is_reported() {
        let err = translate(LegacyMethod::ViewMsg, &[json!("orders")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid params for view_msg: missing `message_id` at position 1"
        );
    }

    #[test]
    fn unknown_method_message() {
        let err = parse_method("explode").unwrap_err();
        assert_eq!(err.to_string(), "explode is not a valid method");
    }

    #[test]
    fn every_schema_targets_a_current_command() {
        for method in LegacyMethod::iter() {
            assert!(Command::METHODS.contains(&method.schema().target), "{method:?}");
        }
    }
}
