use serde::{Deserialize, Serialize};
use serde_json::Value;


/// JSON‑RPC 2.0 envelope used by the legacy admin clients.
///
/// Old clients send `{"method": ..., "params": [...], "id": ...}` and match
/// responses by `id`. The `jsonrpc` member is optional on the way in and
/// always present on the way out.
///
/// ```ignore
/// use serde_json::json;
/// use admin_protocol::jsonrpc::{Id, Response};
///
/// let resp = Response::success(Id::Number(7), json!([]));
/// let s = serde_json::to_string(&resp).unwrap();
/// ```
pub const JSONRPC_VERSION: &str = "2.0";

/// `id` MAY be a string, number or null. Old clients also send fractional
/// numbers and objects; those are kept as-is and echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    String(String),
    #[default]
    Null,
    Other(Value),
}

/// JSON‑RPC 2.0 Request object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Omitted for *notifications*.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
}

fn default_version() -> String {
    JSONRPC_VERSION.to_owned()
}

/// JSON‑RPC 2.0 success Response object. Legacy sessions never emit error
/// responses: failures travel as diagnostics or inline `{"error": ...}` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    pub result: Value,
    pub id: Id,
}

impl Request {
    /// Create a *call* expecting a response.
    pub fn call(id: Id, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    /// Positional parameters. A missing `params` member reads as `[null]`,
    /// the shape old clients relied on for parameterless calls.
    pub fn positional(&self) -> Option<Vec<Value>> {
        match &self.params {
            None => Some(vec![Value::Null]),
            Some(Value::Array(items)) => Some(items.clone()),
            Some(Value::Null) => Some(vec![Value::Null]),
            Some(_) => None,
        }
    }

    pub fn correlation_id(&self) -> Id {
        self.id.clone().unwrap_or_default()
    }
}

impl Response {
    /// Convenience helper for a successful result.
    pub fn success(id: Id, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            result,
            id,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_request_without_version() {
        let req: Request =
            serde_json::from_str(r#"{"method": "channels", "params": [null], "id": 7}"#).unwrap();
        assert_eq!(req.jsonrpc, "2.0");
        assert_eq!(req.method, "channels");
        assert_eq!(req.correlation_id(), Id::Number(7));
        assert_eq!(req.positional(), Some(vec![Value::Null]));
    }

    #[test]
    fn missing_params_reads_as_single_null() {
        let req: Request = serde_json::from_str(r#"{"method": "channels", "id": "a"}"#).unwrap();
        assert_eq!(req.positional(), Some(vec![Value::Null]));
        assert_eq!(req.correlation_id(), Id::String("a".into()));
    }

    #[test]
    fn named_params_are_not_positional() {
        let req = Request::call(Id::Number(1), "view_msg", Some(json!({"channel": "c"})));
        assert_eq!(req.positional(), None);
    }

    #[test]
    fn success_response_shape() {
        let resp = Response::success(Id::Number(7), json!({"ok": true}));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v, json!({"jsonrpc": "2.0", "result": {"ok": true}, "id": 7}));
    }

    #[test]
    fn string_ids_round_trip() {
        let resp = Response::success(Id::String("abc".into()), json!([1, 2]));
        let s = serde_json::to_string(&resp).unwrap();
        let de: Response = serde_json::from_str(&s).unwrap();
        assert_eq!(de.id, Id::String("abc".into()));
        assert_eq!(de.result, json!([1, 2]));
    }

    #[test]
    fn any_id_is_echoed_unchanged() {
        for id in [json!(1.5), json!({"req": 7}), json!([1, "a"])] {
            let frame = json!({"method": "channels", "params": [null], "id": id});
            let req: Request = serde_json::from_value(frame).unwrap();
            assert_eq!(req.correlation_id(), Id::Other(id.clone()));
            let resp = serde_json::to_value(Response::success(req.correlation_id(), json!([]))).unwrap();
            assert_eq!(resp["id"], id);
        }
    }
}
