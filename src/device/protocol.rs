use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::device::constants::CORRELATION_ID_LEN;
use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Connect,
    Disconnect,
    Run,
    Stop,
    SetSpeed,
    GetStats,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Connect => "connect",
            Method::Disconnect => "disconnect",
            Method::Run => "run",
            Method::Stop => "stop",
            Method::SetSpeed => "set_speed",
            Method::GetStats => "get_stats",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: String,
    pub method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: String,
    #[serde(default)]
    pub result: Value,
}

impl ResponseFrame {
    // The bridge also pushes raw status records without an id, those are reported as MissingId
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|source| ProtocolError::Malformed { source })?;

        let id = match value.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => return Err(ProtocolError::MissingId),
        };

        let result = match value {
            Value::Object(mut map) => map.remove("result").unwrap_or(Value::Null),
            _ => Value::Null,
        };

        Ok(ResponseFrame { id, result })
    }
}

pub fn new_correlation_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(CORRELATION_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn request_without_params_omits_the_key() {
        let frame = RequestFrame { id: "abc".into(), method: Method::GetStats, params: None };
        let encoded = serde_json::to_value(&frame).unwrap();
        assert_eq!(encoded, json!({"id": "abc", "method": "get_stats"}));
    }

    #[test]
    fn request_with_params() {
        let frame = RequestFrame {
            id: "abc".into(),
            method: Method::SetSpeed,
            params: Some(json!({"speed": 20})),
        };
        let encoded = serde_json::to_value(&frame).unwrap();
        assert_eq!(encoded, json!({"id": "abc", "method": "set_speed", "params": {"speed": 20}}));
    }

    #[test]
    fn method_names_match_serde_names() {
        for method in [Method::Connect, Method::Disconnect, Method::Run, Method::Stop, Method::SetSpeed, Method::GetStats] {
            assert_eq!(serde_json::to_value(method).unwrap(), json!(method.as_str()));
        }
    }

    #[test]
    fn response_parsing() {
        let frame = ResponseFrame::parse(r#"{"id":"x1","result":{"dist":1}}"#).unwrap();
        assert_eq!(frame.id, "x1");
        assert_eq!(frame.result, json!({"dist": 1}));

        let frame = ResponseFrame::parse(r#"{"id":"x2"}"#).unwrap();
        assert_eq!(frame.result, Value::Null);

        assert!(matches!(ResponseFrame::parse(r#"{"dist":1}"#), Err(ProtocolError::MissingId)));
        assert!(matches!(ResponseFrame::parse(r#"{"id":7}"#), Err(ProtocolError::MissingId)));
        assert!(matches!(ResponseFrame::parse("pong"), Err(ProtocolError::Malformed { .. })));
    }

    #[test]
    fn correlation_ids_are_short_and_distinct() {
        let a = new_correlation_id();
        let b = new_correlation_id();
        assert_eq!(a.len(), CORRELATION_ID_LEN);
        assert_ne!(a, b);
    }
}
