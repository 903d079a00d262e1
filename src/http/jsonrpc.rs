//! JSON-RPC 2.0 request/response/notification shapes.
use crate::error::JsonRpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub id: i64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone)]
pub enum ResponseBody {
    Result(Value),
    Error(JsonRpcError),
}

/// A request record carried through the queues. `connection_id` `-1` marks an internally-generated
/// request (timer/trigger path), `-2` a script callback.
#[derive(Debug, Clone)]
pub struct Response {
    pub connection_id: i64,
    pub request_id: i64,
    pub method: String,
    pub body: ResponseBody,
}

impl Serialize for Response {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Response", 3)?;
        state.serialize_field("jsonrpc", "2.0")?;
        state.serialize_field("id", &self.request_id)?;
        match &self.body {
            ResponseBody::Result(v) => state.serialize_field("result", v)?,
            ResponseBody::Error(e) => state.serialize_field("error", e)?,
        }
        state.end()
    }
}

/// A WebSocket push notification: omits `id`, carries `method` + `params`.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Notification {
            method: method.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Facility, Severity};

    #[test]
    fn result_response_serializes_without_error_field() {
        let r = Response {
            connection_id: 1,
            request_id: 7,
            method: "MYMPD_API_PLAYER_STATE".into(),
            body: ResponseBody::Result(serde_json::json!({"state": "play"})),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["id"], 7);
        assert!(v.get("error").is_none());
        assert_eq!(v["result"]["state"], "play");
    }

    #[test]
    fn error_response_carries_facility_and_severity() {
        let r = Response {
            connection_id: 1,
            request_id: 1,
            method: "MYMPD_API_DATABASE_ALBUM_DETAIL".into(),
            body: ResponseBody::Error(JsonRpcError::not_found(Facility::Database, "no such album")),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["error"]["facility"], "database");
        assert_eq!(v["error"]["severity"], "warn");
    }
}
