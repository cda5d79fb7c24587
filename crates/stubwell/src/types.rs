//! Shared data model: stub definitions, history records, transaction mappings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP methods a stub may be registered under.
pub const ALLOWED_METHODS: [&str; 5] = ["get", "post", "put", "delete", "patch"];

/// A canned response registered by a caller.
///
/// Wire format is `{"status": <u16>, "response": <object>}`. Static stubs are
/// identified by (route, endpoint, method); parameterized stubs by
/// (method, pattern). Stubs never expire implicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StubDefinition {
    pub status: u16,
    pub response: Value,
}

impl StubDefinition {
    /// Validate a raw create/update payload and pull out the definition plus
    /// the normalized method. `status` must be a number and `response` an
    /// object; `method` is optional and defaults to `post`.
    pub fn from_payload(payload: &Value) -> Result<(Self, String), String> {
        let status = match payload.get("status").and_then(Value::as_u64) {
            Some(s) => u16::try_from(s).map_err(|_| format!("invalid status code: {s}"))?,
            None => return Err("status (number) and response (object) required".to_string()),
        };
        let response = match payload.get("response") {
            Some(r) if r.is_object() => r.clone(),
            _ => return Err("status (number) and response (object) required".to_string()),
        };
        let method = match payload.get("method").and_then(Value::as_str) {
            Some(m) if ALLOWED_METHODS.contains(&m.to_lowercase().as_str()) => m.to_lowercase(),
            _ => "post".to_string(),
        };
        Ok((StubDefinition { status, response }, method))
    }
}

/// One raw inbound request, as appended to the per-endpoint history list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    /// ISO-8601 capture time.
    pub timestamp: String,
    pub method: String,
    pub body: Value,
}

/// The response half of a transaction mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseRecord {
    pub status: u16,
    pub body: Value,
}

/// A stored request/response pair, keyed by caller-supplied transaction id.
/// Later requests with the same id overwrite the mapping wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionMapping {
    pub request: HistoryRecord,
    pub response: ResponseRecord,
}

/// A parameterized endpoint path is one carrying at least one `:name` segment.
/// This is the structural split between the static and pattern address spaces.
pub fn is_pattern_path(endpoint: &str) -> bool {
    endpoint.split('/').any(|seg| {
        seg.strip_prefix(':')
            .is_some_and(|name| !name.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_payload_valid() {
        let payload = json!({"status": 201, "response": {"ok": true}});
        let (def, method) = StubDefinition::from_payload(&payload).unwrap();
        assert_eq!(def.status, 201);
        assert_eq!(def.response, json!({"ok": true}));
        assert_eq!(method, "post");
    }

    #[test]
    fn test_from_payload_explicit_method() {
        let payload = json!({"status": 200, "response": {}, "method": "GET"});
        let (_, method) = StubDefinition::from_payload(&payload).unwrap();
        assert_eq!(method, "get");
    }

    #[test]
    fn test_from_payload_unknown_method_falls_back_to_post() {
        let payload = json!({"status": 200, "response": {}, "method": "trace"});
        let (_, method) = StubDefinition::from_payload(&payload).unwrap();
        assert_eq!(method, "post");
    }

    #[test]
    fn test_from_payload_rejects_non_numeric_status() {
        let payload = json!({"status": "200", "response": {}});
        assert!(StubDefinition::from_payload(&payload).is_err());
    }

    #[test]
    fn test_from_payload_rejects_non_object_response() {
        let payload = json!({"status": 200, "response": [1, 2]});
        assert!(StubDefinition::from_payload(&payload).is_err());
        let payload = json!({"status": 200});
        assert!(StubDefinition::from_payload(&payload).is_err());
    }

    #[test]
    fn test_is_pattern_path() {
        assert!(is_pattern_path("orders/:id"));
        assert!(is_pattern_path("/orders/:id/status"));
        assert!(!is_pattern_path("orders/42"));
        assert!(!is_pattern_path("plain"));
        // A bare colon segment carries no parameter name.
        assert!(!is_pattern_path("odd/:/path"));
    }

    #[test]
    fn test_mapping_round_trip() {
        let mapping = TransactionMapping {
            request: HistoryRecord {
                timestamp: "2024-05-01T00:00:00Z".into(),
                method: "POST".into(),
                body: json!({"tx_id": "t-1"}),
            },
            response: ResponseRecord {
                status: 200,
                body: json!({"ok": true}),
            },
        };
        let raw = serde_json::to_string(&mapping).unwrap();
        let back: TransactionMapping = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, mapping);
    }
}
