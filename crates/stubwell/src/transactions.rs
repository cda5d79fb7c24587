//! Transaction mappings: one stored request/response pair per caller-supplied
//! transaction id, retrievable after the fact for audit and debugging.

use crate::keys;
use crate::storage::KvStore;
use crate::types::{HistoryRecord, ResponseRecord, TransactionMapping};
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;

/// 30 days, matching the history TTL.
pub const MAPPING_TTL_SECS: i64 = 30 * 24 * 3600;

pub struct TransactionMapper {
    store: Arc<dyn KvStore>,
}

impl TransactionMapper {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Persist one mapping with a 30-day TTL. Later writes with the same id
    /// overwrite wholesale (last-write-wins, no merge).
    pub fn record(
        &self,
        route: &str,
        endpoint: &str,
        tx_id: &str,
        request: HistoryRecord,
        status: u16,
        body: Value,
    ) -> Result<()> {
        let mapping = TransactionMapping {
            request,
            response: ResponseRecord { status, body },
        };
        let key = keys::transaction_key(route, endpoint, tx_id);
        let raw =
            serde_json::to_string(&mapping).context("Failed to serialize transaction mapping")?;
        self.store
            .set_ex(&key, &raw, MAPPING_TTL_SECS)
            .context("Transaction mapping SET failed")?;
        Ok(())
    }

    pub fn lookup(
        &self,
        route: &str,
        endpoint: &str,
        tx_id: &str,
    ) -> Result<Option<TransactionMapping>> {
        let key = keys::transaction_key(route, endpoint, tx_id);
        match self.store.get(&key).context("Transaction mapping GET failed")? {
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).context("Failed to parse stored transaction mapping")?,
            )),
            None => Ok(None),
        }
    }
}

/// Pull the transaction id out of an inbound payload: a top-level `tx_id`
/// field, or `data.tx_id`. Integer ids are stringified; anything else means
/// no mapping is written.
pub fn extract_tx_id(body: &Value) -> Option<String> {
    let candidate = body
        .get("tx_id")
        .or_else(|| body.get("data").and_then(|d| d.get("tx_id")))?;
    match candidate {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use serde_json::json;

    fn request() -> HistoryRecord {
        HistoryRecord {
            timestamp: "2024-05-01T00:00:00Z".into(),
            method: "POST".into(),
            body: json!({"tx_id": "t-1"}),
        }
    }

    #[test]
    fn test_record_and_lookup() {
        let mapper = TransactionMapper::new(Arc::new(InMemoryStore::new()));
        mapper
            .record("r", "e", "t-1", request(), 201, json!({"ok": true}))
            .unwrap();

        let mapping = mapper.lookup("r", "e", "t-1").unwrap().unwrap();
        assert_eq!(mapping.response.status, 201);
        assert_eq!(mapping.response.body, json!({"ok": true}));
        assert_eq!(mapping.request.body, json!({"tx_id": "t-1"}));
    }

    #[test]
    fn test_lookup_missing() {
        let mapper = TransactionMapper::new(Arc::new(InMemoryStore::new()));
        assert!(mapper.lookup("r", "e", "nope").unwrap().is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let mapper = TransactionMapper::new(Arc::new(InMemoryStore::new()));
        mapper
            .record("r", "e", "t-1", request(), 200, json!({"v": 1}))
            .unwrap();
        mapper
            .record("r", "e", "t-1", request(), 200, json!({"v": 2}))
            .unwrap();
        let mapping = mapper.lookup("r", "e", "t-1").unwrap().unwrap();
        assert_eq!(mapping.response.body, json!({"v": 2}));
    }

    #[test]
    fn test_extract_tx_id_top_level() {
        assert_eq!(
            extract_tx_id(&json!({"tx_id": "t-1"})),
            Some("t-1".to_string())
        );
    }

    #[test]
    fn test_extract_tx_id_nested_data() {
        assert_eq!(
            extract_tx_id(&json!({"data": {"tx_id": "t-2"}})),
            Some("t-2".to_string())
        );
        // Top level wins over nested.
        assert_eq!(
            extract_tx_id(&json!({"tx_id": "a", "data": {"tx_id": "b"}})),
            Some("a".to_string())
        );
    }

    #[test]
    fn test_extract_tx_id_number() {
        assert_eq!(extract_tx_id(&json!({"tx_id": 77})), Some("77".to_string()));
    }

    #[test]
    fn test_extract_tx_id_absent_or_unusable() {
        assert_eq!(extract_tx_id(&json!({})), None);
        assert_eq!(extract_tx_id(&json!({"tx_id": ""})), None);
        assert_eq!(extract_tx_id(&json!({"tx_id": null})), None);
        assert_eq!(extract_tx_id(&json!({"tx_id": {"k": 1}})), None);
    }
}
