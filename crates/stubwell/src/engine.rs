//! Stub resolution engine.
//!
//! The dispatcher behind the catch-all route. For each inbound request it
//! walks a fixed state machine:
//!
//! ```text
//! START -> HISTORY_RECORDED -> STATIC_LOOKUP -> {STATIC_HIT | PATTERN_SCAN}
//!       -> {PATTERN_HIT | NO_MATCH} -> RESPONDED
//! ```
//!
//! Side effects are strictly ordered: the history write happens before the
//! stub lookup, which happens before the transaction-mapping write, which
//! happens before the response is produced. History is recorded even for
//! requests that end in a 404.

use crate::error::StubError;
use crate::history::HistoryLedger;
use crate::keys;
use crate::registry::PatternRegistry;
use crate::storage::KvStore;
use crate::synth::{self, SignatureHeaders, Signer};
use crate::transactions::{self, TransactionMapper};
use crate::types::{HistoryRecord, StubDefinition};
use anyhow::Context;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// A fully synthesized, signed reply ready to be written out.
#[derive(Debug)]
pub struct EngineReply {
    pub status: u16,
    pub body: Value,
    pub signature: SignatureHeaders,
}

pub struct StubEngine {
    store: Arc<dyn KvStore>,
    registry: Arc<PatternRegistry>,
    ledger: HistoryLedger,
    mapper: TransactionMapper,
    signer: Signer,
}

impl StubEngine {
    pub fn new(store: Arc<dyn KvStore>, registry: Arc<PatternRegistry>, signer: Signer) -> Self {
        Self {
            ledger: HistoryLedger::new(Arc::clone(&store)),
            mapper: TransactionMapper::new(Arc::clone(&store)),
            store,
            registry,
            signer,
        }
    }

    /// Resolve one inbound request. `method` is the wire-form HTTP method;
    /// lookups use its lowercase form. `endpoint` is the path below the
    /// mounted base, without a leading slash.
    pub fn dispatch(
        &self,
        route: &str,
        endpoint: &str,
        method: &str,
        body: &Value,
    ) -> Result<EngineReply, StubError> {
        let method_key = method.to_lowercase();

        // History capture is unaffected by resolution outcome.
        let record = synth::capture_request(method, body);
        self.ledger
            .record(route, endpoint, &method_key, &record)?;

        // Static stubs win outright; the registry is never consulted when
        // one exists for this exact key.
        if let Some(raw) = self
            .store
            .get(&keys::stub_key(route, endpoint, &method_key))
            .context("Static stub lookup failed")?
        {
            let definition: StubDefinition = serde_json::from_str(&raw)
                .context("Failed to parse stored stub definition")?;
            debug!("Static stub hit for {method} /{route}/{endpoint}");
            let synthesized = synth::replace_random_uuid(&definition.response);
            return self.reply(route, endpoint, body, record, definition.status, synthesized);
        }

        let path = format!("/{endpoint}");
        if let Some(hit) = self.registry.find_match(&path, &method_key) {
            debug!(
                "Pattern stub {} matched {method} /{route}/{endpoint}",
                hit.pattern
            );
            let synthesized = synth::replace_random_uuid(&hit.definition.response);
            let synthesized = synth::apply_path_params(&synthesized, &hit.params)?;
            return self.reply(route, endpoint, body, record, hit.definition.status, synthesized);
        }

        Err(StubError::NoStubMatched {
            method: method.to_string(),
            path: format!("/{route}/{endpoint}"),
        })
    }

    fn reply(
        &self,
        route: &str,
        endpoint: &str,
        body: &Value,
        record: HistoryRecord,
        status: u16,
        synthesized: Value,
    ) -> Result<EngineReply, StubError> {
        // Mapping is written only for requests carrying a transaction id,
        // after synthesis and before the response goes out.
        if let Some(tx_id) = transactions::extract_tx_id(body) {
            self.mapper
                .record(route, endpoint, &tx_id, record, status, synthesized.clone())?;
        }

        let signature = self.signer.sign(&synthesized);
        Ok(EngineReply {
            status,
            body: synthesized,
            signature,
        })
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn mapper(&self) -> &TransactionMapper {
        &self.mapper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use serde_json::json;

    fn engine_with_store() -> (StubEngine, Arc<dyn KvStore>) {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let registry = Arc::new(PatternRegistry::new(Arc::clone(&store)));
        let engine = StubEngine::new(Arc::clone(&store), registry, Signer::new("secretKey"));
        (engine, store)
    }

    fn engine_with_registry() -> (StubEngine, Arc<PatternRegistry>, Arc<dyn KvStore>) {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let registry = Arc::new(PatternRegistry::new(Arc::clone(&store)));
        let engine = StubEngine::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Signer::new("secretKey"),
        );
        (engine, registry, store)
    }

    fn put_static(store: &Arc<dyn KvStore>, route: &str, endpoint: &str, method: &str, status: u16, response: Value) {
        let def = StubDefinition { status, response };
        store
            .set(
                &keys::stub_key(route, endpoint, method),
                &serde_json::to_string(&def).unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn test_static_hit_synthesizes_and_signs() {
        let (engine, store) = engine_with_store();
        put_static(
            &store,
            "exchange",
            "widgets",
            "post",
            201,
            json!({"id": "randomUUID", "note": "ok"}),
        );

        let reply = engine
            .dispatch("exchange", "widgets", "POST", &json!({}))
            .unwrap();
        assert_eq!(reply.status, 201);
        assert_eq!(reply.body["note"], "ok");
        assert!(uuid::Uuid::parse_str(reply.body["id"].as_str().unwrap()).is_ok());
        assert_eq!(reply.signature.signature.len(), 128);

        // Two requests never share a generated id.
        let second = engine
            .dispatch("exchange", "widgets", "POST", &json!({}))
            .unwrap();
        assert_ne!(second.body["id"], reply.body["id"]);
    }

    #[test]
    fn test_method_scopes_static_lookup() {
        let (engine, store) = engine_with_store();
        put_static(&store, "exchange", "widgets", "get", 200, json!({"ok": true}));

        assert!(engine
            .dispatch("exchange", "widgets", "GET", &json!({}))
            .is_ok());
        assert!(matches!(
            engine.dispatch("exchange", "widgets", "POST", &json!({})),
            Err(StubError::NoStubMatched { .. })
        ));
    }

    #[test]
    fn test_pattern_hit_substitutes_params() {
        let (engine, registry, _) = engine_with_registry();
        registry
            .add(
                "/orders/:id/status",
                "post",
                StubDefinition {
                    status: 200,
                    response: json!({"order": "{{id}}", "state": "done"}),
                },
            )
            .unwrap();

        let reply = engine
            .dispatch("exchange", "orders/42/status", "POST", &json!({}))
            .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, json!({"order": "42", "state": "done"}));
    }

    #[test]
    fn test_static_wins_over_pattern() {
        let (engine, registry, store) = engine_with_registry();
        registry
            .add(
                "/foo/:id",
                "post",
                StubDefinition {
                    status: 500,
                    response: json!({"via": "pattern"}),
                },
            )
            .unwrap();
        put_static(&store, "exchange", "foo/bar", "post", 200, json!({"via": "static"}));

        let reply = engine
            .dispatch("exchange", "foo/bar", "POST", &json!({}))
            .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["via"], "static");

        // Paths the static key does not cover still reach the pattern.
        let reply = engine
            .dispatch("exchange", "foo/baz", "POST", &json!({}))
            .unwrap();
        assert_eq!(reply.body["via"], "pattern");
    }

    #[test]
    fn test_no_match_is_404_and_still_recorded() {
        let (engine, _) = engine_with_store();
        let err = engine
            .dispatch("exchange", "ghost", "POST", &json!({"probe": 1}))
            .unwrap_err();
        assert_eq!(err.status_code(), 404);

        let recent = engine.ledger().recent("exchange", "ghost", "post").unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].body, json!({"probe": 1}));
    }

    #[test]
    fn test_transaction_mapping_written_when_id_present() {
        let (engine, store) = engine_with_store();
        put_static(&store, "exchange", "widgets", "post", 200, json!({"ok": true}));

        engine
            .dispatch("exchange", "widgets", "POST", &json!({"data": {"tx_id": "t-7"}}))
            .unwrap();

        let mapping = engine
            .mapper()
            .lookup("exchange", "widgets", "t-7")
            .unwrap()
            .unwrap();
        assert_eq!(mapping.response.status, 200);
        assert_eq!(mapping.response.body, json!({"ok": true}));
        assert_eq!(mapping.request.body, json!({"data": {"tx_id": "t-7"}}));
    }

    #[test]
    fn test_no_mapping_without_id() {
        let (engine, store) = engine_with_store();
        put_static(&store, "exchange", "widgets", "post", 200, json!({"ok": true}));

        engine
            .dispatch("exchange", "widgets", "POST", &json!({"plain": true}))
            .unwrap();
        let leftover = store.keys("request:*").unwrap();
        assert!(leftover.is_empty());
    }

    #[test]
    fn test_mapping_stores_synthesized_body() {
        let (engine, store) = engine_with_store();
        put_static(&store, "exchange", "widgets", "post", 200, json!({"id": "randomUUID"}));

        let reply = engine
            .dispatch("exchange", "widgets", "POST", &json!({"tx_id": "t-9"}))
            .unwrap();
        let mapping = engine
            .mapper()
            .lookup("exchange", "widgets", "t-9")
            .unwrap()
            .unwrap();
        // The mapped response is the post-synthesis body, not the template.
        assert_eq!(mapping.response.body, reply.body);
    }
}
