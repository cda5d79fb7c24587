//! Startup seeding: bulk-load stub definitions from a JSON file into storage.
//!
//! A missing or unreadable seed file is logged and skipped: seeding is a
//! convenience, not a serving precondition.

use crate::keys;
use crate::storage::KvStore;
use crate::types::{StubDefinition, ALLOWED_METHODS};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct SeedEntry {
    pub route: String,
    pub endpoint: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub status: u16,
    pub response: Value,
}

fn default_method() -> String {
    "post".to_string()
}

/// Write every entry of the seed file to storage as a static stub. Entries
/// that fail to persist are logged and skipped; returns the number seeded.
pub fn seed_stubs(store: &Arc<dyn KvStore>, path: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let entries: Vec<SeedEntry> =
        serde_json::from_str(&raw).context("Failed to parse seed file")?;

    let mut seeded = 0;
    for entry in entries {
        let method = entry.method.to_lowercase();
        let method = if ALLOWED_METHODS.contains(&method.as_str()) {
            method
        } else {
            default_method()
        };
        let definition = StubDefinition {
            status: entry.status,
            response: entry.response,
        };
        let key = keys::stub_key(&entry.route, &entry.endpoint, &method);
        let raw = serde_json::to_string(&definition)
            .context("Failed to serialize seed stub definition")?;
        match store.set(&key, &raw) {
            Ok(()) => {
                info!("Seeded stub /{}/{} ({method})", entry.route, entry.endpoint);
                seeded += 1;
            }
            Err(e) => {
                error!(
                    "Failed to seed stub /{}/{}: {e:#}",
                    entry.route, entry.endpoint
                );
            }
        }
    }
    Ok(seeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use std::io::Write;

    fn store() -> Arc<dyn KvStore> {
        Arc::new(InMemoryStore::new())
    }

    #[test]
    fn test_seed_writes_stub_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"route": "exchange", "endpoint": "widgets", "status": 201, "response": {{"ok": true}}}},
                {{"route": "exchange", "endpoint": "orders", "method": "GET", "status": 200, "response": {{}}}}
            ]"#
        )
        .unwrap();

        let store = store();
        let seeded = seed_stubs(&store, file.path()).unwrap();
        assert_eq!(seeded, 2);

        let raw = store.get("stub:exchange:widgets:post").unwrap().unwrap();
        let def: StubDefinition = serde_json::from_str(&raw).unwrap();
        assert_eq!(def.status, 201);
        assert!(store.exists("stub:exchange:orders:get").unwrap());
    }

    #[test]
    fn test_seed_normalizes_unknown_method() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"route": "r", "endpoint": "e", "method": "TRACE", "status": 200, "response": {{}}}}]"#
        )
        .unwrap();

        let store = store();
        seed_stubs(&store, file.path()).unwrap();
        assert!(store.exists("stub:r:e:post").unwrap());
    }

    #[test]
    fn test_seed_missing_file_is_an_error() {
        let store = store();
        assert!(seed_stubs(&store, Path::new("/nonexistent/stubs.json")).is_err());
    }

    #[test]
    fn test_seed_bad_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let store = store();
        assert!(seed_stubs(&store, file.path()).is_err());
    }
}
