//! Bounded request history.
//!
//! Every inbound request is appended to a per-(route, endpoint, method) list
//! before any stub logic runs, trimmed to the 5 most recent entries, with a
//! 30-day TTL refreshed on each append.

use crate::keys;
use crate::storage::KvStore;
use crate::types::HistoryRecord;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Entries kept per history list.
pub const HISTORY_LIMIT: usize = 5;

/// 30 days, refreshed on every append.
pub const HISTORY_TTL_SECS: i64 = 30 * 24 * 3600;

pub struct HistoryLedger {
    store: Arc<dyn KvStore>,
}

impl HistoryLedger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Append a record, trim to the limit, refresh the TTL.
    pub fn record(&self, route: &str, endpoint: &str, method: &str, record: &HistoryRecord) -> Result<()> {
        let key = keys::history_key(route, endpoint, method);
        let raw = serde_json::to_string(record).context("Failed to serialize history record")?;
        self.store.lpush(&key, &raw).context("History LPUSH failed")?;
        self.store
            .ltrim(&key, 0, HISTORY_LIMIT as i64 - 1)
            .context("History LTRIM failed")?;
        self.store
            .expire(&key, HISTORY_TTL_SECS)
            .context("History EXPIRE failed")?;
        Ok(())
    }

    /// Most-recent-first records for one (route, endpoint, method), at most
    /// [`HISTORY_LIMIT`].
    pub fn recent(&self, route: &str, endpoint: &str, method: &str) -> Result<Vec<HistoryRecord>> {
        let key = keys::history_key(route, endpoint, method);
        self.read_list(&key)
    }

    /// Most-recent-first records for one endpoint across every method,
    /// merged by timestamp, capped at [`HISTORY_LIMIT`].
    pub fn recent_any(&self, route: &str, endpoint: &str) -> Result<Vec<HistoryRecord>> {
        let mut merged = Vec::new();
        for key in self
            .store
            .keys(&keys::history_endpoint_pattern(route, endpoint))
            .context("History KEYS failed")?
        {
            merged.extend(self.read_list(&key)?);
        }
        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        merged.truncate(HISTORY_LIMIT);
        Ok(merged)
    }

    fn read_list(&self, key: &str) -> Result<Vec<HistoryRecord>> {
        let raw = self
            .store
            .lrange(key, 0, HISTORY_LIMIT as i64 - 1)
            .context("History LRANGE failed")?;
        raw.iter()
            .map(|item| {
                serde_json::from_str(item).context("Failed to parse stored history record")
            })
            .collect()
    }
}
