//! Parameterized stub registry.
//!
//! Holds the set of pattern stubs (`/orders/:id/status` style paths) with
//! compiled matchers, shared by every request handler. The persisted hash is
//! the source of truth: `add` writes storage before touching the in-memory
//! set, so a crash between the two is recovered by the next [`PatternRegistry::load`].
//!
//! Matching is first-match-wins in registration order: never by specificity.
//! Templating relies on this scan order, so it must not change.

use crate::error::StubError;
use crate::storage::KvStore;
use crate::types::StubDefinition;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Storage hash holding all persisted pattern stubs, one field per
/// (method, pattern) pair.
pub const PATTERN_HASH_KEY: &str = "patternStubs";

fn hash_field(method: &str, pattern: &str) -> String {
    format!("{method}:{pattern}")
}

/// Compiled matcher for one path pattern. `:name` segments capture one path
/// segment each; all other segments must match literally.
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    /// Compile a pattern into an anchored regex with named capture groups.
    pub fn compile(pattern: &str) -> Result<Self, StubError> {
        let mut parts = Vec::new();
        for segment in pattern.split('/') {
            match segment.strip_prefix(':') {
                Some(name) if !name.is_empty() => {
                    if !is_valid_param_name(name) {
                        return Err(StubError::Validation(format!(
                            "invalid path parameter name: {name}"
                        )));
                    }
                    parts.push(format!("(?P<{name}>[^/]+)"));
                }
                _ => parts.push(regex::escape(segment)),
            }
        }
        let source = format!("^{}$", parts.join("/"));
        let regex = Regex::new(&source)
            .map_err(|e| StubError::Validation(format!("unusable path pattern {pattern}: {e}")))?;
        Ok(Self { regex })
    }

    /// Match a concrete path, returning the captured parameter map.
    /// Percent-encoded path segments are decoded before comparison.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let decoded = decode_path(path);
        let caps = self.regex.captures(&decoded)?;
        let mut params = HashMap::new();
        for name in self.regex.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                params.insert(name.to_string(), m.as_str().to_string());
            }
        }
        Some(params)
    }
}

fn is_valid_param_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn decode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|c| c.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .collect::<Vec<_>>()
        .join("/")
}

struct PatternEntry {
    pattern: String,
    method: String,
    matcher: PatternMatcher,
    definition: StubDefinition,
}

/// A successful pattern lookup: the definition plus captured parameters.
pub struct PatternMatch {
    pub pattern: String,
    pub definition: StubDefinition,
    pub params: HashMap<String, String>,
}

/// Shared registry of pattern stubs. Constructed once by the composition
/// root and passed by reference to every handler.
pub struct PatternRegistry {
    store: Arc<dyn KvStore>,
    entries: RwLock<Vec<PatternEntry>>,
}

impl PatternRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Bulk-populate from storage. Safe to re-run: clears and re-populates,
    /// so a reload never leaves duplicate entries. Corrupt persisted entries
    /// are skipped with a warning rather than poisoning the whole set.
    pub fn load(&self) -> Result<usize> {
        let persisted = self
            .store
            .hgetall(PATTERN_HASH_KEY)
            .context("Failed to load pattern stubs from storage")?;

        let mut entries = Vec::new();
        for (field, raw) in persisted {
            let Some((method, pattern)) = field.split_once(':') else {
                warn!("Skipping malformed pattern stub field: {field}");
                continue;
            };
            let definition: StubDefinition = match serde_json::from_str(&raw) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Skipping unparseable pattern stub {field}: {e}");
                    continue;
                }
            };
            let matcher = match PatternMatcher::compile(pattern) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Skipping uncompilable pattern {pattern}: {e}");
                    continue;
                }
            };
            info!("Loaded pattern stub {} {}", method.to_uppercase(), pattern);
            entries.push(PatternEntry {
                pattern: pattern.to_string(),
                method: method.to_string(),
                matcher,
                definition,
            });
        }

        let count = entries.len();
        *self.entries.write() = entries;
        Ok(count)
    }

    /// Insert or replace the stub keyed by (method, pattern). Storage is
    /// written first; the in-memory entry replaces in place so registration
    /// order is preserved across updates.
    pub fn add(
        &self,
        pattern: &str,
        method: &str,
        definition: StubDefinition,
    ) -> Result<(), StubError> {
        let matcher = PatternMatcher::compile(pattern)?;
        let raw = serde_json::to_string(&definition)
            .context("Failed to serialize pattern stub definition")?;
        self.store
            .hset(PATTERN_HASH_KEY, &hash_field(method, pattern), &raw)
            .context("Failed to persist pattern stub")?;

        let mut entries = self.entries.write();
        match entries
            .iter_mut()
            .find(|e| e.method == method && e.pattern == pattern)
        {
            Some(entry) => {
                entry.matcher = matcher;
                entry.definition = definition;
            }
            None => entries.push(PatternEntry {
                pattern: pattern.to_string(),
                method: method.to_string(),
                matcher,
                definition,
            }),
        }
        info!("Registered pattern stub {} {}", method.to_uppercase(), pattern);
        Ok(())
    }

    /// Delete from storage and memory. No-op if absent in memory; callers
    /// wanting a not-found signal check [`Self::exists_in_storage`] first.
    pub fn remove(&self, pattern: &str, method: &str) -> Result<(), StubError> {
        self.store
            .hdel(PATTERN_HASH_KEY, &hash_field(method, pattern))
            .context("Failed to delete pattern stub from storage")?;
        self.entries
            .write()
            .retain(|e| !(e.method == method && e.pattern == pattern));
        info!("Removed pattern stub {} {}", method.to_uppercase(), pattern);
        Ok(())
    }

    /// Whether the persisted set holds this (method, pattern) pair.
    pub fn exists_in_storage(&self, pattern: &str, method: &str) -> Result<bool, StubError> {
        Ok(self
            .store
            .hexists(PATTERN_HASH_KEY, &hash_field(method, pattern))
            .context("Failed to check pattern stub existence")?)
    }

    /// First entry in registration order whose method matches and whose
    /// matcher accepts `path`.
    pub fn find_match(&self, path: &str, method: &str) -> Option<PatternMatch> {
        let entries = self.entries.read();
        entries.iter().find_map(|entry| {
            if entry.method != method {
                return None;
            }
            entry.matcher.captures(path).map(|params| PatternMatch {
                pattern: entry.pattern.clone(),
                definition: entry.definition.clone(),
                params,
            })
        })
    }

    /// Snapshot of (pattern, method, definition) for listing endpoints.
    pub fn list(&self) -> Vec<(String, String, StubDefinition)> {
        self.entries
            .read()
            .iter()
            .map(|e| (e.pattern.clone(), e.method.clone(), e.definition.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
