//! Response synthesis: placeholder substitution and signing.
//!
//! Two independent transforms are applied to a response template before it is
//! sent, always in this order:
//!
//! 1. UUID substitution: every string equal to the sentinel literal
//!    `"randomUUID"` becomes the same freshly generated UUID within one
//!    synthesis call.
//! 2. Template substitution (pattern-stub path only): `{{name}}`
//!    placeholders are textually replaced with captured path parameters.
//!
//! Signing always covers the final synthesized body.

use crate::types::HistoryRecord;
use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use regex::Regex;
use serde_json::Value;
use sha2::Sha512;
use std::collections::HashMap;
use std::sync::OnceLock;

/// String literal replaced by a generated UUID at synthesis time.
pub const UUID_SENTINEL: &str = "randomUUID";

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX
        .get_or_init(|| Regex::new(r"\{\{([a-zA-Z_][a-zA-Z0-9_]*)\}\}").unwrap())
}

/// Replace every `"randomUUID"` sentinel in `value` with one freshly
/// generated UUID, the same UUID for every occurrence within this call.
/// Arrays and nested objects are walked; other scalars pass through.
pub fn replace_random_uuid(value: &Value) -> Value {
    let new_uuid = uuid::Uuid::new_v4().to_string();

    fn recurse(value: &Value, new_uuid: &str) -> Value {
        match value {
            Value::String(s) if s == UUID_SENTINEL => Value::String(new_uuid.to_string()),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| recurse(v, new_uuid)).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), recurse(v, new_uuid)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    recurse(value, &new_uuid)
}

/// Substitute captured path parameters into every `{{name}}` placeholder of
/// the template: stringify, replace textually, re-parse. A parameter that
/// was not captured substitutes as the empty string.
///
/// Values are NOT JSON-escaped before insertion; a captured value holding a
/// quote or control character can make the re-parse fail. This mirrors the
/// behavior existing stub definitions rely on.
pub fn apply_path_params(template: &Value, params: &HashMap<String, String>) -> Result<Value> {
    let raw = serde_json::to_string(template).context("Failed to stringify response template")?;
    let replaced = placeholder_regex().replace_all(&raw, |caps: &regex::Captures| {
        params.get(&caps[1]).cloned().unwrap_or_default()
    });
    serde_json::from_str(&replaced).context("Templated response is no longer valid JSON")
}

/// Signature headers attached to synthesized responses.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureHeaders {
    /// Millisecond epoch timestamp, as a string.
    pub date: String,
    /// Hex HMAC-SHA512 over `JSON(body) + date`.
    pub signature: String,
}

/// HMAC-SHA512 response signer.
///
/// The signature is a function of body bytes and timestamp only: the same
/// body signed at two different instants yields two different signatures,
/// which is the intended replay mitigation.
#[derive(Clone)]
pub struct Signer {
    secret: String,
}

impl Signer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign a synthesized body at the current instant.
    pub fn sign(&self, body: &Value) -> SignatureHeaders {
        let date = chrono::Utc::now().timestamp_millis().to_string();
        let signature = self.sign_at(body, &date);
        SignatureHeaders { date, signature }
    }

    fn sign_at(&self, body: &Value, date: &str) -> String {
        let msg = format!("{}{}", serde_json::to_string(body).unwrap_or_default(), date);
        // HMAC accepts keys of any length
        let mut mac = Hmac::<Sha512>::new_from_slice(self.secret.as_bytes())
            .expect("HMAC key of any length is valid");
        mac.update(msg.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Build the history record captured for an inbound request.
pub fn capture_request(method: &str, body: &Value) -> HistoryRecord {
    HistoryRecord {
        timestamp: chrono::Utc::now().to_rfc3339(),
        method: method.to_string(),
        body: body.clone(),
    }
}
