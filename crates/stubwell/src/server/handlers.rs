//! HTTP handlers for the stub CRUD surface, default dispatch, and the
//! callback relay.

use super::types::*;
use super::AppState;
use crate::error::StubError;
use crate::keys;
use crate::types::{is_pattern_path, StubDefinition, ALLOWED_METHODS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info, warn};

/// Shared HTTP client for outbound callback delivery
static HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

fn http_client() -> &'static reqwest::Client {
    HTTP_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client")
    })
}

/// Map a domain error to its HTTP response.
fn stub_error_response(err: StubError) -> Response<Full<Bytes>> {
    match err {
        StubError::Validation(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
        StubError::NotFound(_) => status_only(StatusCode::NOT_FOUND),
        StubError::Duplicate(msg) => error_response(StatusCode::CONFLICT, &msg),
        StubError::NoStubMatched { method, path } => json_response(
            StatusCode::NOT_FOUND,
            &json!({"error": "no stub matched", "method": method, "path": path}),
        ),
        StubError::Internal(e) => {
            error!("Request failed: {e:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn internal_error(e: anyhow::Error) -> Response<Full<Bytes>> {
    stub_error_response(StubError::Internal(e))
}

/// POST {base}/set/{endpoint} - create or update a stub
pub fn handle_set(
    state: &AppState,
    route: &str,
    endpoint: &str,
    payload: &Value,
) -> Response<Full<Bytes>> {
    let (definition, method) = match StubDefinition::from_payload(payload) {
        Ok(parsed) => parsed,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let existed = if is_pattern_path(endpoint) {
        let pattern = format!("/{endpoint}");
        let existed = match state.registry.exists_in_storage(&pattern, &method) {
            Ok(e) => e,
            Err(err) => return stub_error_response(err),
        };
        if let Err(err) = state.registry.add(&pattern, &method, definition) {
            return stub_error_response(err);
        }
        existed
    } else {
        let key = keys::stub_key(route, endpoint, &method);
        let existed = match state.store.exists(&key) {
            Ok(e) => e,
            Err(e) => return internal_error(e),
        };
        let raw = match serde_json::to_string(&definition) {
            Ok(r) => r,
            Err(e) => return internal_error(e.into()),
        };
        if let Err(e) = state.store.set(&key, &raw) {
            return internal_error(e);
        }
        info!("Stored stub /{route}/{endpoint} ({method})");
        existed
    };

    let (status, result) = if existed {
        (StatusCode::OK, "updated")
    } else {
        (StatusCode::CREATED, "created")
    };
    json_response(status, &json!({"result": result, "endpoint": endpoint}))
}

/// DELETE {base}/delete/{endpoint} - remove a stub
///
/// Static endpoints drop every method variant; pattern endpoints drop the
/// method given via `?method=`, or every registered method when absent.
pub fn handle_delete(
    state: &AppState,
    route: &str,
    endpoint: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    if is_pattern_path(endpoint) {
        let pattern = format!("/{endpoint}");
        let methods: Vec<String> = match query_param(query, "method") {
            Some(m) => vec![m.to_lowercase()],
            None => ALLOWED_METHODS.iter().map(|m| m.to_string()).collect(),
        };

        let mut removed = false;
        for method in &methods {
            match state.registry.exists_in_storage(&pattern, method) {
                Ok(true) => {
                    if let Err(err) = state.registry.remove(&pattern, method) {
                        return stub_error_response(err);
                    }
                    removed = true;
                }
                Ok(false) => {}
                Err(err) => return stub_error_response(err),
            }
        }
        if removed {
            status_only(StatusCode::NO_CONTENT)
        } else {
            stub_error_response(StubError::NotFound(format!("no pattern stub {pattern}")))
        }
    } else {
        let found = match state.store.keys(&keys::stub_endpoint_pattern(route, endpoint)) {
            Ok(k) => k,
            Err(e) => return internal_error(e),
        };
        if found.is_empty() {
            return stub_error_response(StubError::NotFound(format!(
                "no stub for /{route}/{endpoint}"
            )));
        }
        for key in &found {
            if let Err(e) = state.store.del(key) {
                return internal_error(e);
            }
        }
        info!("Deleted stub /{route}/{endpoint} ({} keys)", found.len());
        status_only(StatusCode::NO_CONTENT)
    }
}

/// GET {base}/history/{endpoint} - last 5 raw requests
pub fn handle_history(
    state: &AppState,
    route: &str,
    endpoint: &str,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    let result = match query_param(query, "method") {
        Some(m) => state
            .engine
            .ledger()
            .recent(route, endpoint, &m.to_lowercase()),
        None => state.engine.ledger().recent_any(route, endpoint),
    };
    match result {
        Ok(records) => json_response(StatusCode::OK, &records),
        Err(e) => internal_error(e),
    }
}

/// GET {base}/{endpoint}/state - current stub definition(s)
pub fn handle_state(state: &AppState, route: &str, endpoint: &str) -> Response<Full<Bytes>> {
    let mut stubs = Vec::new();

    if is_pattern_path(endpoint) {
        let pattern = format!("/{endpoint}");
        for (p, method, definition) in state.registry.list() {
            if p == pattern {
                stubs.push(json!({
                    "method": method,
                    "status": definition.status,
                    "response": definition.response,
                }));
            }
        }
    } else {
        let found = match state.store.keys(&keys::stub_endpoint_pattern(route, endpoint)) {
            Ok(k) => k,
            Err(e) => return internal_error(e),
        };
        for key in found {
            let Some((_, _, method)) = parse_stub_key(&key) else {
                continue;
            };
            match state.store.get(&key) {
                Ok(Some(raw)) => match serde_json::from_str::<StubDefinition>(&raw) {
                    Ok(definition) => stubs.push(json!({
                        "method": method,
                        "status": definition.status,
                        "response": definition.response,
                    })),
                    Err(e) => warn!("Skipping unparseable stub at {key}: {e}"),
                },
                Ok(None) => {}
                Err(e) => return internal_error(e),
            }
        }
    }

    if stubs.is_empty() {
        stub_error_response(StubError::NotFound(format!(
            "no stub for /{route}/{endpoint}"
        )))
    } else {
        json_response(StatusCode::OK, &json!({"endpoint": endpoint, "stubs": stubs}))
    }
}

/// GET {base}/stub-list and GET /stub-list - enumerate stubs
pub fn handle_stub_list(state: &AppState, route: Option<&str>) -> Response<Full<Bytes>> {
    let pattern = match route {
        Some(r) => keys::stub_route_pattern(r),
        None => keys::stub_all_pattern(),
    };
    let found = match state.store.keys(&pattern) {
        Ok(k) => k,
        Err(e) => return internal_error(e),
    };

    let mut stubs = Vec::new();
    for key in found {
        let Some((key_route, endpoint, method)) = parse_stub_key(&key) else {
            continue;
        };
        match state.store.get(&key) {
            Ok(Some(raw)) => match serde_json::from_str::<StubDefinition>(&raw) {
                Ok(definition) => stubs.push(json!({
                    "route": key_route,
                    "endpoint": endpoint,
                    "method": method,
                    "status": definition.status,
                    "response": definition.response,
                })),
                Err(e) => warn!("Skipping unparseable stub at {key}: {e}"),
            },
            Ok(None) => {}
            Err(e) => return internal_error(e),
        }
    }

    // Pattern stubs are route-agnostic, so they appear in every listing.
    let patterns: Vec<Value> = state
        .registry
        .list()
        .into_iter()
        .map(|(pattern, method, definition)| {
            json!({
                "pattern": pattern,
                "method": method,
                "status": definition.status,
                "response": definition.response,
            })
        })
        .collect();

    json_response(StatusCode::OK, &json!({"stubs": stubs, "patterns": patterns}))
}

/// GET {base}/{endpoint}/{transactionId} - one stored request/response pair
pub fn handle_transaction(
    state: &AppState,
    route: &str,
    endpoint: &str,
    tx_id: &str,
) -> Response<Full<Bytes>> {
    match state.engine.mapper().lookup(route, endpoint, tx_id) {
        Ok(Some(mapping)) => json_response(StatusCode::OK, &mapping),
        Ok(None) => stub_error_response(StubError::NotFound(format!(
            "no mapping for transaction {tx_id}"
        ))),
        Err(e) => internal_error(e),
    }
}

/// ALL {base}/* - default dispatch through the stub resolution engine
pub fn handle_dispatch(
    state: &AppState,
    route: &str,
    endpoint: &str,
    method: &str,
    payload: &Value,
) -> Response<Full<Bytes>> {
    match state.engine.dispatch(route, endpoint, method, payload) {
        Ok(reply) => {
            let body = serde_json::to_string(&reply.body).unwrap_or_else(|_| "{}".to_string());
            Response::builder()
                .status(reply.status)
                .header("Content-Type", "application/json")
                .header("x-date", &reply.signature.date)
                .header("x-signature", &reply.signature.signature)
                .body(Full::new(Bytes::from(body)))
                .unwrap_or_else(|_| {
                    build_response(StatusCode::INTERNAL_SERVER_ERROR, "Response build error")
                })
        }
        Err(err) => stub_error_response(err),
    }
}

/// POST {callback base} - register a pending callback and deliver it
/// out-of-band.
///
/// The reply goes out immediately; delivery happens from a detached task
/// whose failure is logged and never reaches the caller.
pub fn handle_callback(state: &AppState, payload: &Value) -> Response<Full<Bytes>> {
    let Some(callback) = state.config.callback.as_ref() else {
        return not_found();
    };

    let request_id = payload.get("request_id").and_then(Value::as_str);
    let callback_url = payload.get("callback_url").and_then(Value::as_str);
    let (Some(request_id), Some(callback_url)) = (request_id, callback_url) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "request_id and callback_url are required",
        );
    };

    let key = keys::pending_callback_key(request_id);
    match state.store.exists(&key) {
        Ok(true) => return error_response(StatusCode::CONFLICT, "request_id already exists"),
        Ok(false) => {}
        Err(e) => return internal_error(e),
    }

    let mut rest = payload.as_object().cloned().unwrap_or_default();
    rest.remove("request_id");
    rest.remove("callback_url");
    let rest = Value::Object(rest);

    let pending = json!({"callback_url": callback_url, "payload": rest.clone()});
    if let Err(e) = state
        .store
        .set_ex(&key, &pending.to_string(), callback.ttl_seconds)
    {
        return internal_error(e);
    }

    let url = callback_url.to_string();
    let notification = json!({"request_id": request_id, "data": rest});
    tokio::spawn(async move {
        match http_client().post(&url).json(&notification).send().await {
            Ok(resp) if !resp.status().is_success() => {
                warn!("Callback to {url} answered {}", resp.status());
            }
            Ok(_) => {}
            Err(e) => warn!("Callback to {url} failed: {e}"),
        }
    });

    json_response(StatusCode::OK, &json!({"result": "ok"}))
}

/// Split a `stub:{route}:{endpoint}:{method}` key back into its parts.
/// Endpoints may contain slashes but never colons, so the method is the
/// last colon-delimited segment.
fn parse_stub_key(key: &str) -> Option<(&str, &str, &str)> {
    let rest = key.strip_prefix("stub:")?;
    let (route, rest) = rest.split_once(':')?;
    let (endpoint, method) = rest.rsplit_once(':')?;
    Some((route, endpoint, method))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stub_key() {
        assert_eq!(
            parse_stub_key("stub:exchange:widgets:post"),
            Some(("exchange", "widgets", "post"))
        );
        assert_eq!(
            parse_stub_key("stub:exchange:orders/42/items:get"),
            Some(("exchange", "orders/42/items", "get"))
        );
        assert_eq!(parse_stub_key("history:exchange:widgets:post"), None);
        assert_eq!(parse_stub_key("stub:broken"), None);
    }

    #[test]
    fn test_stub_error_response_statuses() {
        assert_eq!(
            stub_error_response(StubError::Validation("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            stub_error_response(StubError::Duplicate("x".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            stub_error_response(StubError::NoStubMatched {
                method: "POST".into(),
                path: "/x".into()
            })
            .status(),
            StatusCode::NOT_FOUND
        );
    }
}
