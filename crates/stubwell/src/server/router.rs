//! Route dispatch for the stub surface.
//!
//! Every mounted base path serves the same shape:
//!
//! ```text
//! POST   {base}/set/{endpoint}            create/update a stub
//! DELETE {base}/delete/{endpoint}         remove a stub
//! GET    {base}/history/{endpoint}        last 5 raw requests
//! GET    {base}/stub-list                 stubs scoped to the base
//! GET    {base}/{endpoint}/state          current stub definition
//! GET    {base}/{endpoint}/{txId}         stored request/response pair
//! ALL    {base}/*                         default dispatch
//! ```
//!
//! plus a global `GET /stub-list` and, when configured, the callback relay.

use super::handlers;
use super::types::{collect_body, error_response, not_found, parse_json_body};
use super::AppState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Parsed route below a mounted base path.
#[derive(Debug, PartialEq)]
enum ServiceRoute {
    /// POST {base}/set/{endpoint}
    Set(String),
    /// DELETE {base}/delete/{endpoint}
    Delete(String),
    /// GET {base}/history/{endpoint}
    History(String),
    /// GET {base}/stub-list
    StubList,
    /// GET {base}/{endpoint}/state
    State(String),
    /// GET {base}/{endpoint}/{transactionId}
    Transaction(String, String),
    /// Anything else: default dispatch through the engine
    Dispatch(String),
}

impl ServiceRoute {
    /// Parse from path segments after the base. More specific shapes are
    /// tried first; a multi-segment GET that is not `state` reads as a
    /// transaction lookup, everything else falls through to dispatch.
    fn parse(method: &Method, segments: &[&str]) -> Option<Self> {
        match (method, segments) {
            (_, []) => None,
            (&Method::POST, ["set", rest @ ..]) if !rest.is_empty() => {
                Some(ServiceRoute::Set(rest.join("/")))
            }
            (&Method::DELETE, ["delete", rest @ ..]) if !rest.is_empty() => {
                Some(ServiceRoute::Delete(rest.join("/")))
            }
            (&Method::GET, ["history", rest @ ..]) if !rest.is_empty() => {
                Some(ServiceRoute::History(rest.join("/")))
            }
            (&Method::GET, ["stub-list"]) => Some(ServiceRoute::StubList),
            (&Method::GET, [front @ .., "state"]) if !front.is_empty() => {
                Some(ServiceRoute::State(front.join("/")))
            }
            (&Method::GET, [front @ .., tx_id]) if !front.is_empty() => Some(
                ServiceRoute::Transaction(front.join("/"), (*tx_id).to_string()),
            ),
            _ => Some(ServiceRoute::Dispatch(segments.join("/"))),
        }
    }
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|s| s.to_string());

    let request_id = uuid::Uuid::new_v4();
    debug!("[{request_id}] {method} {path}");

    // Global listing spans every mounted route.
    if method == Method::GET && path == "/stub-list" {
        return Ok(handlers::handle_stub_list(&state, None));
    }

    let trimmed = path.trim_start_matches('/');
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    let Some((base, rest)) = segments.split_first() else {
        return Ok(not_found());
    };

    // Callback relay, when configured.
    if state
        .config
        .callback
        .as_ref()
        .is_some_and(|c| c.route == *base)
    {
        if method != Method::POST || !rest.is_empty() {
            return Ok(not_found());
        }
        let payload = match read_json(req).await {
            Ok(p) => p,
            Err(resp) => return Ok(resp),
        };
        return Ok(handlers::handle_callback(&state, &payload));
    }

    if !state.config.routes.iter().any(|r| r == base) {
        return Ok(not_found());
    }
    let route = base.to_string();

    let Some(service_route) = ServiceRoute::parse(&method, rest) else {
        return Ok(not_found());
    };

    let response = match service_route {
        ServiceRoute::Set(endpoint) => {
            let payload = match read_json(req).await {
                Ok(p) => p,
                Err(resp) => return Ok(resp),
            };
            handlers::handle_set(&state, &route, &endpoint, &payload)
        }
        ServiceRoute::Delete(endpoint) => {
            handlers::handle_delete(&state, &route, &endpoint, query.as_deref())
        }
        ServiceRoute::History(endpoint) => {
            handlers::handle_history(&state, &route, &endpoint, query.as_deref())
        }
        ServiceRoute::StubList => handlers::handle_stub_list(&state, Some(&route)),
        ServiceRoute::State(endpoint) => handlers::handle_state(&state, &route, &endpoint),
        ServiceRoute::Transaction(endpoint, tx_id) => {
            handlers::handle_transaction(&state, &route, &endpoint, &tx_id)
        }
        ServiceRoute::Dispatch(endpoint) => {
            let payload = match read_json(req).await {
                Ok(p) => p,
                Err(resp) => return Ok(resp),
            };
            handlers::handle_dispatch(&state, &route, &endpoint, method.as_str(), &payload)
        }
    };

    Ok(response)
}

async fn read_json(
    req: Request<Incoming>,
) -> Result<serde_json::Value, Response<Full<Bytes>>> {
    let bytes = collect_body(req)
        .await
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e))?;
    parse_json_body(&bytes).map_err(|e| error_response(StatusCode::BAD_REQUEST, &e))
}
