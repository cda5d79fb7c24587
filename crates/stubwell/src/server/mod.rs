//! HTTP server wiring: shared state and the accept loop.

pub mod handlers;
pub mod router;
pub mod types;

use crate::config::Config;
use crate::engine::StubEngine;
use crate::registry::PatternRegistry;
use crate::storage::KvStore;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Dependencies shared by every handler, assembled once by the composition
/// root and passed by reference from the router.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn KvStore>,
    pub registry: Arc<PatternRegistry>,
    pub engine: StubEngine,
}

/// Stub server front end
pub struct StubServer {
    addr: SocketAddr,
    state: Arc<AppState>,
}

impl StubServer {
    pub fn new(addr: SocketAddr, state: Arc<AppState>) -> Self {
        Self { addr, state }
    }

    /// Run the accept loop. One spawned task per connection.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Stubwell listening on http://{}", self.addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { router::route_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection error: {}", e);
                }
            });
        }
    }
}
