//! Static dev server with a reload event stream.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::Result;
use crate::serve::reload::ReloadHub;

/// Path the injected client script connects to for reload events.
pub const EVENTS_PATH: &str = "/__assetpipe/events";

pub struct DevServer {
    port: u16,
    serve_dir: PathBuf,
    hub: ReloadHub,
}

impl DevServer {
    pub fn new(port: u16, serve_dir: impl Into<PathBuf>, hub: ReloadHub) -> Self {
        Self {
            port,
            serve_dir: serve_dir.into(),
            hub,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(EVENTS_PATH, get(reload_events))
            .with_state(self.hub.clone())
            .fallback_service(ServeDir::new(&self.serve_dir))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` resolves. Fails fast when the port is taken.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding dev server to {addr}"))?;

        info!(
            url = %format!("http://{addr}/"),
            dir = ?self.serve_dir,
            "dev server listening"
        );

        let router = self.router();
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .context("dev server error")?;

        Ok(())
    }
}

async fn reload_events(
    State(hub): State<ReloadHub>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(hub.subscribe()).filter_map(|kind| {
        // Lagged receivers skip to the next notification.
        kind.ok()
            .map(|k| Ok(Event::default().event("reload").data(k.to_string())))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReloadKind;

    #[tokio::test]
    async fn router_builds_with_event_route() {
        let hub = ReloadHub::new();
        let server = DevServer::new(0, "build", hub.clone());
        let _router = server.router();
        // The hub backing the router is the same channel the engine pushes to.
        let mut rx = hub.subscribe();
        crate::engine::runtime::ReloadNotifier::notify(&hub, ReloadKind::FullReload);
        assert_eq!(rx.recv().await.unwrap(), ReloadKind::FullReload);
    }
}
