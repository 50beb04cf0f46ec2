//! Routing table and listener for the control endpoint.

use std::future::Future;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use crate::handlers::{
    breakpoints_handler, continue_handler, index_handler, launch_handler, not_found_handler,
    AppState,
};

/// Build the control endpoint router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/launch", get(launch_handler))
        .route("/breakpoints", get(breakpoints_handler))
        .route("/continue", get(continue_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` resolves.
///
/// In-flight requests are allowed to finish after `shutdown` fires.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("control endpoint listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
