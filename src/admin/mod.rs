//! Operator HTTP API.
//!
//! Every route requires the bearer API key. Results use the
//! [`handlers::OperationResult`] envelope.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::context::AppContext;

pub use handlers::OperationResult;

#[derive(Clone)]
pub struct AdminState {
    pub ctx: Arc<AppContext>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let api_key = Arc::from(ctx.config.admin.api_key.as_str());
        Self { ctx, api_key }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/matches", get(list_matches).post(create_match))
        .route("/admin/matches/{id}", get(get_match))
        .route("/admin/matches/{id}/bets", post(create_bet))
        .route("/admin/matches/{id}/distribute", post(distribute))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API on `listener` until `shutdown` fires.
pub async fn serve(
    ctx: Arc<AppContext>,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    let router = setup_admin_router(AdminState::new(ctx));
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
