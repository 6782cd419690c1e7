pub mod lifecycle;
pub mod proxy;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

pub use lifecycle::{INIT_SUCCESS, PRE_STOP_SUCCESS};
pub use state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/initialize",
            get(lifecycle::initialize).post(lifecycle::initialize),
        )
        .route(
            "/pre-stop",
            get(lifecycle::pre_stop).post(lifecycle::pre_stop),
        )
        .fallback(proxy::forward)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
