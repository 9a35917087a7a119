use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, convert};
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router
///
/// CORS and security headers are applied in [`crate::server::build_app`].
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::root))
        .route("/health", get(api::health_check))
        .route("/convert/tts", post(convert::convert_tts))
        .layer(TraceLayer::new_for_http())
}
