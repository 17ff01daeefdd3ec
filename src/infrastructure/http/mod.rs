//! HTTP REST API routes

mod adventure_routes;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::infrastructure::state::AppState;

pub use adventure_routes::*;

/// Create all API routes
pub fn create_routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        // Selection listings
        .route(
            "/api/documents/{kind}",
            get(adventure_routes::list_documents),
        )
        .route(
            "/api/collections",
            get(adventure_routes::list_collections),
        )
        // Bundles
        .route(
            "/api/adventures/export",
            post(adventure_routes::export_adventure),
        )
        .route(
            "/api/adventures/import",
            post(adventure_routes::import_adventure)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}
