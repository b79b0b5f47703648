//! HTTP server for the detection API.
//!
//! This module provides:
//! - Shared application state handed to every handler
//! - The axum router with CORS, tracing and upload size limits
//! - Endpoint handlers

mod handlers;

pub use handlers::*;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::analysis::Analyzer;
use crate::config::Config;
use crate::storage::SqliteStorage;
use crate::vision::VisionModel;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// SQLite storage backend.
    pub storage: SqliteStorage,
    /// Upload analysis pipeline.
    pub analyzer: Analyzer,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, storage: SqliteStorage, vision: Arc<dyn VisionModel>) -> Self {
        let analyzer = Analyzer::new(vision, Arc::new(storage.clone()));

        Self {
            config,
            storage,
            analyzer,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

/// Build the API router
pub fn build_router(state: SharedState) -> Router {
    let max_upload_bytes = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(root))
        .route("/disease-detection-file", post(detect_disease))
        .route("/analysis-history", get(analysis_history))
        .route("/analysis-image/:id", get(analysis_image))
        .route("/stats", get(statistics))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
