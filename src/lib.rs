//! # Leaf Disease Detection
//!
//! An HTTP service that diagnoses plant leaf diseases from uploaded images
//! by delegating to a hosted multimodal vision model, then keeps every
//! analysis (including the original image) in SQLite for later review.
//!
//! ## Features
//!
//! - **Diagnosis**: upload a leaf photo, get a structured diagnosis back
//! - **Normalization**: unreliable model text is coerced into a fixed schema
//! - **History**: recent analyses and their stored images
//! - **Statistics**: totals and a per-category distribution
//!
//! ## Architecture
//!
//! ```text
//! HTTP client → axum router → Analyzer → Vision API (HTTP)
//!                                 ↓
//!                           SQLite (history)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use leaf_disease_detection::{build_router, AppState, Config};
//! use leaf_disease_detection::storage::SqliteStorage;
//! use leaf_disease_detection::vision::VisionClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let vision = VisionClient::new(&config.vision, config.request.clone())?;
//!     let addr = config.server.bind_addr();
//!     let state = Arc::new(AppState::new(config, storage, Arc::new(vision)));
//!     let listener = tokio::net::TcpListener::bind(addr).await?;
//!     axum::serve(listener, build_router(state)).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Upload analysis pipeline and reply normalization.
pub mod analysis;
/// Command-line interface for the binary.
pub mod cli;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Diagnosis prompt sent with every image.
pub mod prompts;
/// HTTP API router and handlers.
pub mod server;
/// SQLite storage layer for analysis history.
pub mod storage;
/// Vision model client and wire types.
pub mod vision;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{build_router, AppState, SharedState};
