//! HTTP handlers for the detection API.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::SharedState;
use crate::error::{ApiError, ApiResult};
use crate::storage::{
    AnalysisRecord, AnalysisStats, RecordStore, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT,
};

/// Multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "file";

/// Query parameters for `GET /analysis-history`
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

impl HistoryQuery {
    /// Requested limit clamped to `1..=MAX_HISTORY_LIMIT`
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .map(|l| l.clamp(1, i64::from(MAX_HISTORY_LIMIT)) as u32)
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
    }
}

/// Body of `GET /analysis-history`
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<AnalysisRecord>,
}

/// Body of `GET /stats`
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub statistics: AnalysisStats,
}

/// POST /disease-detection-file
pub async fn detect_disease(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> ApiResult<Json<AnalysisRecord>> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Invalid multipart body", e))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error("Failed to read uploaded file", e))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.ok_or_else(|| {
        ApiError::BadRequest(format!("Missing multipart field '{}'", UPLOAD_FIELD))
    })?;

    info!(filename = %filename, bytes = bytes.len(), "Received image for disease detection");

    let record = state.analyzer.analyze(&bytes, &filename).await.map_err(|e| {
        warn!(filename = %filename, error = %e, "Disease detection request failed");
        ApiError::from(e)
    })?;

    Ok(Json(record))
}

fn multipart_error(context: &str, err: MultipartError) -> ApiError {
    let message = format!("{}: {}", context, err.body_text());
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(message)
    } else {
        ApiError::BadRequest(message)
    }
}

/// GET /analysis-history
pub async fn analysis_history(
    State(state): State<SharedState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    let history = state
        .storage
        .list_recent(query.effective_limit())
        .await
        .map_err(|e| {
            error!(error = %e, "Error retrieving analysis history");
            ApiError::from(e)
        })?;

    Ok(Json(HistoryResponse { history }))
}

/// GET /analysis-image/:id
pub async fn analysis_image(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let image = state.storage.get_image(id).await.map_err(|e| {
        error!(analysis_id = id, error = %e, "Error retrieving analysis image");
        ApiError::from(e)
    })?;

    match image {
        Some(bytes) => Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response()),
        None => Err(ApiError::NotFound("Image not found".to_string())),
    }
}

/// GET /stats
pub async fn statistics(State(state): State<SharedState>) -> ApiResult<Json<StatsResponse>> {
    let statistics = state.storage.aggregate_stats().await.map_err(|e| {
        error!(error = %e, "Error retrieving statistics");
        ApiError::from(e)
    })?;

    Ok(Json(StatsResponse { statistics }))
}

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Leaf Disease Detection API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "AI-powered leaf disease detection with analysis history tracking",
        "endpoints": {
            "disease_detection_file": "/disease-detection-file (POST, file upload)",
            "analysis_history": "/analysis-history (GET, retrieve analysis history)",
            "analysis_image": "/analysis-image/{id} (GET, retrieve the uploaded image)",
            "statistics": "/stats (GET, retrieve system statistics)"
        }
    }))
}
