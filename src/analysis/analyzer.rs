use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use super::normalize;
use crate::error::{AnalysisError, AnalysisResult};
use crate::prompts::LEAF_DIAGNOSIS_PROMPT;
use crate::storage::{AnalysisRecord, NewAnalysis, RecordStore};
use crate::vision::{ImagePayload, VisionModel};

/// Filename recorded when the upload did not carry one.
pub const DEFAULT_FILENAME: &str = "upload";

/// Runs one upload through the vision model, the normalizer and the store.
#[derive(Clone)]
pub struct Analyzer {
    vision: Arc<dyn VisionModel>,
    store: Arc<dyn RecordStore>,
}

impl Analyzer {
    /// Create a new analyzer
    pub fn new(vision: Arc<dyn VisionModel>, store: Arc<dyn RecordStore>) -> Self {
        Self { vision, store }
    }

    /// Diagnose an uploaded image and persist the result.
    ///
    /// Exactly one row is inserted on success. Nothing is inserted when the
    /// upload is empty, the model call fails, or the insert itself fails.
    pub async fn analyze(&self, image: &[u8], filename: &str) -> AnalysisResult<AnalysisRecord> {
        let start = Instant::now();

        if image.is_empty() {
            return Err(AnalysisError::InvalidUpload {
                reason: "Uploaded file is empty".to_string(),
            });
        }

        let filename = match filename.trim() {
            "" => DEFAULT_FILENAME,
            name => name,
        };

        let payload = ImagePayload::from_bytes(image);
        debug!(
            filename = %filename,
            bytes = image.len(),
            mime_type = %payload.mime_type,
            "Sending image to vision model"
        );

        let reply = match self.vision.describe_image(&payload, LEAF_DIAGNOSIS_PROMPT).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    filename = %filename,
                    error = %e,
                    latency_ms = start.elapsed().as_millis(),
                    "Disease detection unavailable"
                );
                return Err(e.into());
            }
        };

        let diagnosis = normalize(&reply);
        let analysis = NewAnalysis::new(diagnosis, filename);

        let id = self.store.insert(&analysis, Some(image)).await?;
        let record = analysis.into_record(id);

        info!(
            analysis_id = record.id,
            filename = %record.image_filename,
            disease_detected = record.diagnosis.disease_detected,
            disease_type = %record.diagnosis.disease_type,
            confidence = record.diagnosis.confidence,
            latency_ms = start.elapsed().as_millis(),
            "Leaf analysis completed"
        );

        Ok(record)
    }

    /// Store used for persistence
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VisionError;
    use crate::storage::{SqliteStorage, INVALID_IMAGE};
    use crate::vision::MockVisionModel;

    async fn create_test_storage() -> Arc<SqliteStorage> {
        Arc::new(
            SqliteStorage::new_in_memory()
                .await
                .expect("Failed to create in-memory storage"),
        )
    }

    fn vision_replying(reply: &'static str) -> Arc<dyn VisionModel> {
        let mut mock = MockVisionModel::new();
        mock.expect_describe_image()
            .times(1)
            .returning(move |_, _| Ok(reply.to_string()));
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_analyze_persists_record() {
        let storage = create_test_storage().await;
        let analyzer = Analyzer::new(
            vision_replying(r#"{"disease_detected": true, "disease_name": "Early Blight", "disease_type": "fungal", "severity": "mild", "confidence": 77}"#),
            storage.clone(),
        );

        let record = analyzer.analyze(b"leaf-bytes", "tomato.jpg").await.unwrap();
        assert_eq!(record.image_filename, "tomato.jpg");
        assert_eq!(record.diagnosis.disease_name.as_deref(), Some("Early Blight"));
        assert_eq!(record.diagnosis.confidence, 77.0);

        assert_eq!(storage.count().await.unwrap(), 1);
        let image = storage.get_image(record.id).await.unwrap();
        assert_eq!(image.as_deref(), Some(&b"leaf-bytes"[..]));

        let history = storage.list_recent(10).await.unwrap();
        assert_eq!(history, vec![record]);
    }

    #[tokio::test]
    async fn test_analyze_sends_prompt_and_image() {
        let storage = create_test_storage().await;
        let mut mock = MockVisionModel::new();
        mock.expect_describe_image()
            .withf(|image, prompt| {
                prompt == LEAF_DIAGNOSIS_PROMPT && image.data_url().starts_with("data:image/")
            })
            .times(1)
            .returning(|_, _| Ok(r#"{"disease_detected": false, "disease_type": "healthy"}"#.to_string()));

        let analyzer = Analyzer::new(Arc::new(mock), storage);
        let record = analyzer.analyze(b"\xFF\xD8\xFFleaf", "a.jpg").await.unwrap();
        assert!(record.diagnosis.is_healthy());
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected_without_model_call() {
        let storage = create_test_storage().await;
        let mut mock = MockVisionModel::new();
        mock.expect_describe_image().times(0);

        let analyzer = Analyzer::new(Arc::new(mock), storage.clone());
        let result = analyzer.analyze(b"", "empty.jpg").await;

        assert!(matches!(result, Err(AnalysisError::InvalidUpload { .. })));
        assert_eq!(storage.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_persists_nothing() {
        let storage = create_test_storage().await;
        let mut mock = MockVisionModel::new();
        mock.expect_describe_image()
            .times(1)
            .returning(|_, _| Err(VisionError::Timeout { timeout_ms: 30000 }));

        let analyzer = Analyzer::new(Arc::new(mock), storage.clone());
        let result = analyzer.analyze(b"leaf", "leaf.jpg").await;

        assert!(matches!(
            result,
            Err(AnalysisError::DetectionUnavailable(VisionError::Timeout { .. }))
        ));
        assert_eq!(storage.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_reply_is_stored_as_invalid_image() {
        let storage = create_test_storage().await;
        let analyzer = Analyzer::new(
            vision_replying("I cannot process this image, it does not appear to be a leaf."),
            storage.clone(),
        );

        let record = analyzer.analyze(b"cat-photo", "cat.png").await.unwrap();
        assert_eq!(record.diagnosis.disease_type, INVALID_IMAGE);
        assert!(!record.diagnosis.disease_detected);

        let stats = storage.aggregate_stats().await.unwrap();
        assert_eq!(stats.invalid_images, 1);
    }

    #[tokio::test]
    async fn test_blank_filename_gets_default() {
        let storage = create_test_storage().await;
        let analyzer = Analyzer::new(
            vision_replying(r#"{"disease_detected": false, "disease_type": "healthy", "confidence": 90}"#),
            storage,
        );

        let record = analyzer.analyze(b"leaf", "  ").await.unwrap();
        assert_eq!(record.image_filename, DEFAULT_FILENAME);
    }

    #[tokio::test]
    async fn test_storage_failure_is_surfaced() {
        let storage = create_test_storage().await;
        storage.close().await;

        let analyzer = Analyzer::new(
            vision_replying(r#"{"disease_detected": false, "disease_type": "healthy"}"#),
            storage,
        );

        let result = analyzer.analyze(b"leaf", "leaf.jpg").await;
        assert!(matches!(result, Err(AnalysisError::StorageFailure(_))));
    }
}
