//! Storage layer for analysis history.
//!
//! A single append-only SQLite table holds every completed analysis together
//! with the uploaded image bytes. Rows are inserted once and never updated.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::StorageResult;

/// Sentinel `disease_type` for uploads that could not be diagnosed as a leaf.
pub const INVALID_IMAGE: &str = "invalid_image";

/// `disease_type` of a leaf with no detected disease.
pub const HEALTHY: &str = "healthy";

/// `disease_type` used when the model reports a disease without a category.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Disease severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Early or localized damage.
    Mild,
    /// Spreading damage.
    Moderate,
    /// Widespread damage.
    Severe,
}

impl Severity {
    /// Get the severity name as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mild" => Ok(Severity::Mild),
            "moderate" => Ok(Severity::Moderate),
            "severe" => Ok(Severity::Severe),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// The model-derived part of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Whether a disease was found.
    pub disease_detected: bool,
    /// Disease name, only when a disease was found.
    pub disease_name: Option<String>,
    /// Category such as `fungal` or `healthy`, or [`INVALID_IMAGE`].
    pub disease_type: String,
    /// Severity, only when a disease was found.
    pub severity: Option<Severity>,
    /// Confidence percentage in `[0, 100]`.
    pub confidence: f64,
    /// Observed symptoms.
    #[serde(default)]
    pub symptoms: Vec<String>,
    /// Likely causes.
    #[serde(default)]
    pub possible_causes: Vec<String>,
    /// Recommended treatments.
    #[serde(default)]
    pub treatment: Vec<String>,
}

impl Diagnosis {
    /// Diagnosis for an upload that could not be read as a leaf.
    pub fn invalid_image(symptoms: Vec<String>, treatment: Vec<String>) -> Self {
        Self {
            disease_detected: false,
            disease_name: None,
            disease_type: INVALID_IMAGE.to_string(),
            severity: None,
            confidence: 0.0,
            symptoms,
            possible_causes: Vec::new(),
            treatment,
        }
    }

    /// Whether this is the `invalid_image` sentinel.
    pub fn is_invalid_image(&self) -> bool {
        self.disease_type == INVALID_IMAGE
    }

    /// Whether the leaf was diagnosed as healthy.
    pub fn is_healthy(&self) -> bool {
        !self.disease_detected && !self.is_invalid_image()
    }
}

/// An analysis that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalysis {
    /// Creation time, truncated to microseconds so it survives storage.
    pub timestamp: DateTime<Utc>,
    /// Normalized model output.
    pub diagnosis: Diagnosis,
    /// Original upload filename.
    pub image_filename: String,
}

impl NewAnalysis {
    /// Stamp a diagnosis with the current time.
    pub fn new(diagnosis: Diagnosis, image_filename: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().trunc_subsecs(6),
            diagnosis,
            image_filename: image_filename.into(),
        }
    }

    /// Override the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(6);
        self
    }

    /// Attach the id assigned by the store.
    pub fn into_record(self, id: i64) -> AnalysisRecord {
        AnalysisRecord {
            id,
            timestamp: self.timestamp,
            diagnosis: self.diagnosis,
            image_filename: self.image_filename,
        }
    }
}

/// A stored analysis. Image bytes are never part of this value; fetch them
/// with [`RecordStore::get_image`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Store-assigned id.
    pub id: i64,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Normalized model output.
    #[serde(flatten)]
    pub diagnosis: Diagnosis,
    /// Original upload filename.
    pub image_filename: String,
}

/// Diseased-row counts per `disease_type`, highest count first.
///
/// Serializes as a JSON object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiseaseDistribution(pub Vec<(String, i64)>);

impl DiseaseDistribution {
    /// Count for one disease type.
    pub fn get(&self, disease_type: &str) -> Option<i64> {
        self.0
            .iter()
            .find(|(kind, _)| kind == disease_type)
            .map(|(_, count)| *count)
    }

    /// Number of distinct disease types.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no diseased rows exist.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for DiseaseDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (kind, count) in &self.0 {
            map.serialize_entry(kind, count)?;
        }
        map.end()
    }
}

/// Aggregate counts over the whole history table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisStats {
    /// Every stored row.
    pub total_analyses: i64,
    /// Rows with a detected disease.
    pub disease_detections: i64,
    /// Rows with no disease that are not `invalid_image`.
    pub healthy_plants: i64,
    /// Rows marked `invalid_image`.
    pub invalid_images: i64,
    /// Diseased rows grouped by type.
    pub disease_distribution: DiseaseDistribution,
}

/// Number of analyses stored on one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    /// Calendar day of the stored timestamps.
    pub date: NaiveDate,
    /// Analyses stored that day.
    pub count: i64,
}

/// Append-only analysis history store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new analysis with its optional image bytes, returning the
    /// assigned id.
    async fn insert(&self, analysis: &NewAnalysis, image: Option<&[u8]>) -> StorageResult<i64>;

    /// Most recent analyses first, without image bytes.
    async fn list_recent(&self, limit: u32) -> StorageResult<Vec<AnalysisRecord>>;

    /// Stored image bytes, `None` for an unknown id or a row without an image.
    async fn get_image(&self, id: i64) -> StorageResult<Option<Vec<u8>>>;

    /// Counts computed from a scan of the table.
    async fn aggregate_stats(&self) -> StorageResult<AnalysisStats>;

    /// Per-day analysis counts for the last `days` days (today included),
    /// oldest day first. Days without analyses are omitted.
    async fn daily_counts(&self, days: u32) -> StorageResult<Vec<DailyCount>>;

    /// Total number of stored analyses.
    async fn count(&self) -> StorageResult<i64>;
}

/// Default page size for history queries.
pub const DEFAULT_HISTORY_LIMIT: u32 = 10;

/// Largest page size accepted from callers.
pub const MAX_HISTORY_LIMIT: u32 = 500;

/// Window of the daily trend report, in days.
pub const DEFAULT_TREND_DAYS: u32 = 30;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_diagnosis() -> Diagnosis {
        Diagnosis {
            disease_detected: true,
            disease_name: Some("Leaf Rust".to_string()),
            disease_type: "fungal".to_string(),
            severity: Some(Severity::Mild),
            confidence: 72.5,
            symptoms: vec!["Orange pustules".to_string()],
            possible_causes: vec![],
            treatment: vec!["Remove infected leaves".to_string()],
        }
    }

    #[test]
    fn test_severity_round_trip() {
        for severity in [Severity::Mild, Severity::Moderate, Severity::Severe] {
            assert_eq!(severity.as_str().parse::<Severity>().unwrap(), severity);
        }
        assert_eq!(" SEVERE ".parse::<Severity>().unwrap(), Severity::Severe);
        assert!("critical".parse::<Severity>().is_err());
    }

    #[test]
    fn test_invalid_image_diagnosis() {
        let diagnosis = Diagnosis::invalid_image(vec!["blurry".to_string()], vec![]);
        assert!(diagnosis.is_invalid_image());
        assert!(!diagnosis.disease_detected);
        assert!(!diagnosis.is_healthy());
        assert_eq!(diagnosis.confidence, 0.0);
    }

    #[test]
    fn test_record_json_is_flat() {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        let record = NewAnalysis::new(sample_diagnosis(), "leaf.jpg")
            .with_timestamp(timestamp)
            .into_record(7);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["timestamp"], "2024-05-01T10:30:00Z");
        assert_eq!(value["disease_type"], "fungal");
        assert_eq!(value["severity"], "mild");
        assert_eq!(value["possible_causes"], json!([]));
        assert_eq!(value["image_filename"], "leaf.jpg");
        assert!(value.get("image_data").is_none());
        assert!(value.get("diagnosis").is_none());
    }

    #[test]
    fn test_new_analysis_truncates_to_micros() {
        let analysis = NewAnalysis::new(sample_diagnosis(), "a.jpg");
        assert_eq!(analysis.timestamp.timestamp_subsec_nanos() % 1000, 0);
    }

    #[test]
    fn test_distribution_keeps_order() {
        let distribution = DiseaseDistribution(vec![
            ("fungal".to_string(), 5),
            ("bacterial".to_string(), 2),
        ]);
        let text = serde_json::to_string(&distribution).unwrap();
        assert_eq!(text, r#"{"fungal":5,"bacterial":2}"#);
        assert_eq!(distribution.get("bacterial"), Some(2));
        assert_eq!(distribution.get("viral"), None);
    }

    #[test]
    fn test_stats_serialization() {
        let stats = AnalysisStats {
            total_analyses: 3,
            disease_detections: 1,
            healthy_plants: 1,
            invalid_images: 1,
            disease_distribution: DiseaseDistribution(vec![("pest".to_string(), 1)]),
        };
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            json!({
                "total_analyses": 3,
                "disease_detections": 1,
                "healthy_plants": 1,
                "invalid_images": 1,
                "disease_distribution": {"pest": 1}
            })
        );
    }
}
