use crate::normalization::{CedulaKind, SearchType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============ Stored documents ============

/// A row of `registry.documents`. `data` has no fixed schema.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredDocument {
    pub id: Uuid,
    pub collection: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredDocument {
    /// The document as exported: its data with `_id` set to the row id.
    pub fn to_export_value(&self) -> Value {
        let mut value = self.data.clone();
        if let Value::Object(ref mut map) = value {
            map.insert("_id".to_string(), Value::String(self.id.to_string()));
        }
        value
    }
}

// ============ Search ============

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQueryParams {
    pub q: Option<String>,
}

/// One search hit, tagged with the collection it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Human readable collection label, e.g. `Personas Fisicas`.
    pub tipo: String,
    pub coleccion: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total_found: usize,
    pub search_time_ms: u64,
    pub query: String,
    pub search_type: SearchType,
    /// Collections whose query failed and were left out of `results`.
    pub skipped_collections: Vec<String>,
}

/// Hits about the same cedula merged across collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub cedula: String,
    pub tipo_cedula: Option<CedulaKind>,
    /// Seen in at least two collections.
    pub cedula_verificada: bool,
    pub fuentes: Vec<String>,
    pub total_fuentes: usize,
    pub nombres: Vec<String>,
    pub emails: Vec<String>,
    pub telefonos: Vec<String>,
    pub direcciones: Vec<String>,
    pub registros: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesResponse {
    pub query: String,
    pub search_type: SearchType,
    pub total_profiles: usize,
    pub profiles: Vec<Profile>,
    pub total_raw_records: usize,
    pub skipped_collections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CedulaLookupResponse {
    pub cedula: String,
    pub tipo_cedula: Option<CedulaKind>,
    pub total_found: usize,
    pub results: Vec<SearchHit>,
}

// ============ Health and statistics ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub database_name: String,
    pub primary_collection: String,
    pub total_records: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CollectionCount {
    pub collection: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SourceCount {
    pub fuente: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_records: i64,
    pub collections: Vec<CollectionCount>,
    pub sources: Vec<SourceCount>,
    pub generated_at: DateTime<Utc>,
}

// ============ Record store operations ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertReport {
    pub received: usize,
    pub inserted: usize,
    pub rejected: usize,
    /// Rows skipped because a unique index already held the key.
    pub duplicates: usize,
    /// First few rejection reasons, for the caller to inspect.
    pub rejections: Vec<String>,
}

impl InsertReport {
    pub const MAX_REJECTION_MESSAGES: usize = 20;

    pub fn reject(&mut self, reason: String) {
        self.rejected += 1;
        if self.rejections.len() < Self::MAX_REJECTION_MESSAGES {
            self.rejections.push(reason);
        }
    }

    pub fn absorb(&mut self, other: InsertReport) {
        self.received += other.received;
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.rejected += other.rejected;
        for reason in other.rejections {
            if self.rejections.len() < Self::MAX_REJECTION_MESSAGES {
                self.rejections.push(reason);
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InsertRequest {
    pub fuente: String,
    pub records: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupRequest {
    pub field: String,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupReport {
    pub collection: String,
    pub field: String,
    pub duplicate_groups: i64,
    pub documents_removed: i64,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UniqueIndexRequest {
    pub field: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrichByKeyRequest {
    pub field: String,
    pub value: String,
    pub patch: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichByKeyResponse {
    pub collection: String,
    pub field: String,
    pub matched: u64,
}

// ============ Admin ============

#[derive(Debug, Clone, Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminLoginResponse {
    pub success: bool,
    pub token: String,
    pub expires_in_secs: u64,
}

// ============ Import tasks ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportRequest {
    pub collection: String,
    pub fuente: String,
    pub records: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportTask {
    pub task_id: Uuid,
    pub collection: String,
    pub fuente: String,
    pub status: TaskStatus,
    pub records_received: i64,
    pub records_inserted: i64,
    pub records_rejected: i64,
    pub records_duplicate: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress_percentage: f64,
}

impl ImportTask {
    pub fn pending(collection: &str, fuente: &str, records_received: usize) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            collection: collection.to_string(),
            fuente: fuente.to_string(),
            status: TaskStatus::Pending,
            records_received: records_received as i64,
            records_inserted: 0,
            records_rejected: 0,
            records_duplicate: 0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress_percentage: 0.0,
        }
    }
}

/// Row shape of `registry.ingest_runs`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestRunRow {
    pub task_id: Uuid,
    pub collection: String,
    pub fuente: String,
    pub status: String,
    pub records_received: i64,
    pub records_inserted: i64,
    pub records_rejected: i64,
    pub records_duplicate: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<IngestRunRow> for ImportTask {
    fn from(row: IngestRunRow) -> Self {
        let status = TaskStatus::parse(&row.status).unwrap_or(TaskStatus::Failed);
        let processed = row.records_inserted + row.records_rejected + row.records_duplicate;
        let progress_percentage = if status.is_finished() {
            100.0
        } else if row.records_received > 0 {
            (processed as f64 / row.records_received as f64) * 100.0
        } else {
            0.0
        };
        Self {
            task_id: row.task_id,
            collection: row.collection,
            fuente: row.fuente,
            status,
            records_received: row.records_received,
            records_inserted: row.records_inserted,
            records_rejected: row.records_rejected,
            records_duplicate: row.records_duplicate,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            progress_percentage,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportAccepted {
    pub task_id: Uuid,
    pub records_queued: usize,
    pub message: String,
}

// ============ Geocoding ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: String,
}

/// Subset of the Google Geocoding API response that we read.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleGeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GoogleGeocodeResult>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleGeocodeResult {
    pub formatted_address: String,
    pub geometry: GoogleGeometry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleGeometry {
    pub location: GoogleLatLng,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleLatLng {
    pub lat: f64,
    pub lng: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_round_trips_through_text() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("cancelled"), None);
    }

    #[test]
    fn ingest_row_progress() {
        let row = IngestRunRow {
            task_id: Uuid::new_v4(),
            collection: "personas_fisicas".into(),
            fuente: "padron".into(),
            status: "in_progress".into(),
            records_received: 200,
            records_inserted: 40,
            records_rejected: 10,
            records_duplicate: 0,
            error_message: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: None,
        };
        let task: ImportTask = row.into();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!((task.progress_percentage - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn insert_report_caps_messages() {
        let mut report = InsertReport::default();
        for i in 0..30 {
            report.reject(format!("record {} is not an object", i));
        }
        assert_eq!(report.rejected, 30);
        assert_eq!(report.rejections.len(), InsertReport::MAX_REJECTION_MESSAGES);
    }

    #[test]
    fn export_value_carries_row_id() {
        let doc = StoredDocument {
            id: Uuid::nil(),
            collection: "personas_fisicas".into(),
            data: serde_json::json!({"cedula": "1-2345-6789"}),
            created_at: Utc::now(),
            updated_at: None,
        };
        let exported = doc.to_export_value();
        assert_eq!(exported["_id"], Uuid::nil().to_string());
        assert_eq!(exported["cedula"], "1-2345-6789");
    }
}
