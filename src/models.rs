use crate::error::ApiError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl DocumentStatus {
    fn rank(self) -> u8 {
        match self {
            DocumentStatus::Pending => 0,
            DocumentStatus::Processing => 1,
            DocumentStatus::Completed | DocumentStatus::Error => 2,
        }
    }

    /// Statuses only move forward: pending -> processing -> {completed, error}.
    /// Staying put is allowed; a terminal status never changes.
    pub fn can_advance_to(self, next: DocumentStatus) -> bool {
        if self == next {
            return true;
        }
        self.rank() < next.rank()
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub uploaded_at: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub selected: bool,
}

impl Document {
    /// Applies `next` if it does not move the status backwards. Returns whether
    /// the status changed.
    pub fn advance_status(&mut self, next: DocumentStatus) -> bool {
        if self.status == next || !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        true
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<DocumentSource>>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            sources: None,
        }
    }

    pub fn with_sources(mut self, sources: Vec<DocumentSource>) -> Self {
        self.sources = Some(sources);
        self
    }

    /// Drops an empty source list and clamps out-of-range scores so everything
    /// past the decoder sees well-formed sources.
    pub(crate) fn normalize(mut self) -> Self {
        if let Some(sources) = self.sources.take() {
            let sources: Vec<DocumentSource> = sources
                .into_iter()
                .map(DocumentSource::clamped)
                .collect();
            if !sources.is_empty() {
                self.sources = Some(sources);
            }
        }
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSource {
    pub document_id: String,
    pub document_name: String,
    pub excerpts: Vec<String>,
    pub relevance_score: f32,
}

impl DocumentSource {
    fn clamped(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.relevance_score) {
            log::warn!(
                "relevance score {} for document {} is out of range, clamping",
                self.relevance_score,
                self.document_id
            );
            self.relevance_score = if self.relevance_score.is_nan() {
                0.0
            } else {
                self.relevance_score.clamp(0.0, 1.0)
            };
        }
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum RagModel {
    #[default]
    #[serde(rename = "gpt-3.5-turbo-0125")]
    Gpt35Turbo,
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
}

impl RagModel {
    pub const ALL: [RagModel; 3] = [RagModel::Gpt35Turbo, RagModel::Gpt4oMini, RagModel::Gpt4o];

    pub fn id(self) -> &'static str {
        match self {
            RagModel::Gpt35Turbo => "gpt-3.5-turbo-0125",
            RagModel::Gpt4oMini => "gpt-4o-mini",
            RagModel::Gpt4o => "gpt-4o",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RagModel::Gpt35Turbo => "GPT-3.5 Turbo (Latest)",
            RagModel::Gpt4oMini => "GPT-4o Mini",
            RagModel::Gpt4o => "GPT-4o",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RagSettings {
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub retrieval_k: u32,
    pub temperature: f32,
    pub model: RagModel,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            retrieval_k: 4,
            temperature: 0.0,
            model: RagModel::default(),
        }
    }
}

impl RagSettings {
    pub fn merge(&self, patch: &RagSettingsPatch) -> RagSettings {
        RagSettings {
            chunk_size: patch.chunk_size.unwrap_or(self.chunk_size),
            chunk_overlap: patch.chunk_overlap.unwrap_or(self.chunk_overlap),
            retrieval_k: patch.retrieval_k.unwrap_or(self.retrieval_k),
            temperature: patch.temperature.unwrap_or(self.temperature),
            model: patch.model.unwrap_or(self.model),
        }
    }
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RagSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_overlap: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<RagModel>,
}

impl RagSettingsPatch {
    pub fn validate(&self) -> Result<(), ApiError> {
        check_range("chunk_size", self.chunk_size.map(f64::from), 100.0, 8000.0)?;
        check_range("chunk_overlap", self.chunk_overlap.map(f64::from), 0.0, 500.0)?;
        check_range("retrieval_k", self.retrieval_k.map(f64::from), 1.0, 20.0)?;
        check_range("temperature", self.temperature.map(f64::from), 0.0, 2.0)?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: Option<f64>, min: f64, max: f64) -> Result<(), ApiError> {
    match value {
        Some(value) if !(min..=max).contains(&value) => Err(ApiError::Validation {
            field,
            value,
            min,
            max,
        }),
        _ => Ok(()),
    }
}

/// Uniform result wrapper returned by every client, engine, and store call.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err("Response is missing data".to_string()),
            (false, _) => Err(self
                .error
                .unwrap_or_else(|| "An unknown error occurred".to_string())),
        }
    }
}

impl<T> From<Result<T, ApiError>> for ApiResponse<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(data) => ApiResponse::ok(data),
            Err(e) => ApiResponse::failure(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(status: DocumentStatus) -> Document {
        Document {
            id: "d1".into(),
            name: "notes.txt".into(),
            mime_type: "text/plain".into(),
            size: 10,
            uploaded_at: "2024-01-01T00:00:00Z".into(),
            status,
            selected: false,
        }
    }

    #[test]
    fn test_status_never_regresses() {
        let mut d = doc(DocumentStatus::Pending);
        assert!(d.advance_status(DocumentStatus::Processing));
        assert!(!d.advance_status(DocumentStatus::Pending));
        assert!(d.advance_status(DocumentStatus::Completed));
        assert!(!d.advance_status(DocumentStatus::Processing));
        assert!(!d.advance_status(DocumentStatus::Error));
        assert_eq!(d.status, DocumentStatus::Completed);
    }

    #[test]
    fn test_pending_may_fail_directly() {
        let mut d = doc(DocumentStatus::Pending);
        assert!(d.advance_status(DocumentStatus::Error));
        assert!(d.status.is_terminal());
    }

    #[test]
    fn test_document_wire_shape() {
        let json = serde_json::to_value(doc(DocumentStatus::Processing)).unwrap();
        assert_eq!(json["type"], "text/plain");
        assert_eq!(json["uploadedAt"], "2024-01-01T00:00:00Z");
        assert_eq!(json["status"], "processing");
    }

    #[test]
    fn test_empty_sources_are_dropped() {
        let raw = r#"{"id":"m","role":"assistant","content":"hi","timestamp":1,"sources":[]}"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        assert!(msg.normalize().sources.is_none());
    }

    #[test]
    fn test_scores_are_clamped() {
        let msg = ChatMessage::new(Role::Assistant, "x").with_sources(vec![
            DocumentSource {
                document_id: "1".into(),
                document_name: "a".into(),
                excerpts: vec!["e".into()],
                relevance_score: 1.4,
            },
            DocumentSource {
                document_id: "2".into(),
                document_name: "b".into(),
                excerpts: vec!["e".into()],
                relevance_score: -0.2,
            },
        ]);
        let scores: Vec<f32> = msg
            .normalize()
            .sources
            .unwrap()
            .iter()
            .map(|s| s.relevance_score)
            .collect();
        assert_eq!(scores, vec![1.0, 0.0]);
    }

    #[test]
    fn test_settings_merge_and_validate() {
        let patch = RagSettingsPatch {
            retrieval_k: Some(8),
            model: Some(RagModel::Gpt4o),
            ..Default::default()
        };
        assert!(patch.validate().is_ok());
        let merged = RagSettings::default().merge(&patch);
        assert_eq!(merged.retrieval_k, 8);
        assert_eq!(merged.chunk_size, 1000);
        assert_eq!(merged.model, RagModel::Gpt4o);

        let bad = RagSettingsPatch {
            chunk_overlap: Some(501),
            ..Default::default()
        };
        let err = bad.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_model_wire_ids() {
        let json = serde_json::to_string(&RagSettings::default()).unwrap();
        assert!(json.contains("\"model\":\"gpt-3.5-turbo-0125\""));
        assert_eq!(RagModel::from_id("gpt-4o-mini"), Some(RagModel::Gpt4oMini));
        assert_eq!(RagModel::from_id("gpt-5"), None);
    }

    #[test]
    fn test_envelope_conversion() {
        let ok: ApiResponse<u32> = Ok(3).into();
        assert!(ok.success && ok.error.is_none());
        let failed: ApiResponse<u32> = Err(ApiError::NotFound("x".into())).into();
        assert_eq!(failed.data, None);
        assert_eq!(failed.error.as_deref(), Some("Document not found"));
        assert_eq!(failed.into_result(), Err("Document not found".to_string()));
    }
}
