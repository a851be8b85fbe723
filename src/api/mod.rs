pub mod http;
pub mod mock;

use crate::config::{ApiMode, ClientConfig};
use crate::error::ApiError;
use crate::models::{ApiResponse, ChatMessage, Document, RagSettings, RagSettingsPatch};
use crate::upload::FileUpload;
use log::{info, warn};
use reqwest::Method;
use serde_json::{json, Value};

pub use self::http::HttpBackend;
pub use self::mock::{MockEngine, MockLatency};

/// Every capability the backend offers. The HTTP backend and the mock engine
/// both consume the same value, so fallback never has to re-derive the call.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    ListDocuments,
    UploadDocument(FileUpload),
    DeleteDocument { id: String },
    SetSelection { id: String, selected: bool },
    GetSettings,
    UpdateSettings(RagSettingsPatch),
    SendChat { message: String },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ListDocuments => "list_documents",
            Operation::UploadDocument(_) => "upload_document",
            Operation::DeleteDocument { .. } => "delete_document",
            Operation::SetSelection { .. } => "set_selection",
            Operation::GetSettings => "get_settings",
            Operation::UpdateSettings(_) => "update_settings",
            Operation::SendChat { .. } => "send_chat",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Operation::ListDocuments | Operation::GetSettings => Method::GET,
            Operation::UploadDocument(_) | Operation::SendChat { .. } => Method::POST,
            Operation::DeleteDocument { .. } => Method::DELETE,
            Operation::SetSelection { .. } | Operation::UpdateSettings(_) => Method::PUT,
        }
    }

    /// Path segments below the base address; ids are pushed as single
    /// segments so they get percent-encoded.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Operation::ListDocuments | Operation::UploadDocument(_) => vec!["documents"],
            Operation::DeleteDocument { id } => vec!["documents", id.as_str()],
            Operation::SetSelection { id, .. } => vec!["documents", id.as_str(), "selection"],
            Operation::GetSettings | Operation::UpdateSettings(_) => vec!["rag-settings"],
            Operation::SendChat { .. } => vec!["chat"],
        }
    }

    /// JSON request body. Uploads are multipart and return `None` here.
    pub fn json_body(&self) -> Option<Value> {
        match self {
            Operation::SetSelection { selected, .. } => Some(json!({ "selected": selected })),
            Operation::UpdateSettings(patch) => serde_json::to_value(patch).ok(),
            Operation::SendChat { message } => Some(json!({ "message": message })),
            _ => None,
        }
    }

    /// Interpret the envelope's `data` field for this operation.
    pub fn decode(&self, data: Option<Value>) -> Result<Reply, ApiError> {
        if let Operation::DeleteDocument { .. } = self {
            return Ok(Reply::Deleted);
        }
        let data = data.ok_or_else(|| {
            ApiError::Malformed(format!("{} response is missing data", self.name()))
        })?;
        let parsed = match self {
            Operation::ListDocuments => serde_json::from_value(data).map(Reply::Documents),
            Operation::UploadDocument(_) | Operation::SetSelection { .. } => {
                serde_json::from_value(data).map(Reply::Document)
            }
            Operation::GetSettings | Operation::UpdateSettings(_) => {
                serde_json::from_value(data).map(Reply::Settings)
            }
            Operation::SendChat { .. } => serde_json::from_value::<ChatMessage>(data)
                .map(|m| Reply::Message(m.normalize())),
            Operation::DeleteDocument { .. } => Ok(Reply::Deleted),
        };
        parsed.map_err(|e| ApiError::Malformed(format!("{}: {}", self.name(), e)))
    }
}

/// Typed payload of a successful operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Documents(Vec<Document>),
    Document(Document),
    Deleted,
    Settings(RagSettings),
    Message(ChatMessage),
}

#[derive(Debug, Clone)]
enum Backend {
    Remote(HttpBackend),
    Mock(MockEngine),
}

/// Request client. Every method resolves to an envelope; nothing is raised
/// past this boundary.
#[derive(Debug, Clone)]
pub struct ApiClient {
    backend: Backend,
    fallback: Option<MockEngine>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_engine(config, MockEngine::new())
    }

    /// Like [`ApiClient::new`] but with a caller-owned engine for mock mode
    /// and fallback.
    pub fn with_engine(config: &ClientConfig, engine: MockEngine) -> Self {
        match config.mode {
            ApiMode::Mock => Self::mock(engine),
            ApiMode::Remote => Self {
                backend: Backend::Remote(HttpBackend::new(&config.base_url, config.timeout)),
                fallback: config.mock_fallback.then_some(engine),
            },
        }
    }

    pub fn mock(engine: MockEngine) -> Self {
        Self {
            backend: Backend::Mock(engine),
            fallback: None,
        }
    }

    /// The engine answering calls, either directly or as fallback.
    pub fn engine(&self) -> Option<&MockEngine> {
        match &self.backend {
            Backend::Mock(engine) => Some(engine),
            Backend::Remote(_) => self.fallback.as_ref(),
        }
    }

    pub async fn list_documents(&self) -> ApiResponse<Vec<Document>> {
        self.call_as(Operation::ListDocuments, |r| match r {
            Reply::Documents(docs) => Some(docs),
            _ => None,
        })
        .await
    }

    pub async fn upload_document(&self, file: FileUpload) -> ApiResponse<Document> {
        self.call_as(Operation::UploadDocument(file), |r| match r {
            Reply::Document(doc) => Some(doc),
            _ => None,
        })
        .await
    }

    pub async fn delete_document(&self, id: &str) -> ApiResponse<()> {
        self.call_as(Operation::DeleteDocument { id: id.to_string() }, |r| match r {
            Reply::Deleted => Some(()),
            _ => None,
        })
        .await
    }

    pub async fn set_selection(&self, id: &str, selected: bool) -> ApiResponse<Document> {
        let op = Operation::SetSelection {
            id: id.to_string(),
            selected,
        };
        self.call_as(op, |r| match r {
            Reply::Document(doc) => Some(doc),
            _ => None,
        })
        .await
    }

    pub async fn get_settings(&self) -> ApiResponse<RagSettings> {
        self.call_as(Operation::GetSettings, |r| match r {
            Reply::Settings(settings) => Some(settings),
            _ => None,
        })
        .await
    }

    pub async fn update_settings(&self, patch: RagSettingsPatch) -> ApiResponse<RagSettings> {
        if let Err(e) = patch.validate() {
            warn!("update_settings rejected before sending: {}", e);
            return ApiResponse::failure(e.to_string());
        }
        self.call_as(Operation::UpdateSettings(patch), |r| match r {
            Reply::Settings(settings) => Some(settings),
            _ => None,
        })
        .await
    }

    pub async fn send_chat(&self, message: &str) -> ApiResponse<ChatMessage> {
        let op = Operation::SendChat {
            message: message.to_string(),
        };
        self.call_as(op, |r| match r {
            Reply::Message(msg) => Some(msg),
            _ => None,
        })
        .await
    }

    async fn call_as<T>(&self, op: Operation, pick: impl FnOnce(Reply) -> Option<T>) -> ApiResponse<T> {
        let name = op.name();
        let result = self.call(op).await.and_then(|reply| {
            pick(reply).ok_or_else(|| ApiError::Malformed(format!("unexpected reply to {}", name)))
        });
        if let Err(e) = &result {
            warn!("{} failed: {}", name, e);
        }
        result.into()
    }

    async fn call(&self, op: Operation) -> Result<Reply, ApiError> {
        match &self.backend {
            Backend::Mock(engine) => engine.dispatch(op).await,
            Backend::Remote(http) => match http.execute(&op).await {
                Err(e) if e.is_unreachable() => match &self.fallback {
                    Some(engine) => {
                        info!("{} falling back to mock engine: {}", op.name(), e);
                        engine.dispatch(op).await
                    }
                    None => Err(e),
                },
                other => other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RagModel, Role};
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn refused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    /// Accepts connections and never answers them.
    async fn silent_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    fn remote(base_url: String, fallback: bool) -> ApiClient {
        let config = ClientConfig {
            base_url,
            timeout: Duration::from_millis(300),
            mode: ApiMode::Remote,
            mock_fallback: fallback,
        };
        ApiClient::with_engine(&config, MockEngine::with_latency(MockLatency::fast()))
    }

    #[tokio::test]
    async fn test_engine_only_when_it_can_answer() {
        let engine = MockEngine::with_latency(MockLatency::fast());
        let mocked = ApiClient::mock(engine.clone());
        mocked.delete_document("1").await;
        let seen = mocked.engine().unwrap().snapshot();
        assert_eq!(seen.len(), 2);
        assert_eq!(engine.snapshot(), seen);

        assert!(remote(refused_url().await, false).engine().is_none());
        assert!(remote(refused_url().await, true).engine().is_some());
    }

    #[test]
    fn test_operation_routes() {
        let op = Operation::SetSelection {
            id: "42".into(),
            selected: true,
        };
        assert_eq!(op.method(), Method::PUT);
        assert_eq!(op.segments(), vec!["documents", "42", "selection"]);
        assert_eq!(op.json_body(), Some(json!({ "selected": true })));

        let upload = Operation::UploadDocument(FileUpload::new("a.txt", "text/plain", vec![1]));
        assert_eq!(upload.method(), Method::POST);
        assert!(upload.json_body().is_none());
    }

    #[test]
    fn test_decode_requires_data() {
        let err = Operation::ListDocuments.decode(None).unwrap_err();
        assert!(matches!(err, ApiError::Malformed(_)));
        let deleted = Operation::DeleteDocument { id: "1".into() }.decode(None).unwrap();
        assert_eq!(deleted, Reply::Deleted);
    }

    #[tokio::test]
    async fn test_mock_mode_answers_locally() {
        let client = ApiClient::mock(MockEngine::with_latency(MockLatency::fast()));
        let docs = client.list_documents().await.into_result().unwrap();
        assert_eq!(docs.len(), 3);
        let reply = client.send_chat("What was our revenue?").await.into_result().unwrap();
        assert_eq!(reply.role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_unreachable_without_fallback_fails() {
        let client = remote(refused_url().await, false);
        let resp = client.list_documents().await;
        assert!(!resp.success);
        assert!(resp.data.is_none());
        assert!(resp.error.unwrap().starts_with("Cannot reach backend"));
    }

    #[tokio::test]
    async fn test_unreachable_with_fallback_uses_mock() {
        let client = remote(refused_url().await, true);
        let resp = client.delete_document("nonexistent-id").await;
        assert_eq!(resp, ApiResponse::failure("Document not found"));
        let docs = client.list_documents().await.into_result().unwrap();
        assert_eq!(docs.len(), 3);
    }

    #[tokio::test]
    async fn test_timeout_without_fallback_fails() {
        let client = remote(silent_url().await, false);
        let resp = client.list_documents().await;
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_with_fallback_uses_mock() {
        let client = remote(silent_url().await, true);
        let resp = client.send_chat("What was our revenue?").await;
        assert!(resp.success);
        let msg = resp.data.unwrap();
        let scores: Vec<f32> = msg
            .sources
            .unwrap()
            .iter()
            .map(|s| s.relevance_score)
            .collect();
        assert_eq!(scores, vec![0.92, 0.75]);
    }

    #[tokio::test]
    async fn test_invalid_settings_never_sent() {
        // Fallback is off and the address is unreachable, so a validation
        // message proves nothing went over the wire.
        let client = remote(refused_url().await, false);
        let patch = RagSettingsPatch {
            temperature: Some(2.5),
            model: Some(RagModel::Gpt4o),
            ..Default::default()
        };
        let resp = client.update_settings(patch).await;
        assert!(!resp.success);
        assert!(resp.error.unwrap().starts_with("Invalid temperature"));
    }
}
