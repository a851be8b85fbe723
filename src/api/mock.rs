use super::{Operation, Reply};
use crate::error::ApiError;
use crate::models::{
    ApiResponse, ChatMessage, Document, DocumentSource, DocumentStatus, RagSettings,
    RagSettingsPatch, Role,
};
use crate::upload::FileUpload;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;

const FINANCIAL_RESPONSE: &str = "Based on the documents, revenue increased by 12% in 2023 compared to the previous year. The company is financially stable and planning expansion into European markets.";
const PROJECT_RESPONSE: &str = "According to the Project Proposal document, the project timeline estimates completion within 8 months from approval.";
const NO_MATCH_RESPONSE: &str = "I couldn't find specific information about that in the uploaded documents. Could you please rephrase your question or upload more relevant documents?";

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Simulated round-trip time per operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockLatency {
    pub list: Duration,
    pub upload: Duration,
    pub delete: Duration,
    pub selection: Duration,
    pub settings: Duration,
    pub chat: Duration,
    /// Time between an upload returning and its status reaching completed.
    pub processing: Duration,
}

impl Default for MockLatency {
    fn default() -> Self {
        Self {
            list: Duration::from_millis(800),
            upload: Duration::from_millis(1500),
            delete: Duration::from_millis(600),
            selection: Duration::from_millis(300),
            settings: Duration::from_millis(300),
            chat: Duration::from_millis(1000),
            processing: Duration::from_millis(3000),
        }
    }
}

impl MockLatency {
    /// Short but non-zero delays, for tests.
    pub fn fast() -> Self {
        let tick = Duration::from_millis(1);
        Self {
            list: tick,
            upload: tick,
            delete: tick,
            selection: tick,
            settings: tick,
            chat: tick,
            processing: Duration::from_millis(30),
        }
    }
}

#[derive(Default)]
struct EngineState {
    documents: Mutex<Vec<Document>>,
    settings: Mutex<RagSettings>,
    pending: Mutex<HashMap<String, AbortHandle>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EngineState {
    /// Body of the delayed processing task.
    fn complete(&self, id: &str) {
        lock(&self.pending).remove(id);
        let mut documents = lock(&self.documents);
        match documents.iter_mut().find(|d| d.id == id) {
            Some(doc) => {
                if doc.advance_status(DocumentStatus::Completed) {
                    debug!("mock: document {} finished processing", id);
                }
            }
            // Deleted while processing. The task is not cancelled on delete,
            // so it lands here and does nothing.
            None => debug!("mock: document {} was removed before processing finished", id),
        }
    }
}

/// In-process stand-in for the backend. Clones share one registry; separate
/// `new` calls get independent ones.
#[derive(Clone)]
pub struct MockEngine {
    state: Arc<EngineState>,
    latency: MockLatency,
}

impl fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockEngine")
            .field("documents", &lock(&self.state.documents).len())
            .field("pending", &lock(&self.state.pending).len())
            .field("latency", &self.latency)
            .finish()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self::with_latency(MockLatency::default())
    }

    pub fn with_latency(latency: MockLatency) -> Self {
        Self::with_documents(latency, seed_documents())
    }

    pub fn with_documents(latency: MockLatency, documents: Vec<Document>) -> Self {
        let state = EngineState {
            documents: Mutex::new(documents),
            ..Default::default()
        };
        Self {
            state: Arc::new(state),
            latency,
        }
    }

    /// Current registry contents, without simulated latency.
    pub fn snapshot(&self) -> Vec<Document> {
        lock(&self.state.documents).clone()
    }

    /// Number of processing tasks that have not fired yet.
    pub fn pending_count(&self) -> usize {
        lock(&self.state.pending).len()
    }

    /// Abort every scheduled processing task. Affected documents stay in
    /// `processing`. Returns how many were cancelled.
    pub fn cancel_pending(&self) -> usize {
        let drained: Vec<(String, AbortHandle)> = lock(&self.state.pending).drain().collect();
        for (id, handle) in &drained {
            debug!("mock: cancelling processing of {}", id);
            handle.abort();
        }
        drained.len()
    }

    pub async fn list_documents(&self) -> ApiResponse<Vec<Document>> {
        self.handle_list().await.into()
    }

    pub async fn upload(&self, file: FileUpload) -> ApiResponse<Document> {
        self.handle_upload(file).await.into()
    }

    pub async fn delete(&self, id: &str) -> ApiResponse<()> {
        self.handle_delete(id).await.into()
    }

    pub async fn set_selection(&self, id: &str, selected: bool) -> ApiResponse<Document> {
        self.handle_selection(id, selected).await.into()
    }

    pub async fn get_settings(&self) -> ApiResponse<RagSettings> {
        self.handle_get_settings().await.into()
    }

    pub async fn update_settings(&self, patch: RagSettingsPatch) -> ApiResponse<RagSettings> {
        self.handle_update_settings(patch).await.into()
    }

    pub async fn chat(&self, message: &str) -> ApiResponse<ChatMessage> {
        self.handle_chat(message).await.into()
    }

    pub(crate) async fn dispatch(&self, op: Operation) -> Result<Reply, ApiError> {
        match op {
            Operation::ListDocuments => self.handle_list().await.map(Reply::Documents),
            Operation::UploadDocument(file) => self.handle_upload(file).await.map(Reply::Document),
            Operation::DeleteDocument { id } => self.handle_delete(&id).await.map(|_| Reply::Deleted),
            Operation::SetSelection { id, selected } => {
                self.handle_selection(&id, selected).await.map(Reply::Document)
            }
            Operation::GetSettings => self.handle_get_settings().await.map(Reply::Settings),
            Operation::UpdateSettings(patch) => {
                self.handle_update_settings(patch).await.map(Reply::Settings)
            }
            Operation::SendChat { message } => self.handle_chat(&message).await.map(Reply::Message),
        }
    }

    async fn handle_list(&self) -> Result<Vec<Document>, ApiError> {
        tokio::time::sleep(self.latency.list).await;
        Ok(self.snapshot())
    }

    async fn handle_upload(&self, file: FileUpload) -> Result<Document, ApiError> {
        tokio::time::sleep(self.latency.upload).await;
        let mime_type = if file.mime_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            file.mime_type.clone()
        };
        let doc = Document {
            id: uuid::Uuid::new_v4().to_string(),
            size: file.size(),
            name: file.name,
            mime_type,
            uploaded_at: chrono::Utc::now().to_rfc3339(),
            status: DocumentStatus::Processing,
            selected: false,
        };
        lock(&self.state.documents).push(doc.clone());
        self.schedule_completion(doc.id.clone());
        debug!("mock: uploaded {} as {}", doc.name, doc.id);
        Ok(doc)
    }

    /// Spawn the detached task that marks `id` completed after the processing
    /// delay. The task only holds a weak reference, so it is a no-op once the
    /// engine itself is gone.
    fn schedule_completion(&self, id: String) {
        let state: Weak<EngineState> = Arc::downgrade(&self.state);
        let delay = self.latency.processing;
        let task_id = id.clone();
        // Hold the table while spawning so the task cannot remove its entry
        // before it is inserted.
        let mut pending = lock(&self.state.pending);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match state.upgrade() {
                Some(state) => state.complete(&task_id),
                None => debug!("mock: engine dropped before {} finished processing", task_id),
            }
        });
        pending.insert(id, handle.abort_handle());
    }

    async fn handle_delete(&self, id: &str) -> Result<(), ApiError> {
        tokio::time::sleep(self.latency.delete).await;
        let mut documents = lock(&self.state.documents);
        let index = documents
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        documents.remove(index);
        Ok(())
    }

    async fn handle_selection(&self, id: &str, selected: bool) -> Result<Document, ApiError> {
        tokio::time::sleep(self.latency.selection).await;
        let mut documents = lock(&self.state.documents);
        let doc = documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        doc.selected = selected;
        Ok(doc.clone())
    }

    async fn handle_get_settings(&self) -> Result<RagSettings, ApiError> {
        tokio::time::sleep(self.latency.settings).await;
        Ok(lock(&self.state.settings).clone())
    }

    async fn handle_update_settings(&self, patch: RagSettingsPatch) -> Result<RagSettings, ApiError> {
        tokio::time::sleep(self.latency.settings).await;
        patch.validate()?;
        let mut settings = lock(&self.state.settings);
        let merged = settings.merge(&patch);
        *settings = merged;
        Ok(settings.clone())
    }

    async fn handle_chat(&self, message: &str) -> Result<ChatMessage, ApiError> {
        tokio::time::sleep(self.latency.chat).await;
        Ok(canned_reply(message))
    }
}

/// Keyword rules, checked in order: financial terms win over project terms.
fn canned_reply(message: &str) -> ChatMessage {
    let text = message.to_lowercase();
    if text.contains("revenue") || text.contains("financial") {
        ChatMessage::new(Role::Assistant, FINANCIAL_RESPONSE)
            .with_sources(vec![annual_report_source(), proposal_source()])
    } else if text.contains("project") || text.contains("timeline") {
        ChatMessage::new(Role::Assistant, PROJECT_RESPONSE).with_sources(vec![proposal_source()])
    } else {
        ChatMessage::new(Role::Assistant, NO_MATCH_RESPONSE)
    }
}

fn annual_report_source() -> DocumentSource {
    DocumentSource {
        document_id: "1".to_string(),
        document_name: "Annual Report 2023.pdf".to_string(),
        excerpts: vec![
            "According to our financial results, revenue increased by 12% in 2023 compared to the previous year.".to_string(),
            "The board approved a plan to expand operations into European markets by Q2 2024.".to_string(),
        ],
        relevance_score: 0.92,
    }
}

fn proposal_source() -> DocumentSource {
    DocumentSource {
        document_id: "2".to_string(),
        document_name: "Project Proposal.docx".to_string(),
        excerpts: vec![
            "The project timeline estimates completion within 8 months from approval.".to_string(),
        ],
        relevance_score: 0.75,
    }
}

fn seed_documents() -> Vec<Document> {
    let now = chrono::Utc::now();
    let seed = |id: &str, name: &str, mime: &str, size: u64, days_ago: i64, selected: bool| Document {
        id: id.to_string(),
        name: name.to_string(),
        mime_type: mime.to_string(),
        size,
        uploaded_at: (now - chrono::Duration::days(days_ago)).to_rfc3339(),
        status: DocumentStatus::Completed,
        selected,
    };
    vec![
        seed("1", "Annual Report 2023.pdf", "application/pdf", 1_250_000, 0, true),
        seed("2", "Project Proposal.docx", DOCX_MIME, 520_000, 1, true),
        seed("3", "Meeting Notes.txt", "text/plain", 15_000, 2, false),
    ]
}
