use crate::api::ApiClient;
use crate::models::{Document, DocumentStatus};
use crate::upload::FileUpload;
use log::{info, warn};
use tokio::sync::watch;

/// Everything an observer of the document list needs to render it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentsSnapshot {
    pub documents: Vec<Document>,
    /// Set only while `refresh` is in flight.
    pub loading: bool,
    /// Set only while `upload` is in flight.
    pub uploading: bool,
    /// Message of the last failed operation; cleared when the next one starts.
    pub error: Option<String>,
}

/// Client-side cache of the backend's documents.
///
/// Nothing is applied optimistically: every mutation waits for the backend to
/// confirm before touching the cache, and a failure leaves the cache as it was.
pub struct DocumentStore {
    client: ApiClient,
    state: DocumentsSnapshot,
    tx: watch::Sender<DocumentsSnapshot>,
}

impl DocumentStore {
    pub fn new(client: ApiClient) -> Self {
        let (tx, _) = watch::channel(DocumentsSnapshot::default());
        Self {
            client,
            state: DocumentsSnapshot::default(),
            tx,
        }
    }

    /// Receive a fresh snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<DocumentsSnapshot> {
        self.tx.subscribe()
    }

    pub fn documents(&self) -> &[Document] {
        &self.state.documents
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.state.documents.iter().find(|d| d.id == id)
    }

    pub fn loading(&self) -> bool {
        self.state.loading
    }

    pub fn uploading(&self) -> bool {
        self.state.uploading
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    /// Documents in retrieval scope: processed and selected.
    pub fn selected_documents(&self) -> Vec<&Document> {
        self.state
            .documents
            .iter()
            .filter(|d| d.selected && d.status == DocumentStatus::Completed)
            .collect()
    }

    /// Whether any document is still waiting on the backend, i.e. whether
    /// another `refresh` could change a status.
    pub fn has_processing(&self) -> bool {
        self.state
            .documents
            .iter()
            .any(|d| !d.status.is_terminal())
    }

    fn publish(&self) {
        self.tx.send_replace(self.state.clone());
    }

    fn begin(&mut self) {
        self.state.error = None;
    }

    fn fail(&mut self, context: &str, error: Option<String>) {
        let message = error.unwrap_or_else(|| "An unknown error occurred".to_string());
        warn!("{}: {}", context, message);
        self.state.error = Some(message);
    }

    /// Replace the cache with the backend's list. A status that the backend
    /// reports behind the cached one is ignored so observers never see it
    /// move backwards.
    pub async fn refresh(&mut self) -> bool {
        self.begin();
        self.state.loading = true;
        self.publish();

        let resp = self.client.list_documents().await;
        let ok = match resp.into_result() {
            Ok(mut incoming) => {
                for doc in incoming.iter_mut() {
                    if let Some(cached) = self.get(&doc.id) {
                        if !cached.status.can_advance_to(doc.status) {
                            warn!(
                                "ignoring status regression for {}: {:?} -> {:?}",
                                doc.id, cached.status, doc.status
                            );
                            doc.status = cached.status;
                        }
                    }
                }
                self.state.documents = incoming;
                true
            }
            Err(e) => {
                self.fail("Error loading documents", Some(e));
                false
            }
        };

        self.state.loading = false;
        self.publish();
        ok
    }

    pub async fn upload(&mut self, file: FileUpload) -> Option<Document> {
        self.begin();
        self.state.uploading = true;
        self.publish();

        let name = file.name.clone();
        let resp = self.client.upload_document(file).await;
        let uploaded = match resp.into_result() {
            Ok(doc) => {
                info!("uploaded {} as {} ({:?})", name, doc.id, doc.status);
                self.state.documents.push(doc.clone());
                Some(doc)
            }
            Err(e) => {
                self.fail("Error uploading document", Some(e));
                None
            }
        };

        self.state.uploading = false;
        self.publish();
        uploaded
    }

    /// Remove a document once the backend has deleted it.
    pub async fn remove(&mut self, id: &str) -> bool {
        self.begin();
        self.publish();

        let resp = self.client.delete_document(id).await;
        let ok = if resp.success {
            self.state.documents.retain(|d| d.id != id);
            info!("deleted document {}", id);
            true
        } else {
            self.fail("Error deleting document", resp.error);
            false
        };
        self.publish();
        ok
    }

    /// Flip the selection of a cached document. Unknown ids are ignored.
    pub async fn toggle_selection(&mut self, id: &str) -> bool {
        let Some(selected) = self.get(id).map(|d| d.selected) else {
            return false;
        };
        self.begin();
        self.publish();

        let resp = self.client.set_selection(id, !selected).await;
        let ok = if resp.success && resp.data.is_some() {
            if let Some(doc) = self.state.documents.iter_mut().find(|d| d.id == id) {
                doc.selected = !selected;
            }
            true
        } else {
            self.fail("Error updating document", resp.error);
            false
        };
        self.publish();
        ok
    }
}
