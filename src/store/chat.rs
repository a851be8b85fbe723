use crate::api::ApiClient;
use crate::models::{ApiResponse, ChatMessage, Role};
use futures::stream::{FuturesUnordered, StreamExt};
use log::warn;

pub const WELCOME_MESSAGE: &str = "Hello! I'm your document assistant. Ask me questions about your uploaded documents, and I'll use RAG technology to provide relevant answers.";
pub const APOLOGY_MESSAGE: &str =
    "I'm sorry, there was an error processing your request. Please try again.";

const TITLE_LIMIT: usize = 50;

/// A chat request that has been submitted but not yet answered. Owns its own
/// client handle, so it can be awaited anywhere, including after other
/// submissions on the same session.
#[must_use = "a pending reply does nothing until awaited and resolved"]
pub struct PendingReply {
    client: ApiClient,
    message: String,
}

impl PendingReply {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub async fn wait(self) -> ApiResponse<ChatMessage> {
        self.client.send_chat(&self.message).await
    }
}

/// Append-only conversation log.
pub struct ChatSession {
    id: String,
    title: Option<String>,
    created_at: i64,
    updated_at: i64,
    messages: Vec<ChatMessage>,
    client: ApiClient,
    pending: usize,
    last_error: Option<String>,
}

impl ChatSession {
    pub fn new(client: ApiClient) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let mut session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: None,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            client,
            pending: 0,
            last_error: None,
        };
        session.ensure_seeded();
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Derived from the first user message.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of submitted messages still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn loading(&self) -> bool {
        self.pending > 0
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Put the welcome message back if the log is empty.
    pub fn ensure_seeded(&mut self) {
        if self.messages.is_empty() {
            self.push(ChatMessage::new(Role::System, WELCOME_MESSAGE));
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.title = None;
        self.last_error = None;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    fn push(&mut self, message: ChatMessage) {
        self.updated_at = message.timestamp.max(self.updated_at);
        self.messages.push(message);
    }

    /// Append the user's message and hand back the request for its reply.
    /// Blank input is ignored.
    pub fn submit(&mut self, text: &str) -> Option<PendingReply> {
        if text.trim().is_empty() {
            return None;
        }
        self.ensure_seeded();
        if self.title.is_none() {
            self.title = Some(make_title(text));
        }
        self.last_error = None;
        self.push(ChatMessage::new(Role::User, text));
        self.pending += 1;
        Some(PendingReply {
            client: self.client.clone(),
            message: text.to_string(),
        })
    }

    /// Append the outcome of a pending reply: the assistant's answer, or a
    /// system apology if the request failed.
    pub fn resolve(&mut self, response: ApiResponse<ChatMessage>) {
        self.pending = self.pending.saturating_sub(1);
        match response.into_result() {
            Ok(reply) => self.push(reply),
            Err(e) => {
                warn!("chat request failed: {}", e);
                self.last_error = Some(e);
                self.push(ChatMessage::new(Role::System, APOLOGY_MESSAGE));
            }
        }
    }

    /// Submit and wait. Returns false when `text` is blank.
    pub async fn send(&mut self, text: &str) -> bool {
        let Some(pending) = self.submit(text) else {
            return false;
        };
        let response = pending.wait().await;
        self.resolve(response);
        true
    }

    /// Submit several messages at once. User messages are appended in input
    /// order; replies are appended as they arrive, which need not match.
    /// Returns how many were accepted.
    pub async fn send_concurrent(&mut self, texts: &[&str]) -> usize {
        let mut in_flight: FuturesUnordered<_> = texts
            .iter()
            .filter_map(|text| self.submit(text))
            .map(PendingReply::wait)
            .collect();
        let accepted = in_flight.len();
        while let Some(response) = in_flight.next().await {
            self.resolve(response);
        }
        accepted
    }
}

fn make_title(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= TITLE_LIMIT {
        return text.to_string();
    }
    let cut: String = text.chars().take(TITLE_LIMIT).collect();
    format!("{}...", cut.trim_end())
}
