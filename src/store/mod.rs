pub mod chat;
pub mod documents;
pub mod settings;

pub use chat::{ChatSession, PendingReply};
pub use documents::{DocumentStore, DocumentsSnapshot};
pub use settings::{available_models, ModelInfo, SettingsStore};
