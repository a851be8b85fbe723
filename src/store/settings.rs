use crate::api::ApiClient;
use crate::models::{RagModel, RagSettings, RagSettingsPatch};
use log::warn;
use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

pub fn available_models() -> Vec<ModelInfo> {
    RagModel::ALL
        .iter()
        .map(|m| ModelInfo {
            id: m.id().to_string(),
            name: m.label().to_string(),
        })
        .collect()
}

/// Client-held copy of the retrieval settings.
pub struct SettingsStore {
    client: ApiClient,
    current: Option<RagSettings>,
    error: Option<String>,
}

impl SettingsStore {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            current: None,
            error: None,
        }
    }

    /// Last loaded or saved settings, or the defaults before the first load.
    pub fn current(&self) -> RagSettings {
        self.current.clone().unwrap_or_default()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub async fn load(&mut self) -> bool {
        self.error = None;
        match self.client.get_settings().await.into_result() {
            Ok(settings) => {
                self.current = Some(settings);
                true
            }
            Err(e) => {
                warn!("Failed to load RAG settings: {}", e);
                self.error = Some(e);
                false
            }
        }
    }

    pub async fn save(&mut self, patch: RagSettingsPatch) -> bool {
        self.error = None;
        match self.client.update_settings(patch).await.into_result() {
            Ok(settings) => {
                self.current = Some(settings);
                true
            }
            Err(e) => {
                warn!("Failed to save RAG settings: {}", e);
                self.error = Some(e);
                false
            }
        }
    }
}
