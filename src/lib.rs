pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod shell;
pub mod store;
pub mod upload;

use api::ApiClient;
use config::ClientConfig;
use shell::Shell;
use store::{ChatSession, DocumentStore, SettingsStore};

pub use error::{ApiError, ConfigError, ErrorKind};
pub use models::{
    ApiResponse, ChatMessage, Document, DocumentSource, DocumentStatus, RagModel, RagSettings,
    RagSettingsPatch, Role,
};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = ClientConfig::from_env()?;
    log::info!(
        "starting against {} ({:?}, fallback {})",
        config.base_url,
        config.mode,
        if config.mock_fallback { "on" } else { "off" }
    );
    let client = ApiClient::new(&config);

    let mut shell = Shell {
        documents: DocumentStore::new(client.clone()),
        chat: ChatSession::new(client.clone()),
        settings: SettingsStore::new(client),
    };
    shell.documents.refresh().await;
    shell.run().await?;
    Ok(())
}
