use crate::error::ConfigError;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMode {
    /// Talk to the backend over HTTP.
    Remote,
    /// Answer every call from the in-process mock engine.
    Mock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub mode: ApiMode,
    /// Answer from the mock engine when the backend cannot be reached.
    pub mock_fallback: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            mode: ApiMode::Remote,
            mock_fallback: false,
        }
    }
}

impl ClientConfig {
    /// Reads `RAG_API_URL`, `RAG_API_TIMEOUT_SECS`, `RAG_API_MODE` and
    /// `RAG_MOCK_FALLBACK`, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = ClientConfig::default();

        if let Some(url) = lookup("RAG_API_URL").filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(raw) = lookup("RAG_API_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    key: "RAG_API_TIMEOUT_SECS",
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: "RAG_API_TIMEOUT_SECS",
                    value: raw,
                    reason: "must be at least 1".to_string(),
                });
            }
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup("RAG_API_MODE") {
            config.mode = match raw.trim().to_lowercase().as_str() {
                "remote" | "" => ApiMode::Remote,
                "mock" => ApiMode::Mock,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "RAG_API_MODE",
                        value: raw,
                        reason: "expected `remote` or `mock`".to_string(),
                    })
                }
            };
        }

        if let Some(raw) = lookup("RAG_MOCK_FALLBACK") {
            config.mock_fallback = parse_flag("RAG_MOCK_FALLBACK", &raw)?;
        }

        log::debug!(
            "client config: base_url={} timeout={:?} mode={:?} fallback={}",
            config.base_url,
            config.timeout,
            config.mode,
            config.mock_fallback
        );
        Ok(config)
    }
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
