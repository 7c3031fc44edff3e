use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HearthError, Result};

/// Top-level configuration for Hearth.
///
/// Loaded from `~/.hearth/config.toml` by default. Every section falls back
/// to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HearthConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl HearthConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: HearthConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing,
    /// unreadable or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| HearthError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(3..=5).contains(&self.search.top_k) {
            return Err(HearthError::Config(format!(
                "search.top_k must be between 3 and 5, got {}",
                self.search.top_k
            )));
        }
        if !(0.0..=1.0).contains(&self.search.fuzzy_threshold) {
            return Err(HearthError::Config(format!(
                "search.fuzzy_threshold must be within [0, 1], got {}",
                self.search.fuzzy_threshold
            )));
        }
        if self.search.full_text_limit == 0 {
            return Err(HearthError::Config(
                "search.full_text_limit must be positive".to_string(),
            ));
        }
        if self.chat.max_message_length == 0 {
            return Err(HearthError::Config(
                "chat.max_message_length must be positive".to_string(),
            ));
        }
        if self.chat.composer_timeout_ms == 0 {
            return Err(HearthError::Config(
                "chat.composer_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the catalog database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.hearth/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Catalog storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file name, relative to `general.data_dir` unless absolute.
    pub database_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "catalog.sqlite3".to_string(),
        }
    }
}

/// Retrieval and extraction tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Listings returned and remembered per search (3-5).
    pub top_k: usize,
    /// Minimum similarity for a typo-tolerant neighborhood match.
    pub fuzzy_threshold: f64,
    /// Extra characters allowed on either side of the sliding window.
    pub fuzzy_margin: usize,
    /// Maximum ids taken from the full-text index per query.
    pub full_text_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            fuzzy_threshold: 0.75,
            fuzzy_margin: 2,
            full_text_limit: 200,
        }
    }
}

/// Conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Whether the chat engine accepts turns.
    pub enabled: bool,
    /// Maximum utterance length in bytes.
    pub max_message_length: usize,
    /// Messages kept in the rolling history handed to the composer.
    pub context_turns: usize,
    /// Idle minutes after which a session is discarded.
    pub session_timeout_minutes: u32,
    /// Upper bound on a single composer call.
    pub composer_timeout_ms: u64,
    /// Neighborhoods suggested when nothing matches.
    pub neighborhood_suggestions: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_message_length: 2000,
            context_turns: 8,
            session_timeout_minutes: 30,
            composer_timeout_ms: 8000,
            neighborhood_suggestions: 3,
        }
    }
}
