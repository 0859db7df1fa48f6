//! Configuration for the assistant.
//!
//! Loads settings from a TOML file or uses defaults. A missing or malformed
//! file never aborts startup.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default config file location.
pub const CONFIG_PATH: &str = "/etc/kestrel/config.toml";

/// Language-model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// API key. Falls back to the KESTREL_API_KEY environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_endpoint() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("KESTREL_API_KEY").ok())
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the conversation database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_db_path() -> PathBuf {
    data_dir().join("kestrel.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Conversation history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// How many completed exchanges feed back into the prompt context.
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_window() -> usize {
    20
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
        }
    }
}

/// System-automation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Resolve and report the action without executing it.
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self { dry_run: false }
    }
}

/// Image-generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_image_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_image_size")]
    pub width: u32,

    #[serde(default = "default_image_size")]
    pub height: u32,

    /// Where generated images are saved.
    #[serde(default = "default_image_dir")]
    pub output_dir: PathBuf,
}

fn default_image_endpoint() -> String {
    "https://image.pollinations.ai/prompt".to_string()
}

fn default_image_size() -> u32 {
    1024
}

fn default_image_dir() -> PathBuf {
    data_dir().join("images")
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_image_endpoint(),
            width: default_image_size(),
            height: default_image_size(),
            output_dir: default_image_dir(),
        }
    }
}

/// Content-generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Where generated documents are saved.
    #[serde(default = "default_content_dir")]
    pub output_dir: PathBuf,
}

fn default_content_dir() -> PathBuf {
    data_dir().join("content")
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            output_dir: default_content_dir(),
        }
    }
}

/// Top-level assistant configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub automation: AutomationConfig,

    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub content: ContentConfig,
}

impl AssistantConfig {
    /// Load configuration from a file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Invalid config at {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

/// Per-user data directory, with a relative fallback when no home exists.
fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("kestrel"))
        .unwrap_or_else(|| PathBuf::from("kestrel-data"))
}
