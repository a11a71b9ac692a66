//! Configuration loading, validation, and management for Wela.
//!
//! Loads configuration from `~/.wela/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.wela/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the chat endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model
    #[serde(default = "default_model")]
    pub model: String,

    /// Conversation loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Tool configuration
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("tools", &self.tools)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Persona prompt placed first in every transcript
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Hard cap on model round-trips per turn
    #[serde(default = "default_max_loop")]
    pub max_loop: usize,

    /// Stream answers token by token
    #[serde(default)]
    pub stream: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_system_prompt() -> String {
    "You are Wela, a helpful assistant. Use the available tools when they help \
     answer the user, and call `quit` when the user wants to end the conversation."
        .into()
}
fn default_max_loop() -> usize {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_loop: default_max_loop(),
            stream: false,
            max_tokens: None,
            temperature: None,
            stop: Vec::new(),
        }
    }
}

/// Which memory implementation backs a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackendKind {
    /// No memory at all
    None,
    /// Every message, unbounded
    Buffer,
    /// The last `window_size` messages
    Window,
    /// Recency window plus vector recall
    Hybrid,
}

/// Where hybrid memory keeps its vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorStoreKind {
    InMemory,
    Qdrant,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_backend")]
    pub backend: MemoryBackendKind,

    #[serde(default = "default_vector_store")]
    pub vector_store: VectorStoreKind,

    /// Collection name / prompt slot this conversation's memory is bound to
    #[serde(default = "default_memory_key")]
    pub memory_key: String,

    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Combined budget of recalled messages (window + long-term)
    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_vector_size")]
    pub vector_size: usize,

    /// Qdrant gRPC endpoint
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qdrant_api_key: Option<String>,
}

fn default_memory_backend() -> MemoryBackendKind {
    MemoryBackendKind::Hybrid
}
fn default_vector_store() -> VectorStoreKind {
    VectorStoreKind::InMemory
}
fn default_memory_key() -> String {
    "wela_memory".into()
}
fn default_window_size() -> usize {
    5
}
fn default_limit() -> usize {
    15
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_vector_size() -> usize {
    1536
}
fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

impl std::fmt::Debug for MemoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConfig")
            .field("backend", &self.backend)
            .field("vector_store", &self.vector_store)
            .field("memory_key", &self.memory_key)
            .field("window_size", &self.window_size)
            .field("limit", &self.limit)
            .field("score_threshold", &self.score_threshold)
            .field("embedding_model", &self.embedding_model)
            .field("vector_size", &self.vector_size)
            .field("qdrant_url", &self.qdrant_url)
            .field("qdrant_api_key", &redact(&self.qdrant_api_key))
            .finish()
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            vector_store: default_vector_store(),
            memory_key: default_memory_key(),
            window_size: default_window_size(),
            limit: default_limit(),
            score_threshold: None,
            embedding_model: default_embedding_model(),
            vector_size: default_vector_size(),
            qdrant_url: default_qdrant_url(),
            qdrant_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Names of the built-in tools to register
    #[serde(default = "default_enabled_tools")]
    pub enabled: Vec<String>,

    /// Per-call timeout; a timed-out call becomes an error result
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: Option<u64>,

    /// Commands the terminal tool may run. Empty = all.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

fn default_enabled_tools() -> Vec<String> {
    vec![
        "quit".into(),
        "current_time".into(),
        "write_file".into(),
        "terminal".into(),
    ]
}
fn default_tool_timeout() -> Option<u64> {
    Some(60)
}
fn default_allowed_commands() -> Vec<String> {
    ["ls", "cat", "head", "tail", "echo", "pwd", "date", "wc", "grep", "find", "git"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_tools(),
            timeout_secs: default_tool_timeout(),
            allowed_commands: default_allowed_commands(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.wela/config.toml).
    ///
    /// Environment overrides:
    /// - `WELA_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `WELA_MODEL`
    /// - `WELA_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("WELA_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("WELA_MODEL") {
            config.model = model;
        }

        if let Ok(base_url) = std::env::var("WELA_BASE_URL") {
            config.base_url = base_url;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".wela")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_loop == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_loop must be at least 1".into(),
            ));
        }

        if let Some(t) = self.agent.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.memory.limit < self.memory.window_size {
            return Err(ConfigError::ValidationError(format!(
                "memory.limit ({}) must be >= memory.window_size ({})",
                self.memory.limit, self.memory.window_size
            )));
        }

        if self.memory.vector_size == 0 {
            return Err(ConfigError::ValidationError(
                "memory.vector_size must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            agent: AgentConfig::default(),
            memory: MemoryConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
