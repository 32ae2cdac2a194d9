//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use stride_agent::{AgentConfig, ConversationHistoryConfig};

/// Configuration for stride
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default model to use
    pub model: Option<String>,
    /// OpenAI-compatible endpoint
    pub base_url: Option<String>,
    /// API key (alternative to OPENAI_API_KEY)
    pub api_key: Option<String>,
    /// Capability set used when none is given on the command line
    pub capability_set: Option<String>,
    /// Identity passed to context-aware capabilities
    pub user_id: Option<String>,
    /// Loop budgets
    #[serde(rename = "loop")]
    pub loop_settings: LoopSettings,
    /// Conversation window
    pub history: ConversationHistoryConfig,
}

/// Loop budget settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSettings {
    pub max_iterations: u32,
    pub max_duration_secs: u64,
    pub tool_timeout_secs: u64,
}

impl Default for LoopSettings {
    fn default() -> Self {
        let defaults = AgentConfig::default();
        Self {
            max_iterations: defaults.max_iterations,
            max_duration_secs: defaults.max_duration.as_secs(),
            tool_timeout_secs: defaults.tool_timeout.as_secs(),
        }
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stride")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for STRIDE_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("STRIDE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default path
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            model: Some(DEFAULT_MODEL.to_string()),
            capability_set: Some("all".to_string()),
            ..Config::default()
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    /// API key from config, then OPENAI_API_KEY
    pub fn api_key(&self) -> stride_ai::Result<String> {
        stride_ai::providers::get_api_key(self.api_key.as_deref(), "OPENAI_API_KEY")
    }

    /// Agent settings with command-line overrides applied
    pub fn agent_config(&self, max_iterations: Option<u32>) -> AgentConfig {
        AgentConfig::default()
            .with_max_iterations(max_iterations.unwrap_or(self.loop_settings.max_iterations))
            .with_max_duration(Duration::from_secs(self.loop_settings.max_duration_secs))
            .with_tool_timeout(Duration::from_secs(self.loop_settings.tool_timeout_secs))
            .with_history(self.history.clone())
    }
}

/// Model used when neither the config nor the command line names one
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# stride configuration file
# Place at ~/.config/stride/config.toml (Linux), ~/Library/Application Support/stride/config.toml (Mac)
# or %APPDATA%\stride\config.toml (Windows). Override with STRIDE_CONFIG_PATH.

# Chat model used for reasoning, synthesis, and summaries
model = "gpt-4o-mini"

# OpenAI-compatible endpoint (optional)
# base_url = "https://api.openai.com/v1"

# API key (optional - OPENAI_API_KEY is used when unset)
# api_key = "sk-..."

# Capability set: weather, events, shopping, all
capability_set = "all"

# Identity for context-aware capabilities such as the shopping cart
# user_id = "alice"

[loop]
# Steps per query before the loop is halted
max_iterations = 8
# Wall-clock budget per query
max_duration_secs = 120
# Deadline for a single capability call
tool_timeout_secs = 30

[history]
# Exchanges kept verbatim
max_trajectories = 10
# Earliest exchanges never summarized
preserve_first = 1
# Latest exchanges never summarized
preserve_last = 3
# Summarize evicted exchanges (false drops them)
summarize_removed = true
# Summaries kept; the newest is merged into the next one at the cap
max_summaries = 1
"#
}
