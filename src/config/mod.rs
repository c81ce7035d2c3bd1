//! Configuration for FemtoClaw.
//!
//! Loaded from `~/.femtoclaw/config.toml`; every section has defaults so a
//! missing file yields a usable configuration. The provider API key may be
//! overridden by the `FEMTOCLAW_API_KEY` environment variable (loaded from
//! `.env` by the CLI before config parsing).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{FemtoError, Result};
use crate::utils::data_dir;

fn default_true() -> bool {
    true
}

/// Telegram channel settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    /// Bot token from @BotFather.
    pub token: String,
    /// Allowed user ids or usernames; empty means allow everyone.
    pub allow_from: Vec<String>,
}

/// Discord channel settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub token: String,
    pub allow_from: Vec<String>,
}

/// WhatsApp bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    pub bridge_url: String,
    pub allow_from: Vec<String>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bridge_url: "ws://localhost:3001".into(),
            allow_from: Vec::new(),
        }
    }
}

/// Feishu/Lark channel settings (WebSocket long connection).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeishuConfig {
    pub enabled: bool,
    pub app_id: String,
    pub app_secret: String,
    pub allow_from: Vec<String>,
}

/// All chat channel settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub telegram: TelegramConfig,
    pub discord: DiscordConfig,
    pub whatsapp: WhatsAppConfig,
    pub feishu: FeishuConfig,
}

/// Agent behavior defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Workspace directory for files, memory and skills.
    pub workspace: String,
    /// Model identifier passed to the provider.
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Hard ceiling on provider calls per inbound turn.
    pub max_tool_iterations: usize,
    /// Trailing history window injected into context.
    pub history_window: usize,
    /// How many recent daily notes to inject into context.
    pub daily_note_days: usize,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.femtoclaw/workspace".into(),
            model: "anthropic/claude-sonnet-4-5".into(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 20,
            history_window: 50,
            daily_note_days: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
}

/// LLM provider credentials. One OpenAI-compatible endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: String,
    /// Override the API base URL (OpenRouter, vLLM, proxies).
    pub api_base: Option<String>,
}

/// Web search tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    /// Brave Search API key; empty disables the tool's network calls.
    pub api_key: String,
    pub max_results: usize,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            max_results: 5,
        }
    }
}

/// Shell execution tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecToolConfig {
    /// Wall-clock timeout in seconds; the child process is killed on expiry.
    pub timeout: u64,
}

impl Default for ExecToolConfig {
    fn default() -> Self {
        Self { timeout: 60 }
    }
}

/// Tool settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub web_search: WebSearchConfig,
    pub exec: ExecToolConfig,
    /// When true, file and shell tools refuse paths outside the workspace.
    pub restrict_to_workspace: bool,
}

/// Heartbeat service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval between heartbeat ticks, in seconds.
    pub interval_secs: u64,
    /// Channel that receives heartbeat output (when not HEARTBEAT_OK).
    pub channel: String,
    pub chat_id: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30 * 60,
            channel: "cli".into(),
            chat_id: "direct".into(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agents: AgentsConfig,
    pub channels: ChannelsConfig,
    pub provider: ProviderConfig,
    pub tools: ToolsConfig,
    pub heartbeat: HeartbeatConfig,
}

impl Config {
    /// Path of the config file (`~/.femtoclaw/config.toml`).
    pub fn path() -> PathBuf {
        data_dir().join("config.toml")
    }

    /// Load configuration from disk, falling back to defaults when the file
    /// does not exist. The `FEMTOCLAW_API_KEY` environment variable takes
    /// precedence over the file's provider key.
    pub fn load() -> Result<Self> {
        let path = Self::path();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)
                .map_err(|e| FemtoError::Config(format!("failed to parse {}: {}", path.display(), e)))?
        } else {
            Config::default()
        };

        if let Ok(key) = std::env::var("FEMTOCLAW_API_KEY") {
            if !key.is_empty() {
                config.provider.api_key = key;
            }
        }

        Ok(config)
    }

    /// Write the configuration back to disk (used by onboarding).
    pub fn save(&self) -> Result<()> {
        let path = Self::path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| FemtoError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Expanded workspace path (tilde resolved against the home directory).
    pub fn workspace_path(&self) -> PathBuf {
        let raw = &self.agents.defaults.workspace;
        if let Some(rest) = raw.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agents.defaults.max_tool_iterations, 20);
        assert_eq!(config.agents.defaults.history_window, 50);
        assert!(!config.tools.restrict_to_workspace);
        assert_eq!(config.tools.exec.timeout, 60);
        assert!(config.heartbeat.enabled);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [agents.defaults]
            model = "openai/gpt-4o"
            max_tool_iterations = 5

            [channels.telegram]
            enabled = true
            token = "123:abc"
            allow_from = ["42"]
            "#,
        )
        .unwrap();

        assert_eq!(config.agents.defaults.model, "openai/gpt-4o");
        assert_eq!(config.agents.defaults.max_tool_iterations, 5);
        // Unspecified fields keep their defaults.
        assert_eq!(config.agents.defaults.max_tokens, 8192);
        assert!(config.channels.telegram.enabled);
        assert_eq!(config.channels.telegram.allow_from, vec!["42"]);
        assert!(!config.channels.discord.enabled);
    }

    #[test]
    fn test_workspace_path_expansion() {
        let config = Config::default();
        let path = config.workspace_path();
        assert!(!path.to_string_lossy().contains('~'));
        assert!(path.ends_with(".femtoclaw/workspace"));
    }

    #[test]
    fn test_roundtrip_serialization() {
        let mut config = Config::default();
        config.provider.api_key = "sk-test".into();
        config.tools.restrict_to_workspace = true;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.provider.api_key, "sk-test");
        assert!(parsed.tools.restrict_to_workspace);
    }
}
