use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub api: ApiConfig,
    pub bot: BotConfig,
    pub admin: AdminConfig,
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Base URL of the chat-platform bot API.
    pub api_base: String,
    pub token: String,
    /// Bot handle used to build referral deep links.
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The single trusted operator identity for admin routes.
    pub admin_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Upper bound on in-flight sends during a broadcast run.
    pub concurrency: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                name: "questline-node".to_string(),
            },
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            bot: BotConfig {
                api_base: "https://api.telegram.org".to_string(),
                token: String::new(),
                username: "questline_bot".to_string(),
            },
            admin: AdminConfig { admin_id: 0 },
            broadcast: BroadcastConfig { concurrency: 8 },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: NodeConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load the file when given, else defaults; then apply environment
    /// overrides. The bot token is secret and usually arrives via env.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Ok(token) = env::var("QUESTLINE_BOT_TOKEN") {
            config.bot.token = token;
        }
        if let Ok(username) = env::var("QUESTLINE_BOT_USERNAME") {
            config.bot.username = username;
        }
        if let Ok(admin_id) = env::var("QUESTLINE_ADMIN_ID") {
            config.admin.admin_id = admin_id
                .parse()
                .context("QUESTLINE_ADMIN_ID must be an integer")?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.broadcast.concurrency, 8);
        assert_eq!(config.bot.api_base, "https://api.telegram.org");
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = NodeConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.node.name, config.node.name);
        assert_eq!(parsed.api.port, config.api.port);
    }
}
