use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide operator settings, read on demand with a defined
/// default per key. Injected where needed rather than read as ambient
/// global state.
pub struct Settings {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    pub fn new() -> Self {
        Self {
            values: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn default_for(key: &str) -> Option<&'static str> {
        match key {
            "token_rate" => Some("1000=0.1"),
            "support_link" => Some("https://t.me/support"),
            _ => None,
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().await;
        values
            .get(key)
            .cloned()
            .or_else(|| Self::default_for(key).map(str::to_string))
    }

    pub async fn set(&self, key: &str, value: &str) {
        let mut values = self.values.write().await;
        values.insert(key.to_string(), value.to_string());
    }

    pub async fn token_rate(&self) -> String {
        self.get("token_rate").await.unwrap_or_default()
    }

    pub async fn support_link(&self) -> String {
        self.get("support_link").await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_and_overrides() {
        let settings = Settings::new();
        assert_eq!(settings.token_rate().await, "1000=0.1");
        assert_eq!(settings.support_link().await, "https://t.me/support");
        assert_eq!(settings.get("unknown_key").await, None);

        settings.set("token_rate", "500=0.2").await;
        assert_eq!(settings.token_rate().await, "500=0.2");
    }
}
