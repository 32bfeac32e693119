use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// `web` configuration section; `WebFramework::configure` options override it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebConfig {
    pub host: String,
    /// `0` picks a free port.
    pub port: u16,
    /// Mount point for application routes; `/healthz` always stays at the root.
    pub prefix: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7001,
            prefix: String::new(),
        }
    }
}

impl WebConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}:{}': {}", self.host, self.port, e))
    }

    /// Normalized prefix: `None` for the root, otherwise `/segment` without a trailing slash.
    pub fn mount_point(&self) -> Option<String> {
        let trimmed = self.prefix.trim_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(format!("/{trimmed}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partial_sections_keep_defaults() {
        let cfg: WebConfig = serde_json::from_value(json!({ "port": 8080 })).unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn prefix_is_normalized() {
        let mut cfg = WebConfig::default();
        assert_eq!(cfg.mount_point(), None);
        cfg.prefix = "/".into();
        assert_eq!(cfg.mount_point(), None);
        cfg.prefix = "api/".into();
        assert_eq!(cfg.mount_point().as_deref(), Some("/api"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_value::<WebConfig>(json!({ "hots": "0.0.0.0" })).is_err());
    }
}
