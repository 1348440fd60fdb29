use peerchat_session::SessionConfig;
use serde::Deserialize;

fn default_listen() -> String {
    "0.0.0.0:4380".to_string()
}

/// CLI configuration, loadable from a TOML file. The `[session]`
/// table maps onto the session crate's own config.
#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    /// Address the TCP transport listens on.
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            session: SessionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config.listen, "0.0.0.0:4380");
        assert_eq!(config.session.ping_interval_ms, 1000);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config: CliConfig = toml::from_str(
            r#"
            listen = "127.0.0.1:9000"

            [session]
            ping_timeout_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.session.ping_timeout_ms, 5000);
        assert_eq!(config.session.ping_interval_ms, 1000);
    }
}
