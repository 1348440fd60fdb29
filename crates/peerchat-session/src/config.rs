use std::time::Duration;

use serde::Deserialize;

/// Session timing and key parameters, loadable from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Interval between outbound liveness pings after authentication.
    /// Ping silence is also checked on this cadence.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Silence threshold: if no ping arrives for this long, the
    /// session unilaterally disconnects.
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// How long a connect attempt may take to reach authentication
    /// before it is abandoned.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Modulus size for the per-session RSA keypairs.
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
}

fn default_ping_interval_ms() -> u64 {
    1_000
}

fn default_ping_timeout_ms() -> u64 {
    3_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_key_bits() -> usize {
    peerchat_crypto::DEFAULT_KEY_BITS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            key_bits: default_key_bits(),
        }
    }
}

impl SessionConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = SessionConfig::default();
        assert_eq!(config.ping_interval_ms, 1_000);
        assert_eq!(config.ping_timeout_ms, 3_000);
        assert_eq!(config.connect_timeout_ms, 5_000);
        assert_eq!(config.key_bits, 2048);
    }

    #[test]
    fn config_toml_deserialization() {
        let toml = r#"
            ping_interval_ms = 500
            ping_timeout_ms = 1500
        "#;
        let config: SessionConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.ping_interval_ms, 500);
        assert_eq!(config.ping_timeout_ms, 1500);
        // untouched fields keep their defaults
        assert_eq!(config.connect_timeout_ms, 5_000);
        assert_eq!(config.key_bits, 2048);
    }
}
