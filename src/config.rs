use anyhow::{Context, Result};
use serde::Deserialize;

use crate::avatar::RuntimeConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub nats: NatsConfig,
    pub audio: AudioConfig,
    pub avatar: RuntimeConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-avatar".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3030,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub enabled: bool,
    pub url: String,
    /// Reply-service messages for this avatar
    pub responses_subject: String,
    /// Outbound utterances and heartbeats
    pub utterance_subject: String,
    pub heartbeat_secs: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "nats://localhost:4222".to_string(),
            responses_subject: "avatar.response".to_string(),
            utterance_subject: "avatar.utterance".to_string(),
            heartbeat_secs: 45,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Root for audio references given as paths (e.g. `/audio/reply.wav`)
    pub base_path: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            base_path: "public".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Parse a TOML document, for embedded or test configuration
    pub fn from_toml(source: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg = Config::from_toml(
            r#"
            [service.http]
            port = 8080

            [avatar.aggregator]
            enrichment_grace_ms = 250

            [avatar.breathing]
            duration_secs = 5.0
            "#,
        )
        .unwrap();

        assert_eq!(cfg.service.http.port, 8080);
        assert_eq!(cfg.service.http.bind, "127.0.0.1");
        assert_eq!(cfg.avatar.aggregator.enrichment_grace_ms, 250);
        assert_eq!(cfg.avatar.aggregator.max_age_ms, 30_000);
        assert_eq!(cfg.avatar.breathing.duration_secs, 5.0);
        assert_eq!(cfg.avatar.breathing.chest_expansion, 0.02);
        assert!(!cfg.nats.enabled);
        assert_eq!(cfg.avatar.tick_hz, 60);
    }
}
