use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, HEARTBEAT};
use crate::config::NatsConfig;

/// Outbound path to the reply service
#[async_trait]
pub trait UtteranceSink: Send + Sync {
    async fn send_utterance(&self, message: &ClientMessage) -> Result<()>;
}

pub struct NatsClient {
    client: Client,
    config: NatsConfig,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(config.url.as_str())
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Subscribe to reply-service messages
    pub async fn subscribe_responses(&self) -> Result<Subscriber> {
        let subject = self.config.responses_subject.clone();
        info!("Subscribing to replies on {}", subject);

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to replies")?;

        info!("Subscribed to {}", subject);
        Ok(subscriber)
    }

    pub async fn publish_utterance(&self, message: &ClientMessage) -> Result<()> {
        let subject = self.config.utterance_subject.clone();
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish utterance")?;

        info!(
            "Published utterance to {} (id={}, chars={})",
            subject,
            message.id,
            message.message.chars().count()
        );
        Ok(())
    }

    pub async fn publish_heartbeat(&self) -> Result<()> {
        self.client
            .publish(self.config.utterance_subject.clone(), HEARTBEAT.into())
            .await
            .context("Failed to publish heartbeat")?;

        debug!("Heartbeat sent to {}", self.config.utterance_subject);
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.config.heartbeat_secs.max(1))
    }
}

#[async_trait]
impl UtteranceSink for NatsClient {
    async fn send_utterance(&self, message: &ClientMessage) -> Result<()> {
        self.publish_utterance(message).await
    }
}

/// Forward reply payloads into the avatar inbox until either side closes
pub async fn pump_responses(mut subscriber: Subscriber, inbox: mpsc::Sender<Vec<u8>>) {
    while let Some(message) = subscriber.next().await {
        if inbox.send(message.payload.to_vec()).await.is_err() {
            warn!("Avatar inbox closed, stopping reply pump");
            return;
        }
    }
    info!("Reply subscription ended");
}

/// Publish `alive` on a fixed interval
pub async fn run_heartbeat(client: std::sync::Arc<NatsClient>) {
    let mut ticker = tokio::time::interval(client.heartbeat_interval());
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = client.publish_heartbeat().await {
            warn!("Heartbeat failed: {:#}", e);
        }
    }
}
