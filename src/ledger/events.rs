//! Ledger event subscription
//!
//! Maintains a websocket subscription to the node's event feed with
//! automatic reconnection and exponential backoff. Frames that do not
//! parse as ledger events are logged and skipped; a dropped connection
//! is harmless because the polling reconciler re-converges from chain
//! truth on its next sweep.

use super::LedgerEvent;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Event subscription configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Websocket URL of the node's event feed
    pub url: String,
    /// Maximum reconnection attempts before giving up (0 = infinite)
    pub max_reconnect_attempts: u32,
    /// Initial delay before the first reconnection attempt
    pub initial_reconnect_delay: Duration,
    /// Maximum delay between reconnection attempts
    pub max_reconnect_delay: Duration,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 0,
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(60),
        }
    }
}

impl SubscriberConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Websocket subscriber for contract events
pub struct EventSubscriber {
    config: SubscriberConfig,
}

impl EventSubscriber {
    /// Create a subscriber with the given configuration
    pub fn new(config: SubscriberConfig) -> Self {
        Self { config }
    }

    /// Create a subscriber for the given URL with default backoff settings
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(SubscriberConfig::new(url))
    }

    /// Connect and return a receiver of parsed ledger events.
    ///
    /// Spawns a background task that owns the connection, reconnecting
    /// with exponential backoff on failure. The task stops when the
    /// receiver is dropped or the reconnect budget is exhausted.
    pub fn subscribe(&self) -> mpsc::Receiver<LedgerEvent> {
        let (tx, rx) = mpsc::channel(1024);
        let config = self.config.clone();

        tokio::spawn(async move {
            Self::run_subscription_loop(config, tx).await;
        });

        rx
    }

    async fn run_subscription_loop(config: SubscriberConfig, tx: mpsc::Sender<LedgerEvent>) {
        let mut reconnect_attempts = 0u32;
        let mut reconnect_delay = config.initial_reconnect_delay;

        loop {
            match Self::connect_and_stream(&config, &tx).await {
                Ok(()) => {
                    tracing::info!("Event subscription closed cleanly");
                    break;
                }
                Err(e) => {
                    reconnect_attempts += 1;
                    tracing::warn!(
                        error = %e,
                        attempt = reconnect_attempts,
                        "Event subscription error, reconnecting..."
                    );

                    if config.max_reconnect_attempts > 0
                        && reconnect_attempts >= config.max_reconnect_attempts
                    {
                        tracing::error!("Max reconnection attempts reached, giving up");
                        break;
                    }

                    if tx.is_closed() {
                        tracing::info!("Receiver dropped, stopping reconnection");
                        break;
                    }

                    sleep(reconnect_delay).await;
                    reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay);
                }
            }
        }
    }

    async fn connect_and_stream(
        config: &SubscriberConfig,
        tx: &mpsc::Sender<LedgerEvent>,
    ) -> anyhow::Result<()> {
        tracing::info!(url = %config.url, "Connecting to ledger event feed");

        let (ws_stream, _response) = connect_async(&config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        tracing::info!("Ledger event feed connected");

        while let Some(msg) = read.next().await {
            match msg? {
                Message::Text(text) => match serde_json::from_str::<LedgerEvent>(&text) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            tracing::debug!("Receiver dropped, closing subscription");
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, frame = %text, "Skipping unparseable event frame");
                    }
                },
                Message::Ping(data) => {
                    write.send(Message::Pong(data)).await?;
                }
                Message::Close(_) => {
                    tracing::info!("Received close frame");
                    return Ok(());
                }
                _ => {}
            }
        }

        anyhow::bail!("Event stream ended unexpectedly")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_config_default() {
        let config = SubscriberConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0);
        assert_eq!(config.initial_reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.max_reconnect_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_subscriber_config_with_url() {
        let subscriber = EventSubscriber::with_url("ws://localhost:8546/events");
        assert_eq!(subscriber.config.url, "ws://localhost:8546/events");
    }
}
