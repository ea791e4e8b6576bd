use async_trait::async_trait;
use thiserror::Error;

use crate::models::Outbound;

/// Errors that can occur when delivering an effect
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Transport misconfigured: {0}")]
    Config(String),
}

/// Delivers outbound effects to end users
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, effect: &Outbound) -> Result<(), TransportError>;

    /// Confirm receipt of an inline button press so the client stops waiting
    async fn acknowledge(&self, _callback_id: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Deliver effects in order, fire-and-forget
///
/// A failed delivery is logged and the remaining effects are still sent.
/// Returns the number of effects delivered.
pub async fn deliver_all(transport: &dyn Transport, effects: &[Outbound]) -> usize {
    let mut delivered = 0;
    for effect in effects {
        match transport.deliver(effect).await {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!("Failed to deliver effect to {}: {}", effect.recipient(), e),
        }
    }
    delivered
}

/// Transport that only logs effects; for local runs without a bot
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn deliver(&self, effect: &Outbound) -> Result<(), TransportError> {
        tracing::info!("Outbound to {}: {:?}", effect.recipient(), effect);
        Ok(())
    }
}
