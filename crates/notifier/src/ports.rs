//! Capability traits the notifier depends on.
//!
//! The domain defines *what* it needs from its collaborators; infrastructure
//! crates (`discord`, `secrets`) and the host (`cli`) supply implementations.
//! Each trait is deliberately narrow: one capability per collaborator.

use async_trait::async_trait;

use crate::errors::{DeliveryError, SecretError};
use crate::event::BuildEvent;
use crate::identifiers::WebhookUrl;

/// A compiled predicate over build events.
///
/// A `true` result means "suppress this event".
pub trait EventFilter: Send + Sync {
    /// Evaluates the predicate for `event`.
    fn apply(&self, event: &BuildEvent) -> bool;
}

impl<F> EventFilter for F
where
    F: Fn(&BuildEvent) -> bool + Send + Sync,
{
    fn apply(&self, event: &BuildEvent) -> bool {
        self(event)
    }
}

/// Fetches secret values by resource identifier.
///
/// Only called during configuration.
#[async_trait]
pub trait SecretGetter: Send + Sync {
    /// Returns the secret value stored at `resource`.
    ///
    /// Implementations report failures as [`SecretError::Fetch`].
    async fn get_secret(&self, resource: &str) -> Result<String, SecretError>;
}

/// Outcome of a webhook POST that reached the remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// HTTP status code returned by the endpoint.
    pub status: u16,
}

impl DeliveryReceipt {
    /// Returns `true` for 2xx responses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Posts a JSON payload to a webhook.
///
/// Exactly one request per call; implementations must not retry. Any HTTP
/// response, including non-2xx, is a [`DeliveryReceipt`]; only transport
/// failures are errors.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// POSTs `body` to `url` with `Content-Type: application/json`.
    async fn post_json(&self, url: &WebhookUrl, body: Vec<u8>)
        -> Result<DeliveryReceipt, DeliveryError>;
}
