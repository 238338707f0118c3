//! Webhook endpoint routing.
//!
//! An [`EndpointTable`] is built once by [`crate::Notifier::configure`] and
//! only read afterwards.

use std::collections::HashMap;

use crate::errors::NotifyError;
use crate::identifiers::{ServiceName, WebhookUrl};

/// Where notifications are delivered.
#[derive(Debug, Clone)]
pub enum EndpointTable {
    /// Every event goes to the same webhook.
    Single(WebhookUrl),
    /// Events are routed by their `_SERVICE_NAME` substitution, with an
    /// optional `"default"` entry as fallback.
    Routed(HashMap<ServiceName, WebhookUrl>),
}

impl EndpointTable {
    /// Returns the webhook for events of `service`.
    ///
    /// # Errors
    ///
    /// [`NotifyError::NoEndpoint`] when the table is routed, `service` has no
    /// entry, and there is no `"default"` entry.
    pub fn resolve(&self, service: &str) -> Result<&WebhookUrl, NotifyError> {
        match self {
            Self::Single(url) => Ok(url),
            Self::Routed(routes) => ServiceName::new(service)
                .and_then(|name| routes.get(&name))
                .or_else(|| routes.get(&ServiceName::default_route()))
                .ok_or_else(|| NotifyError::NoEndpoint {
                    service: service.to_string(),
                }),
        }
    }

    /// Number of configured endpoints. Never zero: configuration rejects an
    /// empty delivery block.
    pub fn endpoint_count(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Routed(routes) => routes.len(),
        }
    }

    /// Returns `true` if a `"default"` route (or a single endpoint) exists.
    pub fn has_fallback(&self) -> bool {
        match self {
            Self::Single(_) => true,
            Self::Routed(routes) => routes.contains_key(&ServiceName::default_route()),
        }
    }
}
