//! Error and retry-policy types for the notifier domain.
//!
//! Errors are split by lifecycle phase:
//!
//! - [`ConfigError`] is produced by [`crate::Notifier::configure`] and halts
//!   startup. There is no degraded mode.
//! - [`NotifyError`] is produced per event by [`crate::Notifier::notify`] and
//!   never affects subsequent events.
//!
//! Suppressed events (filter match, unhandled status) are not errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::FilterError;
use crate::identifiers::SecretName;

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether a failed notification is worth redelivering.
///
/// The notifier itself never retries; the host uses this to decide whether to
/// ask its event source (e.g. a Pub/Sub push subscription) for redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// A later attempt with the same event may succeed.
    Retryable,
    /// Redelivering the same event will fail the same way.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Configuration-time errors
// ---------------------------------------------------------------------------

/// Why a webhook secret could not be resolved during configuration.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The delivery entry has no `webhookUrl.secretRef` string.
    #[error("delivery entry has no secret reference in field '{field}'")]
    MissingRef {
        /// Field that was expected to carry the reference.
        field: String,
    },

    /// The reference names a secret that is not declared in `spec.secrets`.
    #[error("secret '{name}' is not declared in spec.secrets")]
    UnknownSecret {
        /// Referenced secret name.
        name: SecretName,
    },

    /// The secret getter failed to produce a value for the resource.
    #[error("failed to fetch secret resource '{resource}': {message}")]
    Fetch {
        /// Resource identifier handed to the secret getter.
        resource: String,
        /// Underlying failure, as reported by the getter.
        message: String,
    },

    /// The secret resolved to an empty value.
    #[error("secret resource '{resource}' is empty")]
    Empty {
        /// Resource identifier handed to the secret getter.
        resource: String,
    },
}

/// Fatal errors raised while configuring a [`crate::Notifier`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The filter expression does not compile.
    #[error("invalid filter expression '{expression}': {source}")]
    InvalidFilter {
        /// Expression as written in the config document.
        expression: String,
        /// Compilation failure.
        #[source]
        source: FilterError,
    },

    /// A delivery entry's webhook secret could not be resolved.
    #[error("failed to resolve webhook secret for delivery '{route}': {source}")]
    SecretResolutionFailed {
        /// Delivery route (service name, `"default"`, or `"single"`).
        route: String,
        /// Resolution failure.
        #[source]
        source: SecretError,
    },

    /// The delivery block is not a usable object.
    #[error("invalid delivery configuration: {message}")]
    InvalidDelivery {
        /// Description of the problem.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Notification-time errors
// ---------------------------------------------------------------------------

/// Per-event failures raised by [`crate::Notifier::notify`].
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The event's service is not routed and no default endpoint exists.
    #[error("no delivery endpoint for service '{service}' and no default provided")]
    NoEndpoint {
        /// Service name taken from the event (may be empty).
        service: String,
    },

    /// The outbound POST failed at the transport level.
    #[error("webhook delivery failed: {0}")]
    DeliveryFailed(#[from] DeliveryError),

    /// The message could not be encoded as JSON.
    #[error("failed to encode message payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl NotifyError {
    /// Returns whether redelivering the same event could succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::DeliveryFailed(_) => RetryPolicy::Retryable,
            Self::NoEndpoint { .. } | Self::Encode(_) => RetryPolicy::NonRetryable,
        }
    }
}

/// Transport-level failure reported by a [`crate::ports::WebhookSender`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DeliveryError {
    /// Human-readable description of the transport failure.
    pub message: String,
}

impl DeliveryError {
    /// Creates a delivery error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
