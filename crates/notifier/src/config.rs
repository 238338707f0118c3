//! The notifier configuration document.
//!
//! Mirrors the Cloud Build notifier YAML layout:
//!
//! ```yaml
//! apiVersion: cloud-build-notifiers/v1
//! kind: DiscordNotifier
//! metadata:
//!   name: build-notifier
//! spec:
//!   notification:
//!     filter: build.status != Build.Status.QUEUED
//!     mention:
//!       projectId: my-dev-project
//!       userId: "123456789"
//!     delivery:
//!       api:
//!         webhookUrl:
//!           secretRef: api-webhook
//!       default:
//!         webhookUrl:
//!           secretRef: default-webhook
//!   secrets:
//!     - name: api-webhook
//!       value: env:API_WEBHOOK_URL
//!     - name: default-webhook
//!       value: file:/secrets/default-webhook
//! ```
//!
//! A `delivery` block that carries `webhookUrl` directly configures a single
//! endpoint instead of a routing table. The block is kept as untyped JSON so
//! that a missing reference is reported as a secret resolution failure rather
//! than as a parse error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ConfigError, SecretError};
use crate::identifiers::{SecretName, ServiceName};
use crate::message::MentionRule;

/// Field of a delivery entry holding the webhook secret reference.
pub const WEBHOOK_URL_FIELD: &str = "webhookUrl";
/// Field inside [`WEBHOOK_URL_FIELD`] naming the secret.
pub const SECRET_REF_FIELD: &str = "secretRef";

/// Root of the configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierConfig {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub spec: NotifierSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierSpec {
    pub notification: NotificationSpec,
    #[serde(default)]
    pub secrets: Vec<SecretDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSpec {
    /// Suppression predicate; events for which it holds are not announced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    #[serde(default)]
    pub delivery: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention: Option<MentionRule>,
}

/// Maps a secret name to the resource a [`crate::ports::SecretGetter`]
/// understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretDeclaration {
    pub name: String,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Delivery interpretation
// ---------------------------------------------------------------------------

/// How the `delivery` block is laid out.
#[derive(Debug)]
pub enum DeliveryPlan<'a> {
    /// The block itself is one endpoint entry.
    Single(&'a Value),
    /// Service name to endpoint entry, in document order.
    Routed(Vec<(ServiceName, &'a Value)>),
}

impl NotificationSpec {
    /// Returns the filter expression, treating a blank string as absent.
    pub fn filter_expression(&self) -> Option<&str> {
        self.filter.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }

    /// Interprets the `delivery` block.
    pub fn delivery_plan(&self) -> Result<DeliveryPlan<'_>, ConfigError> {
        let Value::Object(entries) = &self.delivery else {
            return Err(ConfigError::InvalidDelivery {
                message: "spec.notification.delivery must be a mapping".to_string(),
            });
        };

        if entries.contains_key(WEBHOOK_URL_FIELD) {
            return Ok(DeliveryPlan::Single(&self.delivery));
        }

        let routes = entries
            .iter()
            .map(|(name, entry)| {
                ServiceName::new(name.as_str())
                    .map(|service| (service, entry))
                    .ok_or_else(|| ConfigError::InvalidDelivery {
                        message: "delivery route names must not be empty".to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if routes.is_empty() {
            return Err(ConfigError::InvalidDelivery {
                message: "spec.notification.delivery has no entries".to_string(),
            });
        }
        Ok(DeliveryPlan::Routed(routes))
    }
}

/// Reads `webhookUrl.secretRef` from a delivery entry.
pub fn secret_ref(entry: &Value) -> Result<SecretName, SecretError> {
    entry
        .get(WEBHOOK_URL_FIELD)
        .and_then(|field| field.get(SECRET_REF_FIELD))
        .and_then(Value::as_str)
        .and_then(SecretName::new)
        .ok_or_else(|| SecretError::MissingRef {
            field: WEBHOOK_URL_FIELD.to_string(),
        })
}

impl NotifierSpec {
    /// Returns the resource declared for secret `name`.
    pub fn secret_resource(&self, name: &SecretName) -> Result<&str, SecretError> {
        self.secrets
            .iter()
            .find(|s| s.name == name.as_str())
            .map(|s| s.value.as_str())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SecretError::UnknownSecret { name: name.clone() })
    }
}
