//! The configured notifier and its two lifecycle operations.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{secret_ref, DeliveryPlan, NotifierConfig, NotifierSpec};
use crate::endpoints::EndpointTable;
use crate::errors::{ConfigError, NotifyError, SecretError};
use crate::event::BuildEvent;
use crate::filter::Predicate;
use crate::identifiers::WebhookUrl;
use crate::message::{self, MentionRule, Message};
use crate::ports::{EventFilter, SecretGetter, WebhookSender};

/// What [`Notifier::notify`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The filter matched; nothing was sent.
    Filtered,
    /// The status is not announced; nothing was sent.
    Unhandled,
    /// The message was posted and the endpoint answered with `status`.
    Delivered { status: u16 },
}

/// Turns build events into chat messages and posts them.
///
/// Built by [`Notifier::configure`]; immutable afterwards, so a single
/// instance can be shared (e.g. behind an [`Arc`]) by concurrent callers.
pub struct Notifier {
    filter: Option<Arc<dyn EventFilter>>,
    endpoints: EndpointTable,
    mention: Option<MentionRule>,
    sender: Arc<dyn WebhookSender>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("filtered", &self.filter.is_some())
            .field("endpoints", &self.endpoints)
            .field("mention", &self.mention)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    /// Compiles the filter and resolves every webhook secret.
    ///
    /// Configuration is atomic: the first failure aborts and no notifier is
    /// produced.
    pub async fn configure(
        config: &NotifierConfig,
        secrets: &dyn SecretGetter,
        sender: Arc<dyn WebhookSender>,
    ) -> Result<Self, ConfigError> {
        let notification = &config.spec.notification;

        let filter = match notification.filter_expression() {
            Some(expression) => {
                let predicate =
                    Predicate::compile(expression).map_err(|source| ConfigError::InvalidFilter {
                        expression: expression.to_string(),
                        source,
                    })?;
                debug!(filter = predicate.source(), "Compiled event filter");
                Some(Arc::new(predicate) as Arc<dyn EventFilter>)
            }
            None => None,
        };

        let endpoints = match notification.delivery_plan()? {
            DeliveryPlan::Single(entry) => {
                EndpointTable::Single(resolve_entry(&config.spec, "single", entry, secrets).await?)
            }
            DeliveryPlan::Routed(routes) => {
                let mut table = HashMap::with_capacity(routes.len());
                for (service, entry) in routes {
                    info!(service = %service, "Found delivery entry for service");
                    let url = resolve_entry(&config.spec, service.as_str(), entry, secrets).await?;
                    table.insert(service, url);
                }
                EndpointTable::Routed(table)
            }
        };

        if !endpoints.has_fallback() {
            warn!("No default delivery entry; events for unrouted services will fail");
        }
        info!(
            endpoints = endpoints.endpoint_count(),
            filtered = filter.is_some(),
            "Notifier configured"
        );

        Ok(Self {
            filter,
            endpoints,
            mention: notification.mention.clone(),
            sender,
        })
    }

    /// Replaces the compiled filter with a host-supplied predicate.
    pub fn with_filter(mut self, filter: Arc<dyn EventFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Returns the endpoint table built during configuration.
    pub fn endpoints(&self) -> &EndpointTable {
        &self.endpoints
    }

    /// Builds the message `event` would produce, without sending it.
    pub fn message_for(&self, event: &BuildEvent) -> Option<Message> {
        message::compose(event, self.mention.as_ref())
    }

    /// Filters, formats, routes and posts one event.
    ///
    /// Suppressed events return `Ok` without any HTTP call. A response from
    /// the endpoint, whatever its status, counts as delivered.
    pub async fn notify(&self, event: &BuildEvent) -> Result<Outcome, NotifyError> {
        if self.filter.as_ref().is_some_and(|f| f.apply(event)) {
            debug!(build_id = %event.id, status = %event.status, "Event suppressed by filter");
            return Ok(Outcome::Filtered);
        }

        info!(build_id = %event.id, status = %event.status, "Sending webhook for build");

        let Some(msg) = self.message_for(event) else {
            info!(build_id = %event.id, status = %event.status, "Unhandled status, skipping notification");
            return Ok(Outcome::Unhandled);
        };

        let service = event.service_name();
        let url = self.endpoints.resolve(service)?;
        let payload = serde_json::to_vec(&msg)?;

        debug!(build_id = %event.id, service, endpoint = %url, bytes = payload.len(), "Posting payload");
        let receipt = self.sender.post_json(url, payload).await?;

        if receipt.is_success() {
            info!(build_id = %event.id, status = receipt.status, "Webhook delivered");
        } else {
            warn!(build_id = %event.id, status = receipt.status, "Webhook answered with non-success status");
        }
        Ok(Outcome::Delivered {
            status: receipt.status,
        })
    }
}

async fn resolve_entry(
    spec: &NotifierSpec,
    route: &str,
    entry: &serde_json::Value,
    secrets: &dyn SecretGetter,
) -> Result<WebhookUrl, ConfigError> {
    let failed = |source: SecretError| ConfigError::SecretResolutionFailed {
        route: route.to_string(),
        source,
    };

    let name = secret_ref(entry).map_err(failed)?;
    let resource = spec.secret_resource(&name).map_err(failed)?;
    let value = secrets.get_secret(resource).await.map_err(failed)?;

    WebhookUrl::new(value).ok_or_else(|| {
        failed(SecretError::Empty {
            resource: resource.to_string(),
        })
    })
}
