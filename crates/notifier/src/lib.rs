//! Build notification domain.
//!
//! Receives build lifecycle events, decides whether to announce them, turns
//! them into chat messages, and hands the payload to a webhook sender.
//! Infrastructure crates implement the traits in [`ports`]; they never add
//! mapping or routing rules.
//!
//! ## Architectural Layer
//!
//! **Domain.** Nothing here opens a socket or touches the filesystem. Secrets
//! and webhook delivery are reached only through the [`ports`] traits, which
//! the `secrets` and `discord` crates implement and the binary wires in.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`event`] | Build events as published by Cloud Build |
//! | [`identifiers`] | Newtype identifiers and the redacting [`WebhookUrl`] |
//! | [`message`] | Message payloads and the status-to-message mapping |
//! | [`endpoints`] | Service-to-webhook routing table |
//! | [`config`] | The configuration document and delivery interpretation |
//! | [`filter`] | Filter expression compiler |
//! | [`ports`] | Collaborator traits (`EventFilter`, `SecretGetter`, `WebhookSender`) |
//! | [`errors`] | Configuration-time and notification-time errors |
//! | [`notifier`] | [`Notifier`]: `configure` and `notify` |

pub mod config;
pub mod endpoints;
pub mod errors;
pub mod event;
pub mod filter;
pub mod identifiers;
pub mod message;
pub mod notifier;
pub mod ports;

// Re-export the common surface at the crate root for downstream crates.
pub use config::NotifierConfig;
pub use endpoints::EndpointTable;
pub use errors::{ConfigError, DeliveryError, NotifyError, RetryPolicy, SecretError};
pub use event::{BuildEvent, BuildStatus};
pub use filter::{FilterError, Predicate};
pub use identifiers::{ChatUserId, ProjectId, SecretName, ServiceName, WebhookUrl};
pub use message::{Embed, MentionRule, Message};
pub use notifier::{Notifier, Outcome};
pub use ports::{DeliveryReceipt, EventFilter, SecretGetter, WebhookSender};
