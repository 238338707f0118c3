//! Newtype domain identifiers.
//!
//! Configuration keys and secret-bearing values are wrapped in distinct
//! newtypes so a [`ServiceName`] cannot be passed where a [`SecretName`] is
//! expected, and so a [`WebhookUrl`] never leaks through `Debug` output.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Identifies a deployed service, as carried in the `_SERVICE_NAME`
    /// build substitution and used as a delivery routing key.
    ///
    /// The reserved name `"default"` (see [`ServiceName::default_route`]) marks
    /// the fallback endpoint.
    ServiceName
}

impl ServiceName {
    /// Routing key of the fallback endpoint.
    pub const DEFAULT_ROUTE: &'static str = "default";

    /// Returns the fallback routing key.
    pub fn default_route() -> Self {
        Self(Self::DEFAULT_ROUTE.to_string())
    }
}

string_id! {
    /// Name of an entry in the config document's `spec.secrets` list.
    ///
    /// Delivery entries reference secrets by this name (`secretRef`); the
    /// list maps it to a resource the secret getter understands.
    SecretName
}

string_id! {
    /// A cloud project identifier (e.g. `"my-project-id"`).
    ProjectId
}

string_id! {
    /// A chat user identifier used to build `<@user>` mentions.
    ChatUserId
}

// ---------------------------------------------------------------------------
// Secret-bearing values
// ---------------------------------------------------------------------------

/// A resolved webhook URL.
///
/// Webhook URLs embed their access token in the path, so `Debug` and
/// `Display` only show the scheme and host.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookUrl(String);

impl WebhookUrl {
    /// Creates a webhook URL, returning `None` if the value is blank.
    ///
    /// Surrounding whitespace (typically a trailing newline in a secret
    /// payload) is removed.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Returns the full URL. Never log this value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn redacted(&self) -> String {
        match self.0.split_once("://") {
            Some((scheme, rest)) => {
                let host = rest.split('/').next().unwrap_or_default();
                format!("{scheme}://{host}/<redacted>")
            }
            None => "<redacted>".to_string(),
        }
    }
}

impl std::fmt::Debug for WebhookUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WebhookUrl").field(&self.redacted()).finish()
    }
}

impl std::fmt::Display for WebhookUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.redacted())
    }
}
