//! Secret resolution adapters.
//!
//! Implements [`notifier::SecretGetter`] for the sources available to a
//! self-hosted notifier:
//!
//! | Resource | Getter | Value |
//! |----------|--------|-------|
//! | `env:NAME` | [`EnvSecretGetter`] | environment variable `NAME` |
//! | `file:/path` | [`FileSecretGetter`] | file contents, trimmed |
//! | `projects/p/secrets/s/versions/v` | [`SecretManagerGetter`] | Secret Manager payload, trimmed |
//! | anything | [`StaticSecretGetter`] | in-memory map (tests, smoke runs) |
//!
//! [`SchemeSecretGetter`] dispatches on the `scheme:` prefix (or the bare
//! Secret Manager name) and is what the host wires in by default.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Secret values never leave this crate except as the
//! return value of [`notifier::SecretGetter::get_secret`], and are never logged.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use notifier::{SecretError, SecretGetter};
use tracing::debug;

mod secret_manager;

use secret_manager::is_secret_version;
pub use secret_manager::SecretManagerGetter;

fn fetch_error(resource: &str, message: impl Into<String>) -> SecretError {
    SecretError::Fetch {
        resource: resource.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Reads secrets from environment variables; the resource is the variable name.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretGetter;

#[async_trait]
impl SecretGetter for EnvSecretGetter {
    async fn get_secret(&self, resource: &str) -> Result<String, SecretError> {
        std::env::var(resource).map_err(|e| fetch_error(resource, e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Reads secrets from files; the resource is a path, optionally relative to
/// a base directory (e.g. a mounted secrets volume).
#[derive(Debug, Clone, Default)]
pub struct FileSecretGetter {
    base_dir: Option<PathBuf>,
}

impl FileSecretGetter {
    /// Resolves relative paths against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn path_for(&self, resource: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(resource),
            None => PathBuf::from(resource),
        }
    }
}

#[async_trait]
impl SecretGetter for FileSecretGetter {
    async fn get_secret(&self, resource: &str) -> Result<String, SecretError> {
        let path = self.path_for(resource);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| fetch_error(resource, format!("{}: {e}", path.display())))?;
        Ok(contents.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Serves secrets from a fixed map keyed by the full resource string.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretGetter {
    values: HashMap<String, String>,
}

impl StaticSecretGetter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the value for `resource`.
    pub fn with(mut self, resource: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(resource.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretGetter for StaticSecretGetter {
    async fn get_secret(&self, resource: &str) -> Result<String, SecretError> {
        self.values
            .get(resource)
            .cloned()
            .ok_or_else(|| fetch_error(resource, "no such secret"))
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Routes `env:` and `file:` resources to the matching getter, and bare
/// `projects/*/secrets/*/versions/*` names to Secret Manager.
#[derive(Debug, Clone, Default)]
pub struct SchemeSecretGetter {
    env: EnvSecretGetter,
    file: FileSecretGetter,
    secret_manager: SecretManagerGetter,
}

impl SchemeSecretGetter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `file` for `file:` resources.
    pub fn with_file_getter(mut self, file: FileSecretGetter) -> Self {
        self.file = file;
        self
    }

    /// Uses `secret_manager` for Secret Manager resource names.
    pub fn with_secret_manager(mut self, secret_manager: SecretManagerGetter) -> Self {
        self.secret_manager = secret_manager;
        self
    }
}

#[async_trait]
impl SecretGetter for SchemeSecretGetter {
    async fn get_secret(&self, resource: &str) -> Result<String, SecretError> {
        if is_secret_version(resource) {
            debug!(scheme = "secretmanager", "Resolving secret");
            return self.secret_manager.get_secret(resource).await;
        }

        let (scheme, rest) = resource.split_once(':').ok_or_else(|| {
            fetch_error(
                resource,
                "expected 'env:', 'file:' or projects/*/secrets/*/versions/*",
            )
        })?;
        debug!(scheme, "Resolving secret");

        let inner = match scheme {
            "env" => self.env.get_secret(rest).await,
            "file" => self.file.get_secret(rest).await,
            other => {
                return Err(fetch_error(
                    resource,
                    format!("unsupported secret scheme '{other}'"),
                ))
            }
        };
        // Report the full resource string, as declared in the config document.
        inner.map_err(|e| match e {
            SecretError::Fetch { message, .. } => fetch_error(resource, message),
            other => other,
        })
    }
}
