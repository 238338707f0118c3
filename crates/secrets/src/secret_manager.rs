//! Google Cloud Secret Manager.
//!
//! Resources have the form `projects/{project}/secrets/{secret}/versions/{version}`.
//! Each lookup takes a fresh access token from the instance metadata server
//! (Cloud Run, GCE, GKE workload identity) and calls the `:access` method of
//! the Secret Manager REST API. Lookups only happen during configuration, so
//! tokens are not cached.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use notifier::{SecretError, SecretGetter};
use serde::Deserialize;
use tracing::debug;

use crate::fetch_error;

/// Public Secret Manager endpoint.
const SECRET_MANAGER_API: &str = "https://secretmanager.googleapis.com";
/// Instance metadata server reachable from Google-hosted workloads.
const METADATA_SERVER: &str = "http://metadata.google.internal";

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const METADATA_FLAVOR: &str = "Metadata-Flavor";

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Debug, Deserialize)]
struct SecretPayload {
    #[serde(default)]
    data: String,
}

/// Returns `true` for `projects/*/secrets/*/versions/*`.
pub(crate) fn is_secret_version(resource: &str) -> bool {
    let parts: Vec<&str> = resource.split('/').collect();
    matches!(
        parts.as_slice(),
        ["projects", project, "secrets", secret, "versions", version]
            if !project.is_empty() && !secret.is_empty() && !version.is_empty()
    )
}

/// Reads secret versions through the Secret Manager REST API.
#[derive(Debug, Clone)]
pub struct SecretManagerGetter {
    client: reqwest::Client,
    api_base: String,
    metadata_base: String,
}

impl Default for SecretManagerGetter {
    fn default() -> Self {
        Self::with_endpoints(SECRET_MANAGER_API, METADATA_SERVER)
    }
}

impl SecretManagerGetter {
    /// Talks to `api_base` for secrets and `metadata_base` for tokens.
    pub fn with_endpoints(api_base: impl Into<String>, metadata_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            metadata_base: metadata_base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn access_token(&self, resource: &str) -> Result<String, SecretError> {
        let token: AccessToken = self
            .client
            .get(format!("{}{TOKEN_PATH}", self.metadata_base))
            .header(METADATA_FLAVOR, "Google")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| fetch_error(resource, format!("metadata server: {e}")))?
            .json()
            .await
            .map_err(|e| fetch_error(resource, format!("metadata server: {e}")))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl SecretGetter for SecretManagerGetter {
    async fn get_secret(&self, resource: &str) -> Result<String, SecretError> {
        if !is_secret_version(resource) {
            return Err(fetch_error(
                resource,
                "expected projects/{project}/secrets/{secret}/versions/{version}",
            ));
        }

        let token = self.access_token(resource).await?;
        debug!(resource, "Accessing secret version");

        let response: AccessSecretVersionResponse = self
            .client
            .get(format!("{}/v1/{resource}:access", self.api_base))
            .bearer_auth(token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| fetch_error(resource, e.to_string()))?
            .json()
            .await
            .map_err(|e| fetch_error(resource, e.to_string()))?;

        let bytes = STANDARD
            .decode(response.payload.data.as_bytes())
            .map_err(|e| fetch_error(resource, format!("payload is not base64: {e}")))?;
        let value = String::from_utf8(bytes)
            .map_err(|_| fetch_error(resource, "payload is not UTF-8"))?;
        Ok(value.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_secret_version_names() {
        assert!(is_secret_version("projects/p/secrets/hook/versions/latest"));
        assert!(is_secret_version("projects/123/secrets/hook/versions/4"));
        assert!(!is_secret_version("projects/p/secrets/hook"));
        assert!(!is_secret_version("projects//secrets/hook/versions/1"));
        assert!(!is_secret_version("env:HOOK"));
    }
}
