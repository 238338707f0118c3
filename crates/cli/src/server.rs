//! Pub/Sub push receiver.
//!
//! Cloud Build publishes every build update to the `cloud-builds` topic; a
//! push subscription POSTs each message here as
//! `{"message": {"data": "<base64 Build JSON>", ...}, "subscription": "..."}`.
//! The response status tells Pub/Sub whether to redeliver: 2xx acknowledges,
//! anything else is retried.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use notifier::{BuildEvent, Notifier, RetryPolicy};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PubSubMessage,
    #[serde(default)]
    subscription: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PubSubMessage {
    #[serde(default)]
    data: String,
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Debug, Error)]
enum PushError {
    #[error("malformed push envelope: {0}")]
    Envelope(serde_json::Error),
    #[error("message data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("message data is not a build: {0}")]
    Build(serde_json::Error),
}

fn decode_push(body: &[u8]) -> Result<(String, BuildEvent), PushError> {
    let envelope: PushEnvelope = serde_json::from_slice(body).map_err(PushError::Envelope)?;
    let data = STANDARD.decode(envelope.message.data.as_bytes())?;
    let event = serde_json::from_slice(&data).map_err(PushError::Build)?;

    debug!(
        subscription = %envelope.subscription,
        attributes = ?envelope.message.attributes,
        "Decoded push message"
    );
    Ok((envelope.message.message_id, event))
}

/// Builds the receiver's routes.
pub fn router(notifier: Arc<Notifier>) -> Router {
    Router::new()
        .route("/", post(receive))
        .route("/healthz", get(healthz))
        .with_state(notifier)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn receive(State(notifier): State<Arc<Notifier>>, body: Bytes) -> StatusCode {
    let (message_id, event) = match decode_push(&body) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, "Rejecting push request");
            return StatusCode::BAD_REQUEST;
        }
    };

    match notifier.notify(&event).await {
        Ok(outcome) => {
            debug!(%message_id, build_id = %event.id, ?outcome, "Handled build event");
            StatusCode::OK
        }
        Err(e) => match e.retry_policy() {
            RetryPolicy::Retryable => {
                error!(%message_id, build_id = %event.id, error = %e, "Failed to send notification; requesting redelivery");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RetryPolicy::NonRetryable => {
                error!(%message_id, build_id = %event.id, error = %e, "Failed to send notification; dropping event");
                StatusCode::OK
            }
        },
    }
}

/// Serves the receiver on `port` until Ctrl-C / SIGTERM.
pub async fn serve(notifier: Arc<Notifier>, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(addr = %listener.local_addr()?, "Listening for Pub/Sub push requests");

    axum::serve(listener, router(notifier))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Receiver stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use notifier::{DeliveryError, DeliveryReceipt, WebhookSender, WebhookUrl};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    struct Recorder {
        posts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl WebhookSender for Recorder {
        async fn post_json(
            &self,
            url: &WebhookUrl,
            _body: Vec<u8>,
        ) -> Result<DeliveryReceipt, DeliveryError> {
            self.posts.lock().unwrap().push(url.expose().to_string());
            if self.fail {
                Err(DeliveryError::new("connection reset"))
            } else {
                Ok(DeliveryReceipt { status: 204 })
            }
        }
    }

    async fn build_notifier(fail: bool, with_default: bool) -> (Arc<Notifier>, Arc<Recorder>) {
        let mut delivery = json!({"api": {"webhookUrl": {"secretRef": "api"}}});
        if with_default {
            delivery["default"] = json!({"webhookUrl": {"secretRef": "api"}});
        }
        let config = serde_json::from_value(json!({
            "spec": {
                "notification": {"delivery": delivery},
                "secrets": [{"name": "api", "value": "res/api"}]
            }
        }))
        .unwrap();
        let secrets = secrets::StaticSecretGetter::new().with("res/api", "https://hooks.test/api");
        let recorder = Arc::new(Recorder {
            posts: Mutex::new(Vec::new()),
            fail,
        });

        let notifier = Notifier::configure(&config, &secrets, recorder.clone())
            .await
            .unwrap();
        (Arc::new(notifier), recorder)
    }

    fn push(build: serde_json::Value) -> Request<Body> {
        let data = STANDARD.encode(build.to_string());
        let envelope = json!({
            "message": {"data": data, "messageId": "m1", "attributes": {"buildId": "b1"}},
            "subscription": "projects/p/subscriptions/cloud-builds"
        });
        Request::post("/")
            .header("content-type", "application/json")
            .body(Body::from(envelope.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn delivers_decoded_build() {
        let (notifier, recorder) = build_notifier(false, false).await;

        let response = router(notifier)
            .oneshot(push(json!({
                "id": "b1",
                "status": "SUCCESS",
                "substitutions": {"_SERVICE_NAME": "api"}
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            *recorder.posts.lock().unwrap(),
            vec!["https://hooks.test/api".to_string()]
        );
    }

    #[tokio::test]
    async fn transport_failure_requests_redelivery() {
        let (notifier, _) = build_notifier(true, false).await;

        let response = router(notifier)
            .oneshot(push(json!({
                "id": "b1",
                "status": "FAILURE",
                "substitutions": {"_SERVICE_NAME": "api"}
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn missing_endpoint_is_acknowledged() {
        let (notifier, recorder) = build_notifier(false, false).await;

        let response = router(notifier)
            .oneshot(push(json!({
                "id": "b1",
                "status": "SUCCESS",
                "substitutions": {"_SERVICE_NAME": "web"}
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(recorder.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn build_without_status_is_acknowledged() {
        let (notifier, recorder) = build_notifier(false, true).await;

        // Protobuf JSON drops the zero value, so STATUS_UNKNOWN has no field.
        let response = router(notifier)
            .oneshot(push(json!({
                "id": "b1",
                "projectId": "p",
                "substitutions": {"_SERVICE_NAME": "api"}
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(recorder.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_is_a_bad_request() {
        let (notifier, _) = build_notifier(false, true).await;

        let not_json = Request::post("/").body(Body::from("nope")).unwrap();
        let response = router(notifier.clone()).oneshot(not_json).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bad_data = Request::post("/")
            .body(Body::from(json!({"message": {"data": "%%%"}}).to_string()))
            .unwrap();
        let response = router(notifier).oneshot(bad_data).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let (notifier, _) = build_notifier(false, true).await;

        let response = router(notifier)
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
