use discord::DiscordWebhookClient;
use notifier::{WebhookSender, WebhookUrl};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn url(server: &MockServer, route: &str) -> WebhookUrl {
    WebhookUrl::new(format!("{}{}", server.uri(), route)).unwrap()
}

#[tokio::test]
async fn posts_json_body_once() {
    let server = MockServer::start().await;
    let payload = json!({
        "username": "Cloud Build Notifier",
        "embeds": [{"title": "✅ SUCCESS api", "color": 1127128}]
    });

    Mock::given(method("POST"))
        .and(path("/api/webhooks/1/token"))
        .and(header("content-type", "application/json"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = DiscordWebhookClient::new()
        .post_json(
            &url(&server, "/api/webhooks/1/token"),
            serde_json::to_vec(&payload).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(receipt.status, 204);
    assert!(receipt.is_success());
}

#[tokio::test]
async fn error_status_is_a_receipt_not_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = DiscordWebhookClient::new()
        .post_json(&url(&server, "/hook"), b"{}".to_vec())
        .await
        .unwrap();

    assert_eq!(receipt.status, 429);
    assert!(!receipt.is_success());
}

#[tokio::test]
async fn transport_failure_is_an_error_without_the_url() {
    // Bind and drop a server so the port is very likely closed.
    let closed = {
        let server = MockServer::start().await;
        url(&server, "/api/webhooks/1/secret-token")
    };

    let err = DiscordWebhookClient::new()
        .post_json(&closed, b"{}".to_vec())
        .await
        .unwrap_err();

    assert!(!err.to_string().contains("secret-token"));
}
