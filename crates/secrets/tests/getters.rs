use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use notifier::{SecretError, SecretGetter};
use secrets::{
    EnvSecretGetter, FileSecretGetter, SchemeSecretGetter, SecretManagerGetter,
    StaticSecretGetter,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const HOOK_VERSION: &str = "projects/my-project/secrets/discord-hook/versions/latest";

async fn mount_token(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .and(header("Metadata-Flavor", "Google"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.token",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

async fn mount_secret(server: &MockServer, value: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/{HOOK_VERSION}:access")))
        .and(header("authorization", "Bearer ya29.token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "projects/123/secrets/discord-hook/versions/3",
            "payload": {"data": STANDARD.encode(value), "dataCrc32c": "0"}
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn secret_manager(server: &MockServer) -> SecretManagerGetter {
    SecretManagerGetter::with_endpoints(server.uri(), server.uri())
}

#[tokio::test]
async fn env_getter_reads_variable() {
    std::env::set_var("SECRETS_TEST_ENV_HOOK", "https://hooks.test/env");

    let value = EnvSecretGetter
        .get_secret("SECRETS_TEST_ENV_HOOK")
        .await
        .unwrap();

    assert_eq!(value, "https://hooks.test/env");
}

#[tokio::test]
async fn env_getter_reports_missing_variable() {
    let err = EnvSecretGetter
        .get_secret("SECRETS_TEST_DEFINITELY_UNSET")
        .await
        .unwrap_err();

    assert!(matches!(err, SecretError::Fetch { resource, .. } if resource == "SECRETS_TEST_DEFINITELY_UNSET"));
}

#[tokio::test]
async fn file_getter_trims_contents() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hook"), "https://hooks.test/file\n").unwrap();

    let value = FileSecretGetter::with_base_dir(dir.path())
        .get_secret("hook")
        .await
        .unwrap();

    assert_eq!(value, "https://hooks.test/file");
}

#[tokio::test]
async fn scheme_getter_dispatches_by_prefix() {
    std::env::set_var("SECRETS_TEST_SCHEME_HOOK", "https://hooks.test/scheme-env");
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("hook");
    std::fs::write(&file, "https://hooks.test/scheme-file").unwrap();

    let getter = SchemeSecretGetter::new();

    assert_eq!(
        getter.get_secret("env:SECRETS_TEST_SCHEME_HOOK").await.unwrap(),
        "https://hooks.test/scheme-env"
    );
    assert_eq!(
        getter
            .get_secret(&format!("file:{}", file.display()))
            .await
            .unwrap(),
        "https://hooks.test/scheme-file"
    );
}

#[tokio::test]
async fn scheme_getter_rejects_unknown_or_missing_scheme() {
    let getter = SchemeSecretGetter::new();

    let err = getter.get_secret("hook-without-scheme").await.unwrap_err();
    assert!(matches!(err, SecretError::Fetch { resource, .. } if resource == "hook-without-scheme"));

    let err = getter.get_secret("vault:kv/hook").await.unwrap_err();
    assert!(err.to_string().contains("unsupported secret scheme"));
}

#[tokio::test]
async fn scheme_getter_reports_full_resource_on_failure() {
    let err = SchemeSecretGetter::new()
        .get_secret("env:SECRETS_TEST_ALSO_UNSET")
        .await
        .unwrap_err();

    assert!(matches!(err, SecretError::Fetch { resource, .. } if resource == "env:SECRETS_TEST_ALSO_UNSET"));
}

#[tokio::test]
async fn static_getter_serves_known_resources_only() {
    let getter = StaticSecretGetter::new().with("res/hook", "https://hooks.test/static");

    assert_eq!(
        getter.get_secret("res/hook").await.unwrap(),
        "https://hooks.test/static"
    );
    assert!(getter.get_secret("res/other").await.is_err());
}

#[tokio::test]
async fn secret_manager_decodes_payload_with_metadata_token() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_secret(&server, "https://discord.com/api/webhooks/1/token\n").await;

    let value = secret_manager(&server).get_secret(HOOK_VERSION).await.unwrap();

    assert_eq!(value, "https://discord.com/api/webhooks/1/token");
}

#[tokio::test]
async fn scheme_getter_sends_bare_resource_names_to_secret_manager() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_secret(&server, "https://discord.com/api/webhooks/2/token").await;

    let getter = SchemeSecretGetter::new().with_secret_manager(secret_manager(&server));

    assert_eq!(
        getter.get_secret(HOOK_VERSION).await.unwrap(),
        "https://discord.com/api/webhooks/2/token"
    );
}

#[tokio::test]
async fn secret_manager_reports_api_errors_against_the_resource() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/{HOOK_VERSION}:access")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = secret_manager(&server).get_secret(HOOK_VERSION).await.unwrap_err();

    assert!(matches!(err, SecretError::Fetch { resource, .. } if resource == HOOK_VERSION));
}

#[tokio::test]
async fn secret_manager_fails_without_a_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = secret_manager(&server).get_secret(HOOK_VERSION).await.unwrap_err();

    assert!(err.to_string().contains("metadata server"));
}

#[tokio::test]
async fn secret_manager_rejects_partial_names_before_any_request() {
    let server = MockServer::start().await;

    let err = secret_manager(&server)
        .get_secret("projects/my-project/secrets/discord-hook")
        .await
        .unwrap_err();

    assert!(matches!(err, SecretError::Fetch { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}
