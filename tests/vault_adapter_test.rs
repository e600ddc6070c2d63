//! Vault HTTP adapter against a wiremock server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use vault_backup::adapters::vault_http::TOKEN_HEADER;
use vault_backup::adapters::VaultClient;
use vault_backup::credential::Credential;
use vault_backup::error::{AuthError, SecretError, SnapshotError};
use vault_backup::renewal::RenewalOutcome;
use vault_backup::traits::{RoleCredentials, SecretStore};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn auth_body(token: &str, lease: u64, renewable: bool) -> serde_json::Value {
    serde_json::json!({
        "auth": {
            "client_token": token,
            "accessor": "accessor-1",
            "lease_duration": lease,
            "renewable": renewable
        }
    })
}

#[tokio::test]
async fn test_approle_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .and(body_json(serde_json::json!({"role_id": "role", "secret_id": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_body("s.token", 3600, true)))
        .expect(1)
        .mount(&server)
        .await;

    let client = VaultClient::new(server.uri());
    let credential = client
        .login(&RoleCredentials::new("role", "secret"))
        .await
        .unwrap();

    assert_eq!(credential.token(), "s.token");
    assert_eq!(credential.accessor(), Some("accessor-1"));
    assert_eq!(credential.lease_duration(), Duration::from_secs(3600));
    assert!(credential.is_renewable());
}

#[tokio::test]
async fn test_login_rejection_carries_vault_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"errors": ["invalid role or secret ID"]})),
        )
        .mount(&server)
        .await;

    let err = VaultClient::new(server.uri())
        .login(&RoleCredentials::new("role", "wrong"))
        .await
        .unwrap_err();
    match err {
        AuthError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "invalid role or secret ID");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_login_without_secret_id_is_not_sent() {
    let server = MockServer::start().await;
    let err = VaultClient::new(server.uri())
        .login(&RoleCredentials::new("role", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::MissingRoleCredential("secret_id")));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_snapshot_is_streamed_to_disk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/storage/raft/snapshot"))
        .and(header(TOKEN_HEADER, "s.token"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("1700000000.snap");
    let credential = Credential::new("s.token", Duration::from_secs(60), true);

    let artifact = VaultClient::new(server.uri())
        .snapshot(&credential, &destination)
        .await
        .unwrap();

    assert_eq!(artifact.size_bytes, 4096);
    assert_eq!(artifact.path, destination);
    assert_eq!(std::fs::read(&destination).unwrap().len(), 4096);
}

#[tokio::test]
async fn test_snapshot_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/storage/raft/snapshot"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(serde_json::json!({"errors": ["permission denied"]})),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let credential = Credential::new("s.token", Duration::from_secs(60), true);
    let err = VaultClient::new(server.uri())
        .snapshot(&credential, &dir.path().join("x.snap"))
        .await
        .unwrap_err();
    assert!(matches!(err, SnapshotError::Request { status: 403, .. }));
}

#[tokio::test]
async fn test_kv_read_of_storage_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/backup/drive"))
        .and(header(TOKEN_HEADER, "s.token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {"data": {"access_token": "ya29.token"}, "metadata": {"version": 3}}
        })))
        .mount(&server)
        .await;

    let client = VaultClient::new(server.uri());
    let credential = Credential::new("s.token", Duration::from_secs(60), true);

    let token = client
        .read_kv_string(&credential, "secret", "backup/drive", "access_token")
        .await
        .unwrap();
    assert_eq!(token, "ya29.token");

    let err = client
        .read_kv_string(&credential, "secret", "backup/drive", "refresh_token")
        .await
        .unwrap_err();
    assert!(matches!(err, SecretError::MissingKey { .. }));
}

#[tokio::test]
async fn test_watch_reports_renewal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/token/renew-self"))
        .and(header(TOKEN_HEADER, "s.token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_body("s.token", 3600, true)))
        .mount(&server)
        .await;

    let credential = Arc::new(Credential::new("s.token", Duration::from_secs(1), true));
    let mut watch = VaultClient::new(server.uri()).watch(credential).await;

    let outcome = watch.next().await.unwrap();
    assert_eq!(outcome, RenewalOutcome::Renewed(Duration::from_secs(3600)));
}

#[tokio::test]
async fn test_watch_reports_expiry_when_lease_stops_extending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/token/renew-self"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_body("s.token", 1, true)))
        .mount(&server)
        .await;

    let credential = Arc::new(Credential::new("s.token", Duration::from_secs(1), true));
    let mut watch = VaultClient::new(server.uri()).watch(credential).await;

    assert!(matches!(watch.next().await, Some(RenewalOutcome::Expiring(_))));
    assert!(watch.next().await.is_none());
}

#[tokio::test]
async fn test_watch_reports_expiry_when_renewal_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/token/renew-self"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let credential = Arc::new(Credential::new("s.token", Duration::from_secs(1), true));
    let mut watch = VaultClient::new(server.uri()).watch(credential).await;

    match watch.next().await {
        Some(RenewalOutcome::Expiring(cause)) => assert!(cause.contains("renewal failed")),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_non_renewable_credential_expires_without_renewing() {
    let server = MockServer::start().await;
    let credential = Arc::new(Credential::new("s.token", Duration::from_secs(1), false));
    let mut watch = VaultClient::new(server.uri()).watch(credential).await;

    assert!(matches!(watch.next().await, Some(RenewalOutcome::Expiring(_))));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
