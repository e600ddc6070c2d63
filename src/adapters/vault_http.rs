//! Vault HTTP adapter.
//!
//! AppRole login, raft snapshots streamed to disk, a lease watcher built on
//! `renew-self`, and KV v2 reads.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::credential::Credential;
use crate::error::{AuthError, SecretError, SnapshotError};
use crate::renewal::RenewalOutcome;
use crate::traits::{LeaseWatch, RoleCredentials, SecretStore, SnapshotArtifact};

/// Header carrying the client token.
pub const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Debug, Deserialize)]
struct AuthResponse {
    auth: Option<AuthInfo>,
}

#[derive(Debug, Deserialize)]
struct AuthInfo {
    client_token: String,
    #[serde(default)]
    accessor: Option<String>,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
}

#[derive(Debug, Deserialize)]
struct KvResponse {
    data: KvData,
}

#[derive(Debug, Deserialize)]
struct KvData {
    data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// Human-readable message from a Vault error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        _ => body.trim().to_string(),
    }
}

/// Renew once two thirds of the remaining lease have passed.
fn renew_delay(remaining: Duration) -> Duration {
    remaining.mul_f64(2.0 / 3.0)
}

/// Below this the renewed lease is considered exhausted.
fn grace_for(lease: Duration) -> Duration {
    (lease / 10).max(Duration::from_secs(1))
}

enum WatchState {
    Running {
        client: VaultClient,
        token: String,
        remaining: Duration,
        grace: Duration,
    },
    Done,
}

/// Vault client over reqwest.
#[derive(Debug, Clone)]
pub struct VaultClient {
    base_url: String,
    client: Client,
}

impl VaultClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_client(address, Client::new())
    }

    pub fn with_client(address: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: address.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST /v1/auth/token/renew-self
    async fn renew_self(&self, token: &str) -> Result<AuthInfo, AuthError> {
        let response = self
            .client
            .post(self.url("auth/token/renew-self"))
            .header(TOKEN_HEADER, token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        serde_json::from_str::<AuthResponse>(&text)
            .ok()
            .and_then(|r| r.auth)
            .ok_or(AuthError::MissingAuth)
    }

    /// Read one string key of a KV v2 secret.
    ///
    /// GET /v1/{mount}/data/{path}
    pub async fn read_kv_string(
        &self,
        credential: &Credential,
        mount: &str,
        path: &str,
        key: &str,
    ) -> Result<String, SecretError> {
        let url = self.url(&format!(
            "{}/data/{}",
            mount.trim_matches('/'),
            path.trim_matches('/')
        ));
        let response = self
            .client
            .get(&url)
            .header(TOKEN_HEADER, credential.token())
            .send()
            .await
            .map_err(|e| SecretError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SecretError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(SecretError::Request {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let missing = || SecretError::MissingKey {
            path: format!("{}/{}", mount, path),
            key: key.to_string(),
        };
        let parsed: KvResponse = serde_json::from_str(&text).map_err(|_| missing())?;
        parsed
            .data
            .data
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(missing)
    }
}

#[async_trait]
impl SecretStore for VaultClient {
    /// POST /v1/auth/approle/login
    async fn login(&self, role: &RoleCredentials) -> Result<Credential, AuthError> {
        if role.role_id.is_empty() {
            return Err(AuthError::MissingRoleCredential("role_id"));
        }
        if role.secret_id.is_empty() {
            return Err(AuthError::MissingRoleCredential("secret_id"));
        }

        let response = self
            .client
            .post(self.url("auth/approle/login"))
            .json(&serde_json::json!({
                "role_id": role.role_id,
                "secret_id": role.secret_id,
            }))
            .send()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let auth = serde_json::from_str::<AuthResponse>(&text)
            .ok()
            .and_then(|r| r.auth)
            .ok_or(AuthError::MissingAuth)?;
        tracing::debug!(accessor = auth.accessor.as_deref().unwrap_or("-"), "approle login succeeded");

        let credential = Credential::new(
            auth.client_token,
            Duration::from_secs(auth.lease_duration),
            auth.renewable,
        );
        Ok(match auth.accessor {
            Some(accessor) => credential.with_accessor(accessor),
            None => credential,
        })
    }

    async fn watch(&self, credential: Arc<Credential>) -> LeaseWatch {
        let lease = credential.lease_duration();

        // A zero lease never expires.
        if lease.is_zero() {
            return stream::pending::<RenewalOutcome>().boxed();
        }

        if !credential.is_renewable() {
            return stream::once(async move {
                tokio::time::sleep(renew_delay(lease)).await;
                RenewalOutcome::Expiring("credential is not renewable".to_string())
            })
            .boxed();
        }

        let initial = WatchState::Running {
            client: self.clone(),
            token: credential.token().to_string(),
            remaining: lease,
            grace: grace_for(lease),
        };

        stream::unfold(initial, |state| async move {
            let WatchState::Running {
                client,
                token,
                remaining,
                grace,
            } = state
            else {
                return None;
            };

            tokio::time::sleep(renew_delay(remaining)).await;
            match client.renew_self(&token).await {
                Ok(auth) => {
                    let renewed = Duration::from_secs(auth.lease_duration);
                    if renewed <= grace {
                        let cause = format!("lease no longer extends ({}s left)", renewed.as_secs());
                        Some((RenewalOutcome::Expiring(cause), WatchState::Done))
                    } else {
                        let next = WatchState::Running {
                            client,
                            token,
                            remaining: renewed,
                            grace,
                        };
                        Some((RenewalOutcome::Renewed(renewed), next))
                    }
                }
                Err(e) => Some((
                    RenewalOutcome::Expiring(format!("renewal failed: {}", e)),
                    WatchState::Done,
                )),
            }
        })
        .boxed()
    }

    /// GET /v1/sys/storage/raft/snapshot, streamed into `destination`.
    async fn snapshot(
        &self,
        credential: &Credential,
        destination: &Path,
    ) -> Result<SnapshotArtifact, SnapshotError> {
        let response = self
            .client
            .get(self.url("sys/storage/raft/snapshot"))
            .header(TOKEN_HEADER, credential.token())
            .send()
            .await
            .map_err(|e| SnapshotError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SnapshotError::Request {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let io_error = |source| SnapshotError::Io {
            path: destination.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(io_error)?;

        let mut size_bytes = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| SnapshotError::Transport(e.to_string()))?;
            file.write_all(&chunk).await.map_err(io_error)?;
            size_bytes += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error)?;

        Ok(SnapshotArtifact {
            path: destination.to_path_buf(),
            size_bytes,
            created_at: Utc::now(),
        })
    }
}
