//! Webhook notifier adapter.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::NotifyError;
use crate::traits::Notifier;

/// POSTs `{"subject": ..., "body": ...}` to a configured URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "subject": subject, "body": body }))
            .send()
            .await
            .map_err(|e| NotifyError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError(format!("webhook returned {}: {}", status, message.trim())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_posts_subject_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(serde_json::json!({
                "subject": "Vault backup failed",
                "body": "upload failed"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.uri()));
        notifier
            .notify("Vault backup failed", "upload failed")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri());
        let err = notifier.notify("s", "b").await.unwrap_err();
        assert_eq!(err.to_string(), "notification failed: webhook returned 500: down");
    }
}
