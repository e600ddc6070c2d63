//! Tungstenite-based event feed adapter.
//!
//! Dials `<base>/v1/sys/events/subscribe/<event_type>?json=true` with the
//! client token in the `X-Vault-Token` header.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::vault_http::TOKEN_HEADER;
use crate::credential::Credential;
use crate::error::PushError;
use crate::traits::{EventStream, EventSubscriber};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens event subscriptions over a websocket.
#[derive(Debug, Clone)]
pub struct TungsteniteSubscriber {
    base_url: String,
    event_type: String,
}

impl TungsteniteSubscriber {
    pub fn new(base_url: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            event_type: event_type.into(),
        }
    }

    pub fn subscription_url(&self) -> String {
        format!(
            "{}/v1/sys/events/subscribe/{}?json=true",
            self.base_url, self.event_type
        )
    }
}

#[async_trait]
impl EventSubscriber for TungsteniteSubscriber {
    async fn subscribe(&self, credential: &Credential) -> Result<Box<dyn EventStream>, PushError> {
        let url = self.subscription_url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| PushError::ConnectFailed(e.to_string()))?;
        let token = HeaderValue::from_str(credential.token())
            .map_err(|e| PushError::ConnectFailed(format!("invalid token header: {}", e)))?;
        request.headers_mut().insert(TOKEN_HEADER, token);

        let (socket, _) = connect_async(request)
            .await
            .map_err(|e| PushError::ConnectFailed(e.to_string()))?;
        tracing::info!(url = %url, "connected to event feed");
        Ok(Box::new(TungsteniteEventStream { socket }))
    }
}

/// One open websocket subscription.
pub struct TungsteniteEventStream {
    socket: Socket,
}

#[async_trait]
impl EventStream for TungsteniteEventStream {
    async fn next_message(&mut self) -> Option<Result<String, PushError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(data)) => {
                    return Some(
                        String::from_utf8(data).map_err(|e| PushError::Decode(e.to_string())),
                    )
                }
                Ok(Message::Ping(data)) => {
                    tracing::debug!("received ping, sending pong");
                    if let Err(e) = self.socket.send(Message::Pong(data)).await {
                        return Some(Err(PushError::ConnectionLost(e.to_string())));
                    }
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "event feed sent close frame");
                    return None;
                }
                Ok(_) => {}
                Err(e) => return Some(Err(PushError::ConnectionLost(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            tracing::debug!(error = %e, "error closing event feed");
        }
    }
}
