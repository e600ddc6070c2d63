//! Mock push event feed for testing.
//!
//! Each scripted subscription hands back a [`MockFeed`] used to inject
//! messages and read errors into the stream the push source owns.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::credential::Credential;
use crate::error::PushError;
use crate::traits::{EventStream, EventSubscriber};

/// Test-side handle of one mock subscription.
pub struct MockFeed {
    tx: mpsc::UnboundedSender<Result<String, PushError>>,
    closed: Arc<AtomicBool>,
}

impl MockFeed {
    pub fn send_text(&self, text: &str) {
        let _ = self.tx.send(Ok(text.to_string()));
    }

    /// Inject a push event with the given `data.event_type`.
    pub fn send_event(&self, event_type: &str) {
        self.send_text(&serde_json::json!({ "data": { "event_type": event_type } }).to_string());
    }

    pub fn send_error(&self, error: PushError) {
        let _ = self.tx.send(Err(error));
    }

    /// End the stream as if the server hung up.
    pub fn end(self) {}

    /// Whether the owning source closed the stream.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockEventStream {
    rx: mpsc::UnboundedReceiver<Result<String, PushError>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl EventStream for MockEventStream {
    async fn next_message(&mut self) -> Option<Result<String, PushError>> {
        self.rx.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.close();
    }
}

enum Scripted {
    Stream(MockEventStream),
    Fail(PushError),
}

/// Mock subscriber with scripted subscription results.
///
/// An unscripted `subscribe` fails with `ConnectFailed`.
#[derive(Clone, Default)]
pub struct MockEventSubscriber {
    scripted: Arc<Mutex<VecDeque<Scripted>>>,
    tokens: Arc<Mutex<Vec<String>>>,
}

impl MockEventSubscriber {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful subscription and return its feed handle.
    pub fn push_feed(&self) -> MockFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        self.scripted
            .lock()
            .unwrap()
            .push_back(Scripted::Stream(MockEventStream {
                rx,
                closed: Arc::clone(&closed),
            }));
        MockFeed { tx, closed }
    }

    /// Script a failed subscription.
    pub fn push_failure(&self, error: PushError) {
        self.scripted.lock().unwrap().push_back(Scripted::Fail(error));
    }

    /// Tokens used by every subscribe call, in order.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSubscriber for MockEventSubscriber {
    async fn subscribe(&self, credential: &Credential) -> Result<Box<dyn EventStream>, PushError> {
        self.tokens
            .lock()
            .unwrap()
            .push(credential.token().to_string());
        let next = self.scripted.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Stream(stream)) => Ok(Box::new(stream)),
            Some(Scripted::Fail(error)) => Err(error),
            None => Err(PushError::ConnectFailed(
                "no scripted subscription".to_string(),
            )),
        }
    }
}
