//! Contract with the core pub/sub bus the session is carried over.
//!
//! The streaming protocol only needs a handful of primitives from the
//! transport underneath it: fire-and-forget publish, deadlined
//! request/reply, subject subscriptions and inbox generation. [`Bus`]
//! captures exactly that surface so the session state machine never
//! depends on a concrete transport.
//!
//! The [`NatsBus`] adapter (feature `nats`, enabled by default) carries the
//! contract over a NATS connection.

use std::{fmt::Write, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngCore;
use tokio::sync::mpsc;

#[cfg(feature = "nats")]
pub use self::nats::NatsBus;

#[cfg(feature = "nats")]
mod nats;

/// A raw message delivered by the bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Subject the message was published to
    pub subject: String,
    /// Reply subject, when the publisher expects a response
    pub reply: Option<String>,
    /// Opaque payload
    pub payload: Bytes,
}

/// Connection state of the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    /// The bus is connected and passing messages
    Connected,
    /// The bus lost its connection and is trying to re-establish it
    Reconnecting,
    /// The bus has been closed
    Closed,
}

/// An error reported by the bus
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BusError {
    /// The bus connection is closed
    #[error("bus connection closed")]
    Closed,
    /// No reply arrived within the request deadline
    #[error("no reply within the request timeout")]
    RequestTimeout,
    /// The transport failed
    #[error("transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The core bus contract consumed by the streaming session
///
/// Implementations must be safe to share across tasks. Any caller-supplied
/// implementation must not buffer publishes while reconnecting
/// ([`Bus::reconnect_buffering`] must return `false`): buffered publishes
/// defeat the ack-wait semantics of the publish pipeline.
#[async_trait]
pub trait Bus: std::fmt::Debug + Send + Sync + 'static {
    /// Publish `payload` to `subject`, fire-and-forget
    async fn publish(&self, subject: String, payload: Bytes) -> Result<(), BusError>;

    /// Publish `payload` to `subject`, carrying `reply` as the reply subject
    ///
    /// The receiver may respond out of band on `reply`; the publish itself
    /// is still fire-and-forget.
    async fn publish_with_reply(
        &self,
        subject: String,
        reply: String,
        payload: Bytes,
    ) -> Result<(), BusError>;

    /// Publish `payload` to `subject` and await a single reply
    ///
    /// Resolves with [`BusError::RequestTimeout`] if no reply arrives
    /// within `timeout`.
    async fn request(
        &self,
        subject: String,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<BusMessage, BusError>;

    /// Start receiving messages published to `subject`
    async fn subscribe(&self, subject: String) -> Result<BusSubscription, BusError>;

    /// Generate a unique inbox subject
    fn new_inbox(&self) -> String;

    /// Current connection state
    fn state(&self) -> BusState;

    /// Whether publishes are buffered while the bus reconnects
    fn reconnect_buffering(&self) -> bool;

    /// Release the bus connection
    ///
    /// Only invoked by the session on buses it dialed itself.
    async fn close(&self);
}

/// A live bus subscription
///
/// Messages are received through [`BusSubscription::recv`]. Dropping the
/// subscription detaches it from the bus.
#[derive(Debug)]
pub struct BusSubscription {
    messages: mpsc::Receiver<BusMessage>,
    _detach: DetachGuard,
}

struct DetachGuard(Option<Box<dyn FnOnce() + Send>>);

impl BusSubscription {
    /// Assemble a subscription from a message channel and a detach action
    ///
    /// `on_detach` runs exactly once, when the subscription is dropped.
    pub fn new(
        messages: mpsc::Receiver<BusMessage>,
        on_detach: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            messages,
            _detach: DetachGuard(Some(Box::new(on_detach))),
        }
    }

    /// Receive the next message
    ///
    /// Returns `None` once the bus side of the subscription has gone away.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.messages.recv().await
    }
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        if let Some(detach) = self.0.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for DetachGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DetachGuard").finish()
    }
}

/// Number of messages a [`BusSubscription`] buffers before applying
/// backpressure to the delivering side.
pub(crate) const SUBSCRIPTION_CHANNEL_SIZE: usize = 256;

pub(crate) fn random_inbox(prefix: &str) -> String {
    let mut suffix = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut suffix);

    let mut subject = String::with_capacity(prefix.len() + ".".len() + (suffix.len() * 2));
    write!(&mut subject, "{}.{:032x}", prefix, u128::from_ne_bytes(suffix)).unwrap();
    subject
}
