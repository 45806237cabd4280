use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::{sync::mpsc, task::JoinHandle, time};

use super::{Bus, BusError, BusMessage, BusState, BusSubscription, SUBSCRIPTION_CHANNEL_SIZE};

/// [`Bus`] adapter over a NATS connection
///
/// This is the transport the streaming protocol was designed for. The
/// adapter dials with the stock client options, which fail publishes
/// instead of growing an unbounded buffer while the connection is down.
#[derive(Debug, Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Dial the NATS server(s) at `url`
    ///
    /// `url` accepts a single address or a comma-separated list.
    ///
    /// # Errors
    ///
    /// It returns an error if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|err| BusError::Transport(Box::new(err)))?;
        Ok(Self { client })
    }

    /// Wrap an already established NATS client
    #[must_use]
    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Access the underlying NATS client
    #[must_use]
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<(), BusError> {
        self.client
            .publish(subject, payload)
            .await
            .map_err(|err| BusError::Transport(Box::new(err)))
    }

    async fn publish_with_reply(
        &self,
        subject: String,
        reply: String,
        payload: Bytes,
    ) -> Result<(), BusError> {
        self.client
            .publish_with_reply(subject, reply, payload)
            .await
            .map_err(|err| BusError::Transport(Box::new(err)))
    }

    async fn request(
        &self,
        subject: String,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<BusMessage, BusError> {
        let reply = time::timeout(timeout, self.client.request(subject, payload))
            .await
            .map_err(|_elapsed| BusError::RequestTimeout)?
            .map_err(|err| match err.kind() {
                async_nats::RequestErrorKind::TimedOut => BusError::RequestTimeout,
                _ => BusError::Transport(Box::new(err)),
            })?;

        Ok(BusMessage {
            subject: reply.subject.to_string(),
            reply: reply.reply.as_ref().map(ToString::to_string),
            payload: reply.payload,
        })
    }

    async fn subscribe(&self, subject: String) -> Result<BusSubscription, BusError> {
        let mut subscriber = self
            .client
            .subscribe(subject)
            .await
            .map_err(|err| BusError::Transport(Box::new(err)))?;

        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_CHANNEL_SIZE);
        let pump: JoinHandle<()> = tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                let message = BusMessage {
                    subject: message.subject.to_string(),
                    reply: message.reply.as_ref().map(ToString::to_string),
                    payload: message.payload,
                };
                if sender.send(message).await.is_err() {
                    break;
                }
            }
        });

        // Aborting the pump drops the subscriber, which lazily
        // unsubscribes from the server.
        Ok(BusSubscription::new(receiver, move || pump.abort()))
    }

    fn new_inbox(&self) -> String {
        self.client.new_inbox()
    }

    fn state(&self) -> BusState {
        match self.client.connection_state() {
            async_nats::connection::State::Connected => BusState::Connected,
            _ => BusState::Reconnecting,
        }
    }

    fn reconnect_buffering(&self) -> bool {
        false
    }

    async fn close(&self) {
        if let Err(err) = self.client.flush().await {
            log::debug!("flush on bus close failed: {err}");
        }
    }
}
