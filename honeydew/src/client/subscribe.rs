use std::{future::Future, time::Duration};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;

use honeydew_proto::Subject;

use crate::client::Client;
use crate::error::Error;
use crate::message::Message;
use crate::subscription::{self, StartAt, SubscribeConfig, Subscription};

/// A constructor for a subscription on the given client
///
/// Obtained from [`Client::subscribe`]. Option methods may be chained in
/// any order; [`ClientSubscribe::handler`] registers the subscription with
/// the server.
#[must_use = "a subscription is only created once `handler` is called"]
#[derive(Debug)]
pub struct ClientSubscribe {
    client: Client,
    subject: Subject,
    config: SubscribeConfig,
}

impl ClientSubscribe {
    pub(crate) fn build(client: Client, subject: Subject) -> Self {
        Self {
            client,
            subject,
            config: SubscribeConfig::default(),
        }
    }

    /// Join a queue group
    ///
    /// The server load-balances a channel's messages across all
    /// subscriptions sharing `(subject, queue_group)`.
    pub fn queue_group(mut self, queue_group: impl Into<String>) -> Self {
        self.config.queue_group = Some(queue_group.into());
        self
    }

    /// Name a durable subscription
    ///
    /// Durable state survives [`Subscription::close`] so a later subscribe
    /// with the same name resumes where acknowledgements stopped.
    pub fn durable_name(mut self, durable_name: impl Into<String>) -> Self {
        self.config.durable_name = Some(durable_name.into());
        self
    }

    /// Maximum unacknowledged deliveries the server keeps in flight
    ///
    /// Default: 1024
    pub fn max_in_flight(mut self, max_in_flight: i32) -> Self {
        self.config.max_in_flight = max_in_flight;
        self
    }

    /// How long the server waits for an ack before redelivering
    ///
    /// Must be at least one second. Default: 30 seconds
    pub fn ack_wait(mut self, ack_wait: Duration) -> Self {
        self.config.ack_wait = ack_wait;
        self
    }

    /// Disable automatic acknowledgements
    ///
    /// The application acknowledges each delivery itself through
    /// [`Message::ack`].
    pub fn manual_acks(mut self) -> Self {
        self.config.manual_acks = true;
        self
    }

    /// Start with the message at `sequence`
    pub fn start_at_sequence(mut self, sequence: u64) -> Self {
        self.config.start_at = StartAt::Sequence(sequence);
        self
    }

    /// Start with the first message published at or after `instant`
    pub fn start_at_time(mut self, instant: DateTime<Utc>) -> Self {
        self.config.start_at = StartAt::Time(instant);
        self
    }

    /// Start with messages published at most `delta` ago
    pub fn start_at_time_delta(mut self, delta: Duration) -> Self {
        self.config.start_at = StartAt::TimeDelta(delta);
        self
    }

    /// Replay every available message on the channel
    pub fn deliver_all_available(mut self) -> Self {
        self.config.start_at = StartAt::AllAvailable;
        self
    }

    /// Start with the last message the channel received
    pub fn start_with_last_received(mut self) -> Self {
        self.config.start_at = StartAt::LastReceived;
        self
    }

    /// Register the subscription, delivering messages to `handler`
    ///
    /// The handler runs on the subscription's delivery task with no
    /// session locks held, one message at a time in sequence order; it may
    /// freely call back into the client.
    ///
    /// # Errors
    ///
    /// It returns an error if an option is out of range, the session is
    /// closed, or the server rejects the subscription.
    pub async fn handler<F, Fut>(self, handler: F) -> Result<Subscription, Error>
    where
        F: FnMut(Message) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut handler = handler;
        subscription::subscribe(
            &self.client,
            self.subject,
            self.config,
            Box::new(move |message| handler(message).boxed()),
        )
        .await
    }
}
