use std::{
    fmt::{self, Debug},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use honeydew_proto::{codec, proto};

use crate::error::Error;
use crate::subscription::{Subscription, SubscriptionInner};

/// A message delivered to a subscription
///
/// Immutable once delivered. The message knows which local subscription it
/// arrived through, which is how queue-group members tell their deliveries
/// apart and how [`Message::ack`] finds its ack inbox.
pub struct Message {
    sequence: u64,
    subject: String,
    payload: Bytes,
    timestamp: i64,
    redelivered: bool,
    redelivery_count: u32,
    acked: AtomicBool,
    subscription: Arc<SubscriptionInner>,
}

impl Message {
    pub(crate) fn new(proto: proto::MsgProto, subscription: Arc<SubscriptionInner>) -> Self {
        Self {
            sequence: proto.sequence,
            subject: proto.subject,
            payload: proto.data,
            timestamp: proto.timestamp,
            redelivered: proto.redelivered,
            redelivery_count: proto.redelivery_count,
            acked: AtomicBool::new(false),
            subscription,
        }
    }

    /// Position of the message in its channel, starting at 1
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The channel the message was published to
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Publish timestamp in nanoseconds since the Unix epoch
    #[must_use]
    pub fn timestamp_nanos(&self) -> i64 {
        self.timestamp
    }

    /// Publish timestamp as a UTC wall-clock instant
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.timestamp)
    }

    /// Whether the server has delivered this message before
    ///
    /// Surfaced verbatim from the server; the client never suppresses
    /// duplicates.
    #[must_use]
    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    /// How many times the server re-delivered this message
    #[must_use]
    pub fn redelivery_count(&self) -> u32 {
        self.redelivery_count
    }

    /// The local subscription this message was delivered through
    #[must_use]
    pub fn subscription(&self) -> Subscription {
        Subscription::from_inner(Arc::clone(&self.subscription))
    }

    /// Acknowledge the message
    ///
    /// Only valid on subscriptions created with manual acks; the
    /// acknowledgement is published at most once, later calls are no-ops.
    /// A failed ack publish is not surfaced: the server redelivers the
    /// message after the subscription's ack wait.
    ///
    /// # Errors
    ///
    /// It returns an error if the subscription auto-acks or has been
    /// torn down.
    pub async fn ack(&self) -> Result<(), Error> {
        if !self.subscription.manual_acks {
            return Err(Error::ManualAck);
        }
        if self.subscription.closed.load(Ordering::Acquire) {
            return Err(Error::BadSubscription);
        }
        if self.acked.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let ack = proto::Ack {
            subject: self.subject.clone(),
            sequence: self.sequence,
        };
        if let Err(err) = self
            .subscription
            .bus
            .publish(self.subscription.ack_inbox.clone(), codec::encode(&ack))
            .await
        {
            log::debug!("manual ack for {}#{} failed: {err}", self.subject, self.sequence);
        }
        Ok(())
    }
}

impl Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("sequence", &self.sequence)
            .field("subject", &self.subject)
            .field("payload_len", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .field("redelivery_count", &self.redelivery_count)
            .finish_non_exhaustive()
    }
}
