use std::{
    fmt::{self, Debug},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures_core::future::BoxFuture;
use futures_util::FutureExt;
use tokio::{sync::Notify, task::JoinHandle};

use honeydew_proto::{
    codec,
    proto::{Ack, MsgProto, StartPosition, SubscriptionRequest, SubscriptionResponse},
    Subject,
};

use crate::bus::{Bus, BusError, BusSubscription};
use crate::client::{Client, Session, Status, SUBSCRIBE_TIMEOUT};
use crate::error::Error;
use crate::message::Message;

pub(crate) type MessageHandler = Box<dyn FnMut(Message) -> BoxFuture<'static, ()> + Send>;

/// A live subscription to a channel
///
/// Messages are delivered to the handler supplied at subscribe time, in
/// sequence order, exactly as the server sends them. The handle is cheap to
/// clone; every clone refers to the same subscription.
///
/// Obtained from [`Client::subscribe`].
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

pub(crate) struct SubscriptionInner {
    pub(crate) session: Weak<Session>,
    pub(crate) bus: Arc<dyn Bus>,
    pub(crate) subject: Subject,
    pub(crate) queue_group: Option<String>,
    pub(crate) durable_name: Option<String>,
    pub(crate) inbox: String,
    pub(crate) ack_inbox: String,
    pub(crate) manual_acks: bool,
    pub(crate) closed: AtomicBool,
    pub(crate) cancel: Notify,
    pub(crate) task: Mutex<Option<JoinHandle<()>>>,
}

/// Where in the channel's history a subscription begins
#[derive(Debug, Clone, Default)]
pub enum StartAt {
    /// Only messages published from now on
    #[default]
    NewOnly,
    /// The last message the channel received, then everything newer
    ///
    /// Valid on an empty channel: delivery starts with the next message.
    LastReceived,
    /// Full replay of every available message
    AllAvailable,
    /// Replay starting at the given sequence
    Sequence(u64),
    /// Replay starting at the given wall-clock instant
    ///
    /// Converted to a duration-before-now when the subscription is
    /// registered, so the server only ever sees a delta.
    Time(DateTime<Utc>),
    /// Replay starting a duration before now
    TimeDelta(Duration),
}

impl StartAt {
    pub(crate) fn encode(&self) -> (StartPosition, u64, i64) {
        match self {
            Self::NewOnly => (StartPosition::NewOnly, 0, 0),
            Self::LastReceived => (StartPosition::LastReceived, 0, 0),
            Self::AllAvailable => (StartPosition::First, 0, 0),
            Self::Sequence(sequence) => (StartPosition::SequenceStart, *sequence, 0),
            Self::Time(instant) => {
                let delta = Utc::now().signed_duration_since(*instant);
                let nanos = delta.num_nanoseconds().unwrap_or(i64::MAX).max(0);
                (StartPosition::TimeDeltaStart, 0, nanos)
            }
            Self::TimeDelta(delta) => {
                let nanos = i64::try_from(delta.as_nanos()).unwrap_or(i64::MAX);
                (StartPosition::TimeDeltaStart, 0, nanos)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SubscribeConfig {
    pub(crate) queue_group: Option<String>,
    pub(crate) durable_name: Option<String>,
    pub(crate) max_in_flight: i32,
    pub(crate) ack_wait: Duration,
    pub(crate) manual_acks: bool,
    pub(crate) start_at: StartAt,
}

impl Default for SubscribeConfig {
    fn default() -> Self {
        Self {
            queue_group: None,
            durable_name: None,
            max_in_flight: 1024,
            ack_wait: Duration::from_secs(30),
            manual_acks: false,
            start_at: StartAt::NewOnly,
        }
    }
}

impl SubscribeConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.max_in_flight <= 0 {
            return Err(Error::config("max_in_flight must be greater than zero"));
        }
        if self.ack_wait < Duration::from_secs(1) {
            return Err(Error::config("ack_wait must be at least one second"));
        }
        if matches!(&self.queue_group, Some(group) if group.is_empty()) {
            return Err(Error::config("queue_group must not be empty"));
        }
        if matches!(&self.durable_name, Some(name) if name.is_empty()) {
            return Err(Error::config("durable_name must not be empty"));
        }
        Ok(())
    }
}

/// Register a subscription with the server and start its delivery task.
pub(crate) async fn subscribe(
    client: &Client,
    subject: Subject,
    config: SubscribeConfig,
    handler: MessageHandler,
) -> Result<Subscription, Error> {
    let session = Arc::clone(client.session());
    session.check_open()?;
    config.validate()?;

    let inbox = session.bus.new_inbox();
    // Attach the bus subscription first so a message raced between the
    // server's reply and our bookkeeping isn't lost. Dropping it on any
    // failure path below detaches it again.
    let bus_subscription = session
        .bus
        .subscribe(inbox.clone())
        .await
        .map_err(Error::Bus)?;

    let (start_position, start_sequence, start_time_delta) = config.start_at.encode();
    let request = SubscriptionRequest {
        client_id: session.client_id.clone(),
        subject: subject.to_string(),
        q_group: config.queue_group.clone().unwrap_or_default(),
        inbox: inbox.clone(),
        max_in_flight: config.max_in_flight,
        ack_wait_in_secs: ack_wait_secs(config.ack_wait),
        durable_name: config.durable_name.clone().unwrap_or_default(),
        start_position: start_position as i32,
        start_sequence,
        start_time_delta,
    };

    let reply = match session
        .bus
        .request(
            session.subjects.sub_requests.clone(),
            codec::encode(&request),
            SUBSCRIBE_TIMEOUT,
        )
        .await
    {
        Ok(reply) => reply,
        Err(BusError::RequestTimeout) => {
            return Err(Error::SubscriptionRequest(
                "no reply within the subscribe timeout".to_owned(),
            ))
        }
        Err(err) => return Err(Error::Bus(err)),
    };
    let response = codec::decode::<SubscriptionResponse>(&reply.payload).map_err(Error::Decode)?;
    if !response.error.is_empty() {
        return Err(Error::SubscriptionRequest(response.error));
    }

    let inner = Arc::new(SubscriptionInner {
        session: Arc::downgrade(&session),
        bus: Arc::clone(&session.bus),
        subject,
        queue_group: config.queue_group,
        durable_name: config.durable_name,
        inbox: inbox.clone(),
        ack_inbox: response.ack_inbox,
        manual_acks: config.manual_acks,
        closed: AtomicBool::new(false),
        cancel: Notify::new(),
        task: Mutex::new(None),
    });

    session
        .registry
        .write()
        .unwrap()
        .insert(inbox.clone(), Arc::clone(&inner));

    // The session may have torn down while we were waiting on the server.
    if session.status() != Status::Open {
        session.registry.write().unwrap().remove(&inbox);
        return Err(session.terminal_error());
    }

    let task = tokio::spawn(deliver(Arc::clone(&inner), bus_subscription, handler));
    *inner.task.lock().unwrap() = Some(task);

    Ok(Subscription { inner })
}

fn ack_wait_secs(ack_wait: Duration) -> i32 {
    i32::try_from(ack_wait.as_secs()).unwrap_or(i32::MAX)
}

/// Per-subscription delivery loop.
///
/// Owns the bus subscription and the user handler; both go away when the
/// loop exits. Deliveries are processed strictly one at a time so the
/// handler observes messages in the order the server sent them.
async fn deliver(
    inner: Arc<SubscriptionInner>,
    mut bus_subscription: BusSubscription,
    mut handler: MessageHandler,
) {
    loop {
        let bus_message = tokio::select! {
            biased;
            () = inner.cancel.notified() => break,
            message = bus_subscription.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let proto = match codec::decode::<MsgProto>(&bus_message.payload) {
            Ok(proto) => proto,
            Err(err) => {
                log::warn!("dropping undecodable delivery on {}: {err}", inner.inbox);
                continue;
            }
        };
        let ack = Ack {
            subject: proto.subject.clone(),
            sequence: proto.sequence,
        };

        let message = Message::new(proto, Arc::clone(&inner));
        let outcome = std::panic::AssertUnwindSafe(handler(message))
            .catch_unwind()
            .await;

        if !inner.manual_acks {
            // The server reads silence as back-pressure, so the ack goes out
            // even when the handler failed. Consumers that want
            // at-least-once-with-retry semantics use manual acks.
            if let Err(err) = inner
                .bus
                .publish(inner.ack_inbox.clone(), codec::encode(&ack))
                .await
            {
                log::debug!("ack for {}#{} failed: {err}", ack.subject, ack.sequence);
            }
        }

        if let Err(panic) = outcome {
            std::panic::resume_unwind(panic);
        }
    }
}

impl Subscription {
    pub(crate) fn from_inner(inner: Arc<SubscriptionInner>) -> Self {
        Self { inner }
    }

    /// The channel this subscription delivers from
    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.inner.subject
    }

    /// The queue group this subscription participates in, if any
    #[must_use]
    pub fn queue_group(&self) -> Option<&str> {
        self.inner.queue_group.as_deref()
    }

    /// The durable name registered with the server, if any
    #[must_use]
    pub fn durable_name(&self) -> Option<&str> {
        self.inner.durable_name.as_deref()
    }

    /// Whether the subscription has been torn down
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Remove the subscription, forgetting durable state at the server
    ///
    /// A later subscribe with the same durable name starts over.
    ///
    /// # Errors
    ///
    /// It returns an error if the subscription is already torn down, the
    /// session is closed, or the server refuses the request.
    pub async fn unsubscribe(&self) -> Result<(), Error> {
        self.shutdown(false).await
    }

    /// Close the subscription, leaving durable state at the server intact
    ///
    /// A later subscribe with the same durable name resumes where
    /// acknowledgements stopped. Fails with [`Error::NoServerSupport`] when
    /// the server predates durable closes; callers may fall back to
    /// [`Subscription::unsubscribe`].
    ///
    /// # Errors
    ///
    /// It returns an error if the server does not support the operation,
    /// the subscription is already torn down, the session is closed, or the
    /// server refuses the request.
    pub async fn close(&self) -> Result<(), Error> {
        self.shutdown(true).await
    }

    async fn shutdown(&self, keep_durable: bool) -> Result<(), Error> {
        let Some(session) = self.inner.session.upgrade() else {
            return Err(Error::BadSubscription);
        };

        // Resolve the target before marking the subscription closed:
        // a missing server capability must leave it usable.
        let target = if keep_durable {
            let sub_close_requests = &session.subjects.sub_close_requests;
            if sub_close_requests.is_empty() {
                return Err(Error::NoServerSupport);
            }
            sub_close_requests.clone()
        } else {
            session.subjects.unsub_requests.clone()
        };

        session.check_open()?;
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::BadSubscription);
        }

        let request = honeydew_proto::proto::UnsubscribeRequest {
            client_id: session.client_id.clone(),
            subject: self.inner.subject.to_string(),
            inbox: self.inner.inbox.clone(),
            durable_name: self.inner.durable_name.clone().unwrap_or_default(),
        };
        let result = match session
            .bus
            .request(target, codec::encode(&request), SUBSCRIBE_TIMEOUT)
            .await
        {
            Ok(reply) => match codec::decode::<SubscriptionResponse>(&reply.payload) {
                Ok(response) if response.error.is_empty() => Ok(()),
                Ok(response) => Err(Error::SubscriptionRequest(response.error)),
                Err(err) => Err(Error::Decode(err)),
            },
            Err(BusError::RequestTimeout) => Err(Error::SubscriptionRequest(
                "no reply within the unsubscribe timeout".to_owned(),
            )),
            Err(err) => Err(Error::Bus(err)),
        };

        // Detach regardless of the server's verdict: the record is gone
        // from the registry either way and further operations fail with
        // a bad-subscription error.
        session.registry.write().unwrap().remove(&self.inner.inbox);
        self.inner.cancel.notify_one();

        result
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.inner.subject)
            .field("queue_group", &self.inner.queue_group)
            .field("durable_name", &self.inner.durable_name)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
