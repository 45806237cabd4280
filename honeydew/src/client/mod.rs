use std::{
    collections::HashMap,
    fmt::{self, Debug},
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use bytes::Bytes;
use tokio::{sync::oneshot, task::JoinHandle, time};

use honeydew_proto::{
    codec, discover_subject,
    proto::{CloseRequest, CloseResponse, ConnectRequest, ConnectResponse, PubMsg},
    publish_subject, Subject, PROTOCOL_ONE,
};

pub use self::builder::{ClientBuilder, ConnectionLostHandler};
pub use self::publisher::PublishAckFuture;
pub(crate) use self::publisher::Publisher;
pub use self::subscribe::ClientSubscribe;
use crate::bus::{Bus, BusError, BusState, BusSubscription};
use crate::error::Error;
use crate::subscription::SubscriptionInner;

mod ack;
mod builder;
mod pinger;
mod publisher;
mod subscribe;

#[cfg(feature = "from-env")]
mod from_env;

/// Deadline for subscription registration and teardown requests.
pub(crate) const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Deadline for the best-effort session close request.
const CLOSE_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// How long teardown waits for delivery tasks and ack callbacks before
/// aborting them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A streaming session
///
/// `Client` is a `Clone`able handle to one logical session, identified by a
/// `(cluster_id, client_id)` pair and multiplexed over a single core bus
/// connection. Dropping the last handle tears the session down locally;
/// call [`Client::close`] to also release the server-side state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    session: Arc<Session>,
    heartbeat: JoinHandle<()>,
    acks: JoinHandle<()>,
    pinger: Option<JoinHandle<()>>,
}

/// Shared state of a session, owned by [`ClientInner`] and referenced by
/// the publish futures, the background tasks and the subscriptions.
pub(crate) struct Session {
    pub(crate) bus: Arc<dyn Bus>,
    owned_bus: bool,
    pub(crate) client_id: String,
    cluster_id: String,
    pub(crate) conn_id: Vec<u8>,
    /// Reply subject carried on every publish; the server sends
    /// [`PubAck`]s here.
    ///
    /// [`PubAck`]: honeydew_proto::proto::PubAck
    ack_inbox: String,
    pub(crate) subjects: ServerSubjects,
    ack_timeout: Duration,
    status: RwLock<Status>,
    lost_reason: Mutex<Option<String>>,
    pub(crate) publisher: Publisher,
    pub(crate) registry: RwLock<HashMap<String, Arc<SubscriptionInner>>>,
}

/// Subject table discovered through the handshake.
pub(crate) struct ServerSubjects {
    pub(crate) pub_prefix: String,
    pub(crate) sub_requests: String,
    pub(crate) unsub_requests: String,
    pub(crate) close_requests: String,
    pub(crate) sub_close_requests: String,
    pub(crate) ping_requests: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Open,
    Closing,
    Closed,
}

impl Session {
    pub(crate) fn status(&self) -> Status {
        *self.status.read().unwrap()
    }

    pub(crate) fn check_open(&self) -> Result<(), Error> {
        match self.status() {
            Status::Open => Ok(()),
            Status::Closing | Status::Closed => Err(self.terminal_error()),
        }
    }

    /// The error public operations observe once the session is over:
    /// connection-lost when the ping loop declared it, closed otherwise.
    pub(crate) fn terminal_error(&self) -> Error {
        match self.lost_reason.lock().unwrap().clone() {
            Some(reason) => Error::ConnectionLost { reason },
            None => Error::Closed,
        }
    }

    /// Transition to `Closing`; returns `false` when another teardown
    /// already won the race.
    fn begin_close(&self) -> bool {
        let mut status = self.status.write().unwrap();
        match *status {
            Status::Open => {
                *status = Status::Closing;
                true
            }
            Status::Closing | Status::Closed => false,
        }
    }

    fn finish_close(&self) {
        *self.status.write().unwrap() = Status::Closed;
    }

    /// Remove every subscription from the registry and signal its delivery
    /// task to stop. Purely local: no server round-trips.
    fn detach_subscriptions(&self) -> Vec<Arc<SubscriptionInner>> {
        let drained = {
            let mut registry = self.registry.write().unwrap();
            registry.drain().map(|(_, inner)| inner).collect::<Vec<_>>()
        };
        for inner in &drained {
            inner
                .closed
                .store(true, std::sync::atomic::Ordering::Release);
            inner.cancel.notify_one();
        }
        drained
    }
}

/// Tear the session down after the ping loop gave up on it.
///
/// The connection-lost handler runs last, once everything is unblocked, so
/// it may call back into the client without deadlocking.
pub(crate) async fn declare_lost(
    session: &Arc<Session>,
    reason: String,
    handler: Option<ConnectionLostHandler>,
) {
    if !session.begin_close() {
        return;
    }
    log::error!("session lost: {reason}");
    *session.lost_reason.lock().unwrap() = Some(reason.clone());

    session.publisher.fail_all(|| Error::ConnectionLost {
        reason: reason.clone(),
    });
    let detached = session.detach_subscriptions();
    join_delivery_tasks(detached).await;
    session.publisher.drain_callbacks(DRAIN_TIMEOUT).await;
    session.finish_close();

    if let Some(handler) = handler {
        handler(Error::ConnectionLost { reason });
    }
}

async fn join_delivery_tasks(subscriptions: Vec<Arc<SubscriptionInner>>) {
    for inner in subscriptions {
        let task = inner.task.lock().unwrap().take();
        if let Some(mut task) = task {
            if time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err() {
                task.abort();
            }
        }
    }
}

/// Answer the server's liveness beacons with an empty reply.
async fn run_heartbeat(bus: Arc<dyn Bus>, mut beacons: BusSubscription) {
    while let Some(beacon) = beacons.recv().await {
        let Some(reply) = beacon.reply else { continue };
        if let Err(err) = bus.publish(reply, Bytes::new()).await {
            log::debug!("heartbeat reply failed: {err}");
        }
    }
}

#[cfg(feature = "nats")]
async fn default_bus(nats_url: &str) -> Result<Arc<dyn Bus>, Error> {
    let bus = crate::bus::NatsBus::connect(nats_url).await.map_err(Error::Bus)?;
    Ok(Arc::new(bus))
}

#[cfg(not(feature = "nats"))]
async fn default_bus(_nats_url: &str) -> Result<Arc<dyn Bus>, Error> {
    Err(Error::config(
        "no bus connection supplied and the `nats` feature is disabled",
    ))
}

impl Client {
    /// Construct a new client
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(super) async fn connect(
        cluster_id: String,
        client_id: String,
        mut builder: ClientBuilder,
    ) -> Result<Self, Error> {
        builder.validate()?;

        let (bus, owned_bus) = match builder.bus.take() {
            Some(bus) => {
                if bus.reconnect_buffering() {
                    return Err(Error::config(
                        "the supplied bus connection buffers publishes while reconnecting",
                    ));
                }
                (bus, false)
            }
            None => (default_bus(&builder.nats_url).await?, true),
        };
        if bus.state() == BusState::Closed {
            return Err(Error::Bus(BusError::Closed));
        }

        let heartbeat_inbox = bus.new_inbox();
        let ack_inbox = bus.new_inbox();
        let conn_id = publisher::new_guid().into_bytes();

        let heartbeat_sub = bus
            .subscribe(heartbeat_inbox.clone())
            .await
            .map_err(Error::Bus)?;
        let ack_sub = bus.subscribe(ack_inbox.clone()).await.map_err(Error::Bus)?;

        let request = ConnectRequest {
            client_id: client_id.clone(),
            heartbeat_inbox,
            protocol: PROTOCOL_ONE,
            conn_id: conn_id.clone(),
            ping_interval: whole_seconds(builder.ping_interval),
            ping_max_out: builder.ping_max_out,
        };
        let reply = match bus
            .request(
                discover_subject(&builder.discover_prefix, &cluster_id),
                codec::encode(&request),
                builder.connect_timeout,
            )
            .await
        {
            Ok(reply) => reply,
            Err(BusError::RequestTimeout) => {
                return Err(Error::ConnectRequestTimeout { cluster_id })
            }
            Err(err) => return Err(Error::Bus(err)),
        };
        let response = codec::decode::<ConnectResponse>(&reply.payload).map_err(Error::Decode)?;
        if !response.error.is_empty() {
            return Err(Error::ConnectRequest(response.error));
        }
        log::debug!(
            "session {client_id}@{cluster_id} open, publishing under {}",
            response.pub_prefix
        );

        // The server's ping parameters are authoritative.
        let ping_interval = if response.ping_interval > 0 {
            Duration::from_secs(u64::try_from(response.ping_interval).unwrap_or(u64::MAX))
        } else {
            builder.ping_interval
        };
        let ping_max_out = if response.ping_max_out > 0 {
            response.ping_max_out
        } else {
            builder.ping_max_out
        };

        let count_limit = match usize::try_from(builder.pub_ack_pending_message_limit) {
            Ok(limit) if limit > 0 => builder.max_pub_acks_in_flight.min(limit),
            _ => builder.max_pub_acks_in_flight,
        };
        let bytes_limit = usize::try_from(builder.pub_ack_pending_bytes_limit)
            .ok()
            .filter(|&limit| limit > 0);

        let session = Arc::new(Session {
            bus: Arc::clone(&bus),
            owned_bus,
            client_id,
            cluster_id,
            conn_id,
            ack_inbox,
            subjects: ServerSubjects {
                pub_prefix: response.pub_prefix,
                sub_requests: response.sub_requests,
                unsub_requests: response.unsub_requests,
                close_requests: response.close_requests,
                sub_close_requests: response.sub_close_requests,
                ping_requests: response.ping_requests,
            },
            ack_timeout: builder.ack_timeout,
            status: RwLock::new(Status::Open),
            lost_reason: Mutex::new(None),
            publisher: Publisher::new(count_limit, bytes_limit),
            registry: RwLock::new(HashMap::new()),
        });

        let heartbeat = tokio::spawn(run_heartbeat(Arc::clone(&bus), heartbeat_sub));
        let acks = tokio::spawn(ack::run(Arc::clone(&session), ack_sub));
        let pinger = if session.subjects.ping_requests.is_empty() {
            // Pre-ping server: liveness rests on its heartbeat beacons.
            None
        } else {
            Some(tokio::spawn(
                pinger::Pinger {
                    session: Arc::clone(&session),
                    interval: ping_interval,
                    max_out: ping_max_out,
                    on_lost: builder.connection_lost.take(),
                }
                .run(),
            ))
        };

        Ok(Self {
            inner: Arc::new(ClientInner {
                session,
                heartbeat,
                acks,
                pinger,
            }),
        })
    }

    /// Publish `payload` to `subject` and wait for the acknowledgement
    ///
    /// Returns the guid assigned to the publish once the server has
    /// persisted the message.
    ///
    /// # Errors
    ///
    /// It returns an error if the session is closed or lost, the
    /// acknowledgement does not arrive within the ack timeout, or the
    /// server refuses the publish.
    pub async fn publish(&self, subject: Subject, payload: Bytes) -> Result<String, Error> {
        self.publish_acked(subject, payload).await?.await
    }

    /// Publish `payload` to `subject`, delivering the acknowledgement to
    /// `on_ack`
    ///
    /// Returns the assigned guid as soon as the publish is enqueued.
    /// `on_ack` receives the same guid and, on failure, the error that
    /// terminated the publish. It is invoked exactly once, from a worker
    /// task, never after [`Client::close`] has returned.
    ///
    /// # Errors
    ///
    /// It returns an error if the session is closed or lost, or the
    /// publish cannot be admitted within the ack timeout.
    pub async fn publish_with_handler<F>(
        &self,
        subject: Subject,
        payload: Bytes,
        on_ack: F,
    ) -> Result<String, Error>
    where
        F: FnOnce(String, Option<Error>) + Send + 'static,
    {
        let ack = self.publish_acked(subject, payload).await?;
        let guid = ack.guid().to_owned();

        let callback_guid = guid.clone();
        self.inner
            .session
            .publisher
            .spawn_callback(async move {
                match ack.await {
                    Ok(guid) => on_ack(guid, None),
                    Err(err) => on_ack(callback_guid, Some(err)),
                }
            })
            .await;

        Ok(guid)
    }

    /// Publish `payload` to `subject`, returning a future that resolves
    /// with the acknowledgement
    ///
    /// This method itself only waits for admission into the in-flight
    /// window; the returned [`PublishAckFuture`] resolves once the publish
    /// reaches its terminal state.
    ///
    /// # Errors
    ///
    /// It returns an error if the session is closed or lost, the publish
    /// cannot be admitted within the ack timeout, or the bus rejects the
    /// send.
    pub async fn publish_acked(
        &self,
        subject: Subject,
        payload: Bytes,
    ) -> Result<PublishAckFuture, Error> {
        let session = &self.inner.session;
        session.check_open()?;

        let guid = publisher::new_guid();
        let permits = match session
            .publisher
            .admit(payload.len(), session.ack_timeout)
            .await
        {
            Ok(permits) => permits,
            Err(publisher::AdmitError::TimedOut) => {
                return Err(Error::PublishAckTimeout { guid })
            }
            Err(publisher::AdmitError::Closed) => return Err(session.terminal_error()),
        };
        session.check_open()?;

        let (completion, receiver) = oneshot::channel();
        session.publisher.insert(guid.clone(), completion, permits);

        let message = PubMsg {
            client_id: session.client_id.clone(),
            guid: guid.clone(),
            subject: subject.to_string(),
            reply: String::new(),
            data: payload,
            conn_id: session.conn_id.clone(),
            sha256: Vec::new(),
        };
        let target = publish_subject(&session.subjects.pub_prefix, &subject);
        if let Err(err) = session
            .bus
            .publish_with_reply(target, session.ack_inbox.clone(), codec::encode(&message))
            .await
        {
            // Never made it onto the wire: release the slot and surface the
            // failure instead of letting the record ride out the ack wait.
            session.publisher.take(&guid);
            return Err(Error::Bus(err));
        }

        Ok(PublishAckFuture::new(
            Arc::clone(session),
            guid,
            receiver,
            session.ack_timeout,
        ))
    }

    /// Subscribe to the channel `subject`
    ///
    /// Returns a constructor for the subscription; see [`ClientSubscribe`]
    /// for the recognised options.
    pub fn subscribe(&self, subject: Subject) -> ClientSubscribe {
        ClientSubscribe::build(self.clone(), subject)
    }

    /// Close the session
    ///
    /// Sends a best-effort close request releasing the server-side state,
    /// stops the ping loop, fails every in-flight publish with a closed
    /// error and detaches every subscription. No message handler or ack
    /// callback fires after this method returns. Calling it again is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// It returns an error if the server acknowledged the close request
    /// with an error. The session is torn down locally regardless.
    pub async fn close(&self) -> Result<(), Error> {
        let session = &self.inner.session;
        if !session.begin_close() {
            return Ok(());
        }

        if let Some(pinger) = &self.inner.pinger {
            pinger.abort();
        }

        let request = codec::encode(&CloseRequest {
            client_id: session.client_id.clone(),
        });
        let mut close_error = None;
        match session
            .bus
            .request(
                session.subjects.close_requests.clone(),
                request,
                CLOSE_REQUEST_TIMEOUT,
            )
            .await
        {
            Ok(reply) => match codec::decode::<CloseResponse>(&reply.payload) {
                Ok(response) if response.error.is_empty() => {}
                Ok(response) => close_error = Some(Error::CloseRequest(response.error)),
                Err(err) => close_error = Some(Error::Decode(err)),
            },
            Err(err) => log::debug!("close request failed: {err}"),
        }

        session.publisher.fail_all(|| Error::Closed);
        let detached = session.detach_subscriptions();
        join_delivery_tasks(detached).await;
        session.publisher.drain_callbacks(DRAIN_TIMEOUT).await;

        self.inner.heartbeat.abort();
        self.inner.acks.abort();

        if session.owned_bus {
            session.bus.close().await;
        }
        session.finish_close();

        close_error.map_or(Ok(()), Err)
    }

    /// The underlying bus connection
    ///
    /// Returns `None` once the session has been closed.
    #[must_use]
    pub fn bus(&self) -> Option<Arc<dyn Bus>> {
        match self.inner.session.status() {
            Status::Open => Some(Arc::clone(&self.inner.session.bus)),
            Status::Closing | Status::Closed => None,
        }
    }

    /// The client id this session registered with
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.inner.session.client_id
    }

    /// The cluster this session is joined to
    #[must_use]
    pub fn cluster_id(&self) -> &str {
        &self.inner.session.cluster_id
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    #[cfg(test)]
    pub(crate) fn in_flight_publishes(&self) -> usize {
        self.inner.session.publisher.in_flight_len()
    }
}

fn whole_seconds(duration: Duration) -> i32 {
    let mut seconds = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        seconds += 1;
    }
    i32::try_from(seconds).unwrap_or(i32::MAX)
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.heartbeat.abort();
        self.acks.abort();
        if let Some(pinger) = &self.pinger {
            pinger.abort();
        }

        // Last handle gone without a clean close: tear down locally so the
        // delivery tasks and parked publishers don't linger.
        if self.session.begin_close() {
            self.session.publisher.fail_all(|| Error::Closed);
            drop(self.session.detach_subscriptions());
            self.session.finish_close();
        }
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("cluster_id", &self.inner.session.cluster_id)
            .field("client_id", &self.inner.session.client_id)
            .field("status", &self.inner.session.status())
            .finish_non_exhaustive()
    }
}
