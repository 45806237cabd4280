//! In-process test doubles: a memory-backed [`Bus`] and a fake streaming
//! server speaking the real wire protocol over it.
//!
//! Together they let the whole session state machine run end to end inside
//! a single paused-clock runtime: handshake, publish acks, ordered
//! delivery, redelivery timers, durable resume and ping loss.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};

use honeydew_proto::{
    codec, discover_subject,
    proto::{
        Ack, CloseRequest, CloseResponse, ConnectRequest, ConnectResponse, MsgProto, Ping,
        PingResponse, PubAck, PubMsg, StartPosition, SubscriptionRequest, SubscriptionResponse,
        UnsubscribeRequest,
    },
};

use crate::bus::{
    random_inbox, Bus, BusError, BusMessage, BusState, BusSubscription, SUBSCRIPTION_CHANNEL_SIZE,
};

const PUB_PREFIX: &str = "_STAN.pub";
const SUB_REQUESTS: &str = "_STAN.sub";
const UNSUB_REQUESTS: &str = "_STAN.unsub";
const CLOSE_REQUESTS: &str = "_STAN.close";
const SUB_CLOSE_REQUESTS: &str = "_STAN.subclose";
const PING_REQUESTS: &str = "_STAN.ping";
const ACK_PREFIX: &str = "_STAN.acks";

/// An in-memory [`Bus`]: exact-subject routing plus the trailing-`>`
/// wildcard, enough for the streaming conversation.
///
/// Cloning yields another handle to the same bus. [`MemoryBus::sever`]
/// simulates a broken network: publishes are black-holed and requests run
/// into their timeout, exactly what a client on a dead TCP connection
/// observes.
#[derive(Clone, Debug)]
pub(crate) struct MemoryBus {
    core: Arc<BusCore>,
}

#[derive(Debug)]
struct BusCore {
    subscriptions: Mutex<Vec<SubEntry>>,
    next_id: AtomicU64,
    severed: AtomicBool,
    closed: AtomicBool,
}

#[derive(Debug)]
struct SubEntry {
    id: u64,
    subject: String,
    sender: mpsc::Sender<BusMessage>,
}

impl MemoryBus {
    pub(crate) fn new() -> Self {
        Self {
            core: Arc::new(BusCore {
                subscriptions: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                severed: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn sever(&self) {
        self.core.severed.store(true, Ordering::Release);
    }

    pub(crate) fn restore(&self) {
        self.core.severed.store(false, Ordering::Release);
    }

    fn is_severed(&self) -> bool {
        self.core.severed.load(Ordering::Acquire)
    }

    fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }

    fn attach(&self, subject: String) -> BusSubscription {
        let id = self.core.next_id.fetch_add(1, Ordering::AcqRel);
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_CHANNEL_SIZE);
        self.core.subscriptions.lock().unwrap().push(SubEntry {
            id,
            subject,
            sender,
        });

        let core = Arc::clone(&self.core);
        BusSubscription::new(receiver, move || {
            core.subscriptions
                .lock()
                .unwrap()
                .retain(|entry| entry.id != id);
        })
    }

    fn deliver(&self, subject: &str, reply: Option<&str>, payload: &Bytes) {
        let subscriptions = self.core.subscriptions.lock().unwrap();
        for entry in subscriptions.iter() {
            if subject_matches(&entry.subject, subject) {
                let message = BusMessage {
                    subject: subject.to_owned(),
                    reply: reply.map(ToOwned::to_owned),
                    payload: payload.clone(),
                };
                // A full buffer drops the message, like a slow consumer
                // on a real bus.
                let _ = entry.sender.try_send(message);
            }
        }
    }
}

fn subject_matches(pattern: &str, subject: &str) -> bool {
    match pattern.strip_suffix('>') {
        Some(prefix) => subject.starts_with(prefix),
        None => pattern == subject,
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        if !self.is_severed() {
            self.deliver(&subject, None, &payload);
        }
        Ok(())
    }

    async fn publish_with_reply(
        &self,
        subject: String,
        reply: String,
        payload: Bytes,
    ) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        if !self.is_severed() {
            self.deliver(&subject, Some(&reply), &payload);
        }
        Ok(())
    }

    async fn request(
        &self,
        subject: String,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<BusMessage, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let inbox = self.new_inbox();
        let mut replies = self.attach(inbox.clone());

        if self.is_severed() {
            time::sleep(timeout).await;
            return Err(BusError::RequestTimeout);
        }

        self.deliver(&subject, Some(&inbox), &payload);
        match time::timeout(timeout, replies.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(BusError::Closed),
            Err(_elapsed) => Err(BusError::RequestTimeout),
        }
    }

    async fn subscribe(&self, subject: String) -> Result<BusSubscription, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        Ok(self.attach(subject))
    }

    fn new_inbox(&self) -> String {
        random_inbox("_INBOX")
    }

    fn state(&self) -> BusState {
        if self.is_closed() {
            BusState::Closed
        } else if self.is_severed() {
            BusState::Reconnecting
        } else {
            BusState::Connected
        }
    }

    fn reconnect_buffering(&self) -> bool {
        false
    }

    async fn close(&self) {
        self.core.closed.store(true, Ordering::Release);
        self.core.subscriptions.lock().unwrap().clear();
    }
}

/// Behaviour knobs for [`FakeServer`].
pub(crate) struct ServerOptions {
    /// Advertise the durable-close subject in the handshake
    pub(crate) sub_close_supported: bool,
    /// Run the ack-wait redelivery sweeper
    pub(crate) redelivery: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            sub_close_supported: true,
            redelivery: false,
        }
    }
}

/// A miniature streaming server: per-channel ordered logs, pub acks,
/// subscription state with durables and queue groups, ack-wait
/// redelivery and ping replies.
pub(crate) struct FakeServer {
    core: Arc<ServerCore>,
    tasks: Vec<JoinHandle<()>>,
}

struct ServerCore {
    bus: MemoryBus,
    state: tokio::sync::Mutex<ServerState>,
}

#[derive(Default)]
struct ServerState {
    sub_close_supported: bool,
    drop_pub_acks: bool,
    pub_ack_error: Option<String>,
    ping_error: Option<String>,
    clients: HashMap<String, String>,
    channels: HashMap<String, Vec<StoredMsg>>,
    subs: Vec<ServerSub>,
    durables: HashMap<String, DurableState>,
    qg_rr: HashMap<String, usize>,
    next_sub_id: u64,
}

#[derive(Clone)]
struct StoredMsg {
    sequence: u64,
    data: Bytes,
    timestamp: i64,
}

struct ServerSub {
    client_id: String,
    subject: String,
    queue_group: Option<String>,
    durable_name: Option<String>,
    inbox: String,
    ack_inbox: String,
    ack_wait: Duration,
    pending: HashMap<u64, Pending>,
}

struct Pending {
    count: u32,
    sent_at: Instant,
}

#[derive(Default)]
struct DurableState {
    acked: u64,
    delivered: u64,
}

impl ServerSub {
    fn durable_key(&self) -> Option<String> {
        self.durable_name
            .as_ref()
            .map(|durable| durable_key(&self.client_id, &self.subject, durable))
    }
}

fn durable_key(client_id: &str, subject: &str, durable: &str) -> String {
    format!("{client_id}\u{0}{subject}\u{0}{durable}")
}

fn now_nanos() -> i64 {
    i64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before the epoch")
            .as_nanos(),
    )
    .unwrap_or(i64::MAX)
}

impl FakeServer {
    pub(crate) async fn start(bus: MemoryBus, cluster_id: &str) -> Self {
        Self::start_with(bus, cluster_id, ServerOptions::default()).await
    }

    pub(crate) async fn start_with(
        bus: MemoryBus,
        cluster_id: &str,
        options: ServerOptions,
    ) -> Self {
        let core = Arc::new(ServerCore {
            bus: bus.clone(),
            state: tokio::sync::Mutex::new(ServerState {
                sub_close_supported: options.sub_close_supported,
                next_sub_id: 1,
                ..ServerState::default()
            }),
        });

        let discover = discover_subject(honeydew_proto::DEFAULT_DISCOVER_PREFIX, cluster_id);
        let mut tasks = vec![
            spawn_loop(&core, discover, |core, msg| async move {
                core.handle_connect(msg).await;
            }),
            spawn_loop(&core, format!("{PUB_PREFIX}.>"), |core, msg| async move {
                core.handle_pub(msg).await;
            }),
            spawn_loop(&core, SUB_REQUESTS.to_owned(), |core, msg| async move {
                core.handle_sub_request(msg).await;
            }),
            spawn_loop(&core, UNSUB_REQUESTS.to_owned(), |core, msg| async move {
                core.handle_unsub(msg, false).await;
            }),
            spawn_loop(&core, SUB_CLOSE_REQUESTS.to_owned(), |core, msg| async move {
                core.handle_unsub(msg, true).await;
            }),
            spawn_loop(&core, CLOSE_REQUESTS.to_owned(), |core, msg| async move {
                core.handle_close(msg).await;
            }),
            spawn_loop(&core, PING_REQUESTS.to_owned(), |core, msg| async move {
                core.handle_ping(msg).await;
            }),
            spawn_loop(&core, format!("{ACK_PREFIX}.>"), |core, msg| async move {
                core.handle_ack(msg).await;
            }),
        ];

        if options.redelivery {
            let sweeper = Arc::clone(&core);
            tasks.push(tokio::spawn(async move {
                loop {
                    time::sleep(Duration::from_millis(250)).await;
                    sweeper.redeliver_due().await;
                }
            }));
        }

        Self { core, tasks }
    }

    pub(crate) async fn set_ping_error(&self, error: Option<&str>) {
        self.core.state.lock().await.ping_error = error.map(ToOwned::to_owned);
    }

    pub(crate) async fn set_drop_pub_acks(&self, drop_pub_acks: bool) {
        self.core.state.lock().await.drop_pub_acks = drop_pub_acks;
    }

    pub(crate) async fn set_pub_ack_error(&self, error: Option<&str>) {
        self.core.state.lock().await.pub_ack_error = error.map(ToOwned::to_owned);
    }

    pub(crate) async fn message_count(&self, subject: &str) -> usize {
        self.core
            .state
            .lock()
            .await
            .channels
            .get(subject)
            .map_or(0, Vec::len)
    }

    /// Beacon the client's heartbeat inbox, returning whether it replied.
    pub(crate) async fn beacon(&self, client_id: &str) -> bool {
        let heartbeat_inbox = {
            let state = self.core.state.lock().await;
            let Some(inbox) = state.clients.get(client_id) else {
                return false;
            };
            inbox.clone()
        };
        self.core
            .bus
            .request(heartbeat_inbox, Bytes::new(), Duration::from_secs(1))
            .await
            .is_ok()
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn spawn_loop<F, Fut>(core: &Arc<ServerCore>, subject: String, handle: F) -> JoinHandle<()>
where
    F: Fn(Arc<ServerCore>, BusMessage) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let core = Arc::clone(core);
    let mut subscription = core.bus.attach(subject);
    tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            handle(Arc::clone(&core), message).await;
        }
    })
}

impl ServerCore {
    async fn reply(&self, reply: Option<String>, payload: Bytes) {
        if let Some(reply) = reply {
            let _ = self.bus.publish(reply, payload).await;
        }
    }

    async fn handle_connect(&self, message: BusMessage) {
        let Ok(request) = codec::decode::<ConnectRequest>(&message.payload) else {
            return;
        };
        let response = {
            let mut state = self.state.lock().await;
            if state.clients.contains_key(&request.client_id) {
                ConnectResponse {
                    error: format!("clientID already registered: {}", request.client_id),
                    ..ConnectResponse::default()
                }
            } else {
                state
                    .clients
                    .insert(request.client_id.clone(), request.heartbeat_inbox.clone());
                ConnectResponse {
                    pub_prefix: PUB_PREFIX.to_owned(),
                    sub_requests: SUB_REQUESTS.to_owned(),
                    unsub_requests: UNSUB_REQUESTS.to_owned(),
                    close_requests: CLOSE_REQUESTS.to_owned(),
                    sub_close_requests: if state.sub_close_supported {
                        SUB_CLOSE_REQUESTS.to_owned()
                    } else {
                        String::new()
                    },
                    ping_requests: PING_REQUESTS.to_owned(),
                    protocol: 1,
                    ..ConnectResponse::default()
                }
            }
        };
        self.reply(message.reply, codec::encode(&response)).await;
    }

    async fn handle_pub(&self, message: BusMessage) {
        let Ok(publish) = codec::decode::<PubMsg>(&message.payload) else {
            return;
        };

        let ack = {
            let mut state = self.state.lock().await;
            let channel = state.channels.entry(publish.subject.clone()).or_default();
            let stored = StoredMsg {
                sequence: channel.len() as u64 + 1,
                data: publish.data.clone(),
                timestamp: now_nanos(),
            };
            channel.push(stored.clone());
            self.deliver_new(&mut state, &publish.subject, &stored).await;

            if state.drop_pub_acks {
                return;
            }
            PubAck {
                guid: publish.guid,
                error: state.pub_ack_error.clone().unwrap_or_default(),
            }
        };
        self.reply(message.reply, codec::encode(&ack)).await;
    }

    async fn deliver_new(&self, state: &mut ServerState, subject: &str, stored: &StoredMsg) {
        let mut recipients = Vec::new();
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, sub) in state.subs.iter().enumerate() {
            if sub.subject != subject {
                continue;
            }
            match &sub.queue_group {
                None => recipients.push(idx),
                Some(group) => groups.entry(group.clone()).or_default().push(idx),
            }
        }
        for (group, members) in groups {
            let counter = state
                .qg_rr
                .entry(format!("{subject}\u{0}{group}"))
                .or_insert(0);
            recipients.push(members[*counter % members.len()]);
            *counter += 1;
        }

        for idx in recipients {
            self.send_stored(state, idx, stored, false, 0).await;
        }
    }

    async fn send_stored(
        &self,
        state: &mut ServerState,
        idx: usize,
        stored: &StoredMsg,
        redelivered: bool,
        count: u32,
    ) {
        let (inbox, subject, durable) = {
            let sub = &mut state.subs[idx];
            sub.pending.insert(
                stored.sequence,
                Pending {
                    count,
                    sent_at: Instant::now(),
                },
            );
            (sub.inbox.clone(), sub.subject.clone(), sub.durable_key())
        };
        if let Some(key) = durable {
            let durable = state.durables.entry(key).or_default();
            durable.delivered = durable.delivered.max(stored.sequence);
        }

        let proto = MsgProto {
            sequence: stored.sequence,
            subject,
            reply: String::new(),
            data: stored.data.clone(),
            timestamp: stored.timestamp,
            redelivered,
            redelivery_count: count,
            crc32: 0,
        };
        let _ = self.bus.publish(inbox, codec::encode(&proto)).await;
    }

    async fn handle_sub_request(&self, message: BusMessage) {
        let Ok(request) = codec::decode::<SubscriptionRequest>(&message.payload) else {
            return;
        };

        let mut state = self.state.lock().await;
        if !state.clients.contains_key(&request.client_id) {
            drop(state);
            let response = SubscriptionResponse {
                ack_inbox: String::new(),
                error: format!("unknown clientID: {}", request.client_id),
            };
            self.reply(message.reply, codec::encode(&response)).await;
            return;
        }

        let id = state.next_sub_id;
        state.next_sub_id += 1;
        let ack_inbox = format!("{ACK_PREFIX}.{id}");

        let durable_name = (!request.durable_name.is_empty()).then(|| request.durable_name.clone());
        let sub = ServerSub {
            client_id: request.client_id.clone(),
            subject: request.subject.clone(),
            queue_group: (!request.q_group.is_empty()).then(|| request.q_group.clone()),
            durable_name: durable_name.clone(),
            inbox: request.inbox.clone(),
            ack_inbox: ack_inbox.clone(),
            ack_wait: Duration::from_secs(u64::try_from(request.ack_wait_in_secs).unwrap_or(30)),
            pending: HashMap::new(),
        };

        let channel = state
            .channels
            .get(&request.subject)
            .cloned()
            .unwrap_or_default();
        let backlog: Vec<(StoredMsg, bool)> = match durable_name
            .as_ref()
            .map(|durable| durable_key(&request.client_id, &request.subject, durable))
            .and_then(|key| state.durables.get(&key))
        {
            Some(durable) => {
                let start = durable.acked + 1;
                let delivered = durable.delivered;
                channel
                    .iter()
                    .filter(|msg| msg.sequence >= start)
                    .map(|msg| (msg.clone(), msg.sequence <= delivered))
                    .collect()
            }
            None => match StartPosition::try_from(request.start_position) {
                Ok(StartPosition::NewOnly) | Err(_) => Vec::new(),
                Ok(StartPosition::First) => {
                    channel.iter().map(|msg| (msg.clone(), false)).collect()
                }
                Ok(StartPosition::SequenceStart) => {
                    let start = request.start_sequence.max(1);
                    channel
                        .iter()
                        .filter(|msg| msg.sequence >= start)
                        .map(|msg| (msg.clone(), false))
                        .collect()
                }
                Ok(StartPosition::LastReceived) => channel
                    .last()
                    .map(|msg| (msg.clone(), false))
                    .into_iter()
                    .collect(),
                Ok(StartPosition::TimeDeltaStart) => {
                    let cutoff = now_nanos().saturating_sub(request.start_time_delta);
                    channel
                        .iter()
                        .filter(|msg| msg.timestamp >= cutoff)
                        .map(|msg| (msg.clone(), false))
                        .collect()
                }
            },
        };

        state.subs.push(sub);
        let idx = state.subs.len() - 1;

        let response = SubscriptionResponse {
            ack_inbox,
            error: String::new(),
        };
        self.reply(message.reply, codec::encode(&response)).await;

        for (stored, redelivered) in backlog {
            let count = u32::from(redelivered);
            self.send_stored(&mut state, idx, &stored, redelivered, count)
                .await;
        }
    }

    async fn handle_ack(&self, message: BusMessage) {
        let Ok(ack) = codec::decode::<Ack>(&message.payload) else {
            return;
        };
        let mut state = self.state.lock().await;
        let Some(idx) = state
            .subs
            .iter()
            .position(|sub| sub.ack_inbox == message.subject)
        else {
            return;
        };
        let durable = {
            let sub = &mut state.subs[idx];
            sub.pending.remove(&ack.sequence);
            sub.durable_key()
        };
        if let Some(key) = durable {
            let durable = state.durables.entry(key).or_default();
            durable.acked = durable.acked.max(ack.sequence);
        }
    }

    async fn handle_unsub(&self, message: BusMessage, keep_durable: bool) {
        let Ok(request) = codec::decode::<UnsubscribeRequest>(&message.payload) else {
            return;
        };
        let response = {
            let mut state = self.state.lock().await;
            match state.subs.iter().position(|sub| sub.inbox == request.inbox) {
                Some(idx) => {
                    let sub = state.subs.remove(idx);
                    if !keep_durable {
                        if let Some(key) = sub.durable_key() {
                            state.durables.remove(&key);
                        }
                    }
                    SubscriptionResponse {
                        ack_inbox: String::new(),
                        error: String::new(),
                    }
                }
                None => SubscriptionResponse {
                    ack_inbox: String::new(),
                    error: "no such subscription".to_owned(),
                },
            }
        };
        self.reply(message.reply, codec::encode(&response)).await;
    }

    async fn handle_close(&self, message: BusMessage) {
        let Ok(request) = codec::decode::<CloseRequest>(&message.payload) else {
            return;
        };
        {
            let mut state = self.state.lock().await;
            state.clients.remove(&request.client_id);
            state.subs.retain(|sub| sub.client_id != request.client_id);
        }
        self.reply(message.reply, codec::encode(&CloseResponse::default()))
            .await;
    }

    async fn handle_ping(&self, message: BusMessage) {
        let Ok(_ping) = codec::decode::<Ping>(&message.payload) else {
            return;
        };
        let error = self
            .state
            .lock()
            .await
            .ping_error
            .clone()
            .unwrap_or_default();
        self.reply(message.reply, codec::encode(&PingResponse { error }))
            .await;
    }

    async fn redeliver_due(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let mut due = Vec::new();
        for (idx, sub) in state.subs.iter().enumerate() {
            for (&sequence, pending) in &sub.pending {
                if now.duration_since(pending.sent_at) >= sub.ack_wait {
                    due.push((idx, sequence, pending.count));
                }
            }
        }

        for (idx, sequence, count) in due {
            let subject = state.subs[idx].subject.clone();
            let stored = state
                .channels
                .get(&subject)
                .and_then(|channel| channel.get(usize::try_from(sequence - 1).unwrap_or(0)))
                .cloned();
            if let Some(stored) = stored {
                self.send_stored(&mut state, idx, &stored, true, count + 1)
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::{subject_matches, MemoryBus};
    use crate::bus::{Bus, BusError, BusState};

    #[test]
    fn wildcard_matching() {
        assert!(subject_matches("foo", "foo"));
        assert!(!subject_matches("foo", "foo.bar"));
        assert!(subject_matches("_STAN.pub.>", "_STAN.pub.foo"));
        assert!(subject_matches("_STAN.pub.>", "_STAN.pub.foo.bar"));
        assert!(!subject_matches("_STAN.pub.>", "_STAN.sub"));
    }

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let bus = MemoryBus::new();
        let mut subscription = bus.subscribe("foo".to_owned()).await.unwrap();

        bus.publish("foo".to_owned(), Bytes::from_static(b"one"))
            .await
            .unwrap();
        let message = subscription.recv().await.unwrap();
        assert_eq!("foo", message.subject);
        assert_eq!(None, message.reply);
        assert_eq!(Bytes::from_static(b"one"), message.payload);
    }

    #[tokio::test]
    async fn dropping_subscription_detaches_it() {
        let bus = MemoryBus::new();
        let subscription = bus.subscribe("foo".to_owned()).await.unwrap();
        assert_eq!(1, bus.core.subscriptions.lock().unwrap().len());
        drop(subscription);
        assert_eq!(0, bus.core.subscriptions.lock().unwrap().len());
    }

    #[tokio::test(start_paused = true)]
    async fn severed_requests_time_out() {
        let bus = MemoryBus::new();
        bus.sever();
        assert_eq!(BusState::Reconnecting, bus.state());

        let err = bus
            .request("foo".to_owned(), Bytes::new(), Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::RequestTimeout));

        bus.restore();
        assert_eq!(BusState::Connected, bus.state());
    }

    #[tokio::test]
    async fn request_round_trip() {
        let bus = MemoryBus::new();
        let responder_bus = bus.clone();
        let mut service = bus.subscribe("service".to_owned()).await.unwrap();
        tokio::spawn(async move {
            while let Some(message) = service.recv().await {
                if let Some(reply) = message.reply {
                    responder_bus
                        .publish(reply, Bytes::from_static(b"pong"))
                        .await
                        .unwrap();
                }
            }
        });

        let reply = bus
            .request(
                "service".to_owned(),
                Bytes::from_static(b"ping"),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(Bytes::from_static(b"pong"), reply.payload);
    }
}
