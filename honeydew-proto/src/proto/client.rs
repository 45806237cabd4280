//! Records sent by the client to the streaming server.

use bytes::Bytes;

/// First request of a session, sent to the discovery subject.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct ConnectRequest {
    /// Unique identity of the client within the cluster
    #[prost(string, tag = "1")]
    pub client_id: String,
    /// Inbox the server beacons on to verify the client is alive
    #[prost(string, tag = "2")]
    pub heartbeat_inbox: String,
    /// Protocol revision implemented by the client
    #[prost(int32, tag = "3")]
    pub protocol: i32,
    /// Random identity of this connection instance, echoed in pings
    #[prost(bytes = "vec", tag = "4")]
    pub conn_id: Vec<u8>,
    /// Requested ping cadence in seconds; the server may lower it
    #[prost(int32, tag = "5")]
    pub ping_interval: i32,
    /// Requested number of unanswered pings before the session is lost
    #[prost(int32, tag = "6")]
    pub ping_max_out: i32,
}

/// A single published message.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct PubMsg {
    #[prost(string, tag = "1")]
    pub client_id: String,
    /// Correlates the server's [`PubAck`] with this publish
    ///
    /// [`PubAck`]: crate::proto::PubAck
    #[prost(string, tag = "2")]
    pub guid: String,
    /// Channel the message is appended to
    #[prost(string, tag = "3")]
    pub subject: String,
    #[prost(string, tag = "4")]
    pub reply: String,
    #[prost(bytes = "bytes", tag = "5")]
    pub data: Bytes,
    #[prost(bytes = "vec", tag = "6")]
    pub conn_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "10")]
    pub sha256: Vec<u8>,
}

/// Request to start a subscription on a channel.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct SubscriptionRequest {
    #[prost(string, tag = "1")]
    pub client_id: String,
    /// Channel to subscribe to
    #[prost(string, tag = "2")]
    pub subject: String,
    /// Optional queue group for load-balanced delivery
    #[prost(string, tag = "3")]
    pub q_group: String,
    /// Bus inbox deliveries for this subscription are sent to
    #[prost(string, tag = "4")]
    pub inbox: String,
    #[prost(int32, tag = "5")]
    pub max_in_flight: i32,
    /// Seconds before an unacknowledged delivery is sent again
    #[prost(int32, tag = "6")]
    pub ack_wait_in_secs: i32,
    #[prost(string, tag = "7")]
    pub durable_name: String,
    #[prost(enumeration = "StartPosition", tag = "10")]
    pub start_position: i32,
    /// Sequence to start at when `start_position` is `SequenceStart`
    #[prost(uint64, tag = "11")]
    pub start_sequence: u64,
    /// Nanoseconds before now to start at when `start_position` is `TimeDeltaStart`
    #[prost(int64, tag = "12")]
    pub start_time_delta: i64,
}

/// Where in a channel's history a new subscription begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum StartPosition {
    /// Only messages published after the subscription is registered
    NewOnly = 0,
    /// The last message received on the channel, then everything newer
    LastReceived = 1,
    /// Messages no older than a duration before now
    TimeDeltaStart = 2,
    /// Messages starting at an explicit sequence
    SequenceStart = 3,
    /// Full replay from the first available message
    First = 4,
}

/// Request to stop a subscription, sent to either the unsubscribe subject
/// (forgets durable state) or the subscription close subject (keeps it).
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct UnsubscribeRequest {
    #[prost(string, tag = "1")]
    pub client_id: String,
    #[prost(string, tag = "2")]
    pub subject: String,
    #[prost(string, tag = "3")]
    pub inbox: String,
    #[prost(string, tag = "4")]
    pub durable_name: String,
}

/// Acknowledgement of a delivered message, published to the
/// subscription's ack inbox.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Ack {
    #[prost(string, tag = "1")]
    pub subject: String,
    #[prost(uint64, tag = "2")]
    pub sequence: u64,
}

/// Request releasing all server-side state of the session.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct CloseRequest {
    #[prost(string, tag = "1")]
    pub client_id: String,
}

/// Client-to-server liveness probe.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Ping {
    #[prost(bytes = "vec", tag = "1")]
    pub conn_id: Vec<u8>,
}
