//! Records sent by the streaming server to the client.

use bytes::Bytes;

/// Reply to [`ConnectRequest`] carrying the per-session subject table.
///
/// The ping parameters are the negotiated, authoritative values.
///
/// [`ConnectRequest`]: crate::proto::ConnectRequest
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct ConnectResponse {
    /// Prefix publishes are sent under (`<pub_prefix>.<subject>`)
    #[prost(string, tag = "1")]
    pub pub_prefix: String,
    /// Subject subscription requests are sent to
    #[prost(string, tag = "2")]
    pub sub_requests: String,
    /// Subject unsubscribe requests are sent to
    #[prost(string, tag = "3")]
    pub unsub_requests: String,
    /// Subject the session close request is sent to
    #[prost(string, tag = "4")]
    pub close_requests: String,
    #[prost(string, tag = "5")]
    pub error: String,
    /// Subject durable-preserving subscription closes are sent to
    ///
    /// Empty when the server predates the feature.
    #[prost(string, tag = "10")]
    pub sub_close_requests: String,
    /// Subject pings are sent to; empty when the server predates pings
    #[prost(string, tag = "11")]
    pub ping_requests: String,
    #[prost(int32, tag = "12")]
    pub ping_interval: i32,
    #[prost(int32, tag = "13")]
    pub ping_max_out: i32,
    #[prost(int32, tag = "14")]
    pub protocol: i32,
    #[prost(string, tag = "15")]
    pub public_key: String,
}

/// Reply to a [`SubscriptionRequest`] or [`UnsubscribeRequest`].
///
/// [`SubscriptionRequest`]: crate::proto::SubscriptionRequest
/// [`UnsubscribeRequest`]: crate::proto::UnsubscribeRequest
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct SubscriptionResponse {
    /// Inbox acknowledgements for this subscription are published to
    #[prost(string, tag = "2")]
    pub ack_inbox: String,
    #[prost(string, tag = "3")]
    pub error: String,
}

/// Acknowledgement of a [`PubMsg`], delivered on the session's ack inbox.
///
/// [`PubMsg`]: crate::proto::PubMsg
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct PubAck {
    #[prost(string, tag = "1")]
    pub guid: String,
    #[prost(string, tag = "2")]
    pub error: String,
}

/// A message delivered to a subscription's inbox.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct MsgProto {
    /// Position in the channel, monotonically increasing from 1
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(string, tag = "2")]
    pub subject: String,
    #[prost(string, tag = "3")]
    pub reply: String,
    #[prost(bytes = "bytes", tag = "4")]
    pub data: Bytes,
    /// Publish timestamp in nanoseconds since the Unix epoch
    #[prost(int64, tag = "5")]
    pub timestamp: i64,
    #[prost(bool, tag = "6")]
    pub redelivered: bool,
    #[prost(uint32, tag = "7")]
    pub redelivery_count: u32,
    #[prost(uint32, tag = "10")]
    pub crc32: u32,
}

/// Reply to a [`CloseRequest`].
///
/// [`CloseRequest`]: crate::proto::CloseRequest
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct CloseResponse {
    #[prost(string, tag = "1")]
    pub error: String,
}

/// Reply to a [`Ping`].
///
/// A non-empty error means the server no longer knows this session,
/// typically because another client took over the client id.
///
/// [`Ping`]: crate::proto::Ping
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct PingResponse {
    #[prost(string, tag = "1")]
    pub error: String,
}
