use crate::bus::BusError;

/// An error produced by the streaming client
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Operation on a closed or never-opened session
    #[error("connection closed")]
    Closed,
    /// The ping loop declared the session lost
    ///
    /// `reason` carries the server-supplied explanation when one was
    /// received, typically that the client id has been taken over by
    /// another connection.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// Server-supplied reason, or a description of the ping failure
        reason: String,
    },
    /// The server rejected the handshake, e.g. a duplicate client id
    #[error("connect request failed: {0}")]
    ConnectRequest(String),
    /// No handshake reply arrived within the connect timeout
    #[error("no response from cluster {cluster_id} within the connect timeout")]
    ConnectRequestTimeout {
        /// Cluster the handshake was addressed to
        cluster_id: String,
    },
    /// No acknowledgement for a publish arrived within the ack timeout
    #[error("no acknowledgement for publish {guid} within the ack timeout")]
    PublishAckTimeout {
        /// Guid of the publish that timed out
        guid: String,
    },
    /// The server acknowledged a publish with an error
    #[error("server refused publish {guid}: {error}")]
    PubAck {
        /// Guid of the refused publish
        guid: String,
        /// Server-supplied error text
        error: String,
    },
    /// The server rejected a subscription operation, or its reply never came
    #[error("subscription request failed: {0}")]
    SubscriptionRequest(String),
    /// The session close request was acknowledged with an error
    #[error("close request failed: {0}")]
    CloseRequest(String),
    /// Operation on a torn-down subscription
    #[error("invalid or closed subscription")]
    BadSubscription,
    /// [`Message::ack`] called on an auto-ack subscription
    ///
    /// [`Message::ack`]: crate::Message::ack
    #[error("manual ack is not allowed on an auto-ack subscription")]
    ManualAck,
    /// The server's handshake response does not advertise this feature
    #[error("the connected server does not support this operation")]
    NoServerSupport,
    /// An option was out of range or contradictory
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The core bus failed underneath the session
    #[error("bus error")]
    Bus(#[source] BusError),
    /// A payload could not be decoded as the expected protocol record
    #[error("protocol decode error")]
    Decode(#[source] honeydew_proto::error::DecodeError),
}

impl Error {
    pub(crate) fn config(detail: impl Into<String>) -> Self {
        Self::Config(detail.into())
    }
}
