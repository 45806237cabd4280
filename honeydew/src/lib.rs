//! Client for a log-structured streaming pub/sub service carried over a
//! NATS-style core bus.
//!
//! The server keeps per-channel ordered logs and durable, acknowledged
//! subscription state; this crate implements the client side of the session
//! protocol on top of the [`bus::Bus`] contract: a publish pipeline with a
//! bounded in-flight acknowledgement window, ordered delivery to
//! subscription handlers with automatic or manual acks, and a ping loop
//! that tears the session down when the server stops answering.

pub use honeydew_proto as proto;

pub use self::client::{
    Client, ClientBuilder, ClientSubscribe, ConnectionLostHandler, PublishAckFuture,
};
pub use self::error::Error;
pub use self::message::Message;
pub use self::subscription::{StartAt, Subscription};
pub use honeydew_proto::Subject;

pub mod bus;
mod client;
mod error;
mod message;
mod subscription;
#[cfg(test)]
pub(crate) mod testing;
