//! Protobuf records exchanged with the streaming server.
//!
//! The structs are written by hand in the exact shape `prost-build` emits so
//! the binary layout matches the established protocol. Client-originated
//! records live in [`client`], server-originated ones in [`server`].

pub use self::client::{
    Ack, CloseRequest, ConnectRequest, Ping, PubMsg, StartPosition, SubscriptionRequest,
    UnsubscribeRequest,
};
pub use self::server::{
    CloseResponse, ConnectResponse, MsgProto, PingResponse, PubAck, SubscriptionResponse,
};

mod client;
mod server;
