//! Wire protocol for the honeydew streaming client.
//!
//! The streaming server speaks length-delimited protobuf records carried as
//! core bus payloads. This crate contains the message definitions, the
//! subjects the conversation happens on and small encode/decode helpers.

pub use self::subject::{discover_subject, publish_subject, Subject, DEFAULT_DISCOVER_PREFIX};

pub mod codec;
pub mod proto;
mod subject;

/// Protocol revision sent in [`proto::ConnectRequest`].
///
/// Revision 1 added client-to-server pings and connection ids.
pub const PROTOCOL_ONE: i32 = 1;

pub mod error {
    pub use super::subject::SubjectValidateError;
    pub use prost::DecodeError;
}
