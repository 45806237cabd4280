use std::sync::Arc;

use honeydew_proto::{codec, proto::PubAck};

use crate::bus::BusSubscription;
use crate::client::Session;
use crate::error::Error;

/// Drain the session's ack inbox, terminating in-flight publish records.
///
/// Runs as its own task so a slow completion can never stall the bus
/// delivery path. Exits when the inbox subscription goes away.
pub(crate) async fn run(session: Arc<Session>, mut acks: BusSubscription) {
    while let Some(message) = acks.recv().await {
        match codec::decode::<PubAck>(&message.payload) {
            Ok(ack) => {
                let result = if ack.error.is_empty() {
                    Ok(())
                } else {
                    Err(Error::PubAck {
                        guid: ack.guid.clone(),
                        error: ack.error,
                    })
                };
                session.publisher.complete(&ack.guid, result);
            }
            Err(err) => log::warn!("dropping undecodable publish ack: {err}"),
        }
    }
}
