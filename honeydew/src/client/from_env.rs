use serde::Deserialize;

/// Environment configuration read by [`ClientBuilder::from_env`]
///
/// [`ClientBuilder::from_env`]: crate::ClientBuilder::from_env
#[derive(Debug, Deserialize)]
pub(super) struct FromEnv {
    pub(super) nats_url: Option<String>,
    pub(super) discover_prefix: Option<String>,
    pub(super) connect_timeout_ms: Option<u64>,
    pub(super) ack_timeout_ms: Option<u64>,
    pub(super) max_pub_acks_in_flight: Option<usize>,
    pub(super) ping_interval_secs: Option<u64>,
    pub(super) ping_max_out: Option<i32>,
}
