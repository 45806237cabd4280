use std::{
    fmt::{self, Debug},
    sync::Arc,
    time::Duration,
};

use honeydew_proto::DEFAULT_DISCOVER_PREFIX;

use crate::bus::Bus;
use crate::client::Client;
use crate::error::Error;

/// Callback invoked when the ping loop declares the session lost
///
/// Invoked at most once per session, never after a clean
/// [`Client::close`].
pub type ConnectionLostHandler = Box<dyn FnOnce(Error) + Send>;

/// A builder for [`Client`]
///
/// Obtained from [`Client::builder`].
pub struct ClientBuilder {
    pub(crate) nats_url: String,
    pub(crate) bus: Option<Arc<dyn Bus>>,
    pub(crate) connect_timeout: Duration,
    pub(crate) ack_timeout: Duration,
    pub(crate) discover_prefix: String,
    pub(crate) max_pub_acks_in_flight: usize,
    pub(crate) pub_ack_pending_message_limit: i64,
    pub(crate) pub_ack_pending_bytes_limit: i64,
    pub(crate) ping_interval: Duration,
    pub(crate) ping_max_out: i32,
    pub(crate) connection_lost: Option<ConnectionLostHandler>,
}

impl ClientBuilder {
    pub(super) fn new() -> Self {
        Self {
            nats_url: "nats://127.0.0.1:4222".to_owned(),
            bus: None,
            connect_timeout: Duration::from_secs(2),
            ack_timeout: Duration::from_secs(30),
            discover_prefix: DEFAULT_DISCOVER_PREFIX.to_owned(),
            max_pub_acks_in_flight: 16384,
            pub_ack_pending_message_limit: -1,
            pub_ack_pending_bytes_limit: -1,
            ping_interval: Duration::from_secs(5),
            ping_max_out: 3,
            connection_lost: None,
        }
    }

    /// Construct [`ClientBuilder`] from environment variables
    ///
    /// Reads the following variables, falling back to the defaults for any
    /// that are unset:
    ///
    /// * `HONEYDEW_NATS_URL`
    /// * `HONEYDEW_DISCOVER_PREFIX`
    /// * `HONEYDEW_CONNECT_TIMEOUT_MS`
    /// * `HONEYDEW_ACK_TIMEOUT_MS`
    /// * `HONEYDEW_MAX_PUB_ACKS_IN_FLIGHT`
    /// * `HONEYDEW_PING_INTERVAL_SECS`
    /// * `HONEYDEW_PING_MAX_OUT`
    ///
    /// # Panics
    ///
    /// It panics if a variable is set to a value of the wrong type.
    #[cfg(feature = "from-env")]
    #[must_use]
    pub fn from_env() -> Self {
        use super::from_env::FromEnv;

        let env = envy::prefixed("HONEYDEW_")
            .from_env::<FromEnv>()
            .expect("FromEnv deserialization error");

        let mut this = Self::new();
        if let Some(nats_url) = env.nats_url {
            this = this.nats_url(nats_url);
        }
        if let Some(discover_prefix) = env.discover_prefix {
            this = this.discover_prefix(discover_prefix);
        }
        if let Some(connect_timeout_ms) = env.connect_timeout_ms {
            this = this.connect_timeout(Duration::from_millis(connect_timeout_ms));
        }
        if let Some(ack_timeout_ms) = env.ack_timeout_ms {
            this = this.ack_timeout(Duration::from_millis(ack_timeout_ms));
        }
        if let Some(max_pub_acks_in_flight) = env.max_pub_acks_in_flight {
            this = this.max_pub_acks_in_flight(max_pub_acks_in_flight);
        }
        if let Some(ping_interval_secs) = env.ping_interval_secs {
            this = this.ping_interval(Duration::from_secs(ping_interval_secs));
        }
        if let Some(ping_max_out) = env.ping_max_out {
            this = this.ping_max_out(ping_max_out);
        }

        this
    }

    /// Bus URL(s) to dial when no bus connection is injected
    ///
    /// Accepts a single address or a comma-separated list.
    ///
    /// Default: `nats://127.0.0.1:4222`
    #[must_use]
    pub fn nats_url(mut self, nats_url: impl Into<String>) -> Self {
        self.nats_url = nats_url.into();
        self
    }

    /// Inject an established bus connection instead of dialing one
    ///
    /// The connection must not buffer publishes while reconnecting
    /// ([`Bus::reconnect_buffering`]); buffered publishes defeat the
    /// ack-wait semantics of the publish pipeline. The session never closes
    /// an injected bus.
    #[must_use]
    pub fn bus(mut self, bus: Arc<dyn Bus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// How long to wait for the handshake reply
    ///
    /// Default: 2 seconds
    #[must_use]
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// How long a publish may remain unacknowledged before it fails
    ///
    /// Default: 30 seconds
    #[must_use]
    pub fn ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    /// Prefix of the discovery subject; must match the server
    ///
    /// Default: `_STAN.discover`
    #[must_use]
    pub fn discover_prefix(mut self, discover_prefix: impl Into<String>) -> Self {
        self.discover_prefix = discover_prefix.into();
        self
    }

    /// Maximum number of unacknowledged publishes
    ///
    /// Publishes beyond the limit block until a slot frees up or the
    /// ack timeout elapses.
    ///
    /// Default: 16384
    #[must_use]
    pub fn max_pub_acks_in_flight(mut self, max_pub_acks_in_flight: usize) -> Self {
        self.max_pub_acks_in_flight = max_pub_acks_in_flight;
        self
    }

    /// Admission limit on the number of pending publishes
    ///
    /// A negative value means unlimited; zero is rejected.
    ///
    /// Default: unlimited
    #[must_use]
    pub fn pub_ack_pending_message_limit(mut self, limit: i64) -> Self {
        self.pub_ack_pending_message_limit = limit;
        self
    }

    /// Admission limit on the cumulative payload bytes of pending publishes
    ///
    /// A negative value means unlimited; zero is rejected.
    ///
    /// Default: unlimited
    #[must_use]
    pub fn pub_ack_pending_bytes_limit(mut self, limit: i64) -> Self {
        self.pub_ack_pending_bytes_limit = limit;
        self
    }

    /// Requested cadence of session liveness pings
    ///
    /// The server may negotiate the interval down; the handshake reply is
    /// authoritative. The wire carries whole seconds, sub-second values are
    /// rounded up.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub fn ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }

    /// Consecutive failed pings before the session is declared lost
    ///
    /// Must be at least 3, so a single dropped ping is forgiven.
    ///
    /// Default: 3
    #[must_use]
    pub fn ping_max_out(mut self, ping_max_out: i32) -> Self {
        self.ping_max_out = ping_max_out;
        self
    }

    /// Callback invoked when the session is declared lost
    #[must_use]
    pub fn connection_lost_handler<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Error) + Send + 'static,
    {
        self.connection_lost = Some(Box::new(handler));
        self
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout must be greater than zero"));
        }
        if self.ack_timeout.is_zero() {
            return Err(Error::config("ack_timeout must be greater than zero"));
        }
        if self.discover_prefix.is_empty() {
            return Err(Error::config("discover_prefix must not be empty"));
        }
        if self.max_pub_acks_in_flight == 0 {
            return Err(Error::config(
                "max_pub_acks_in_flight must be greater than zero",
            ));
        }
        if self.pub_ack_pending_message_limit == 0 {
            return Err(Error::config(
                "pub_ack_pending_message_limit must not be zero; use a negative value for unlimited",
            ));
        }
        if self.pub_ack_pending_bytes_limit == 0 {
            return Err(Error::config(
                "pub_ack_pending_bytes_limit must not be zero; use a negative value for unlimited",
            ));
        }
        if self.ping_interval.is_zero() {
            return Err(Error::config("ping_interval must be greater than zero"));
        }
        if self.ping_max_out < 3 {
            return Err(Error::config("ping_max_out must be at least 3"));
        }
        Ok(())
    }

    /// Open a session as `client_id` against the cluster `cluster_id`
    ///
    /// # Errors
    ///
    /// It returns an error if an option is out of range, the bus cannot be
    /// dialed, no handshake reply arrives within the connect timeout, or
    /// the server rejects the handshake (e.g. the client id is already
    /// registered).
    pub async fn connect(
        self,
        cluster_id: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Result<Client, Error> {
        Client::connect(cluster_id.into(), client_id.into(), self).await
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("nats_url", &self.nats_url)
            .field("bus", &self.bus.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .field("ack_timeout", &self.ack_timeout)
            .field("discover_prefix", &self.discover_prefix)
            .field("max_pub_acks_in_flight", &self.max_pub_acks_in_flight)
            .field(
                "pub_ack_pending_message_limit",
                &self.pub_ack_pending_message_limit,
            )
            .field(
                "pub_ack_pending_bytes_limit",
                &self.pub_ack_pending_bytes_limit,
            )
            .field("ping_interval", &self.ping_interval)
            .field("ping_max_out", &self.ping_max_out)
            .finish_non_exhaustive()
    }
}
