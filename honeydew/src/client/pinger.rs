use std::{sync::Arc, time::Duration};

use tokio::time::{self, Instant, MissedTickBehavior};

use honeydew_proto::{
    codec,
    proto::{Ping, PingResponse},
};

use crate::client::{declare_lost, ConnectionLostHandler, Session, Status};

/// The session liveness loop.
///
/// Sends `Ping{conn_id}` to the server's ping subject every interval and
/// counts consecutive failures: a missing reply within one interval, an
/// undecodable reply, or a reply carrying an error (the server no longer
/// recognises the session, typically because the client id was taken over).
/// At `max_out` failures the session is declared lost, exactly once.
pub(crate) struct Pinger {
    pub(crate) session: Arc<Session>,
    pub(crate) interval: Duration,
    pub(crate) max_out: i32,
    pub(crate) on_lost: Option<ConnectionLostHandler>,
}

impl Pinger {
    pub(crate) async fn run(mut self) {
        let ping = codec::encode(&Ping {
            conn_id: self.session.conn_id.clone(),
        });

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut outstanding = 0i32;
        let mut last_reason: Option<String> = None;

        loop {
            ticker.tick().await;
            if self.session.status() != Status::Open {
                return;
            }

            let reply = self
                .session
                .bus
                .request(
                    self.session.subjects.ping_requests.clone(),
                    ping.clone(),
                    self.interval,
                )
                .await;
            match reply {
                Ok(reply) => match codec::decode::<PingResponse>(&reply.payload) {
                    Ok(response) if response.error.is_empty() => {
                        outstanding = 0;
                        last_reason = None;
                    }
                    Ok(response) => {
                        outstanding += 1;
                        log::warn!("ping refused by the server: {}", response.error);
                        last_reason = Some(response.error);
                    }
                    Err(err) => {
                        outstanding += 1;
                        log::warn!("dropping undecodable ping reply: {err}");
                    }
                },
                Err(err) => {
                    outstanding += 1;
                    log::debug!("ping failed ({outstanding}/{}): {err}", self.max_out);
                }
            }

            if outstanding >= self.max_out {
                let reason = last_reason.take().unwrap_or_else(|| {
                    format!("no response from the server after {outstanding} pings")
                });
                declare_lost(&self.session, reason, self.on_lost.take()).await;
                return;
            }
        }
    }
}
