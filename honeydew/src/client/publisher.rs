use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
    time::Duration,
};

use pin_project_lite::pin_project;
use rand::RngCore;
use tokio::{
    sync::{oneshot, Semaphore},
    task::JoinSet,
    time::{self, sleep, Instant, Sleep},
};

use crate::client::Session;
use crate::error::Error;

/// Publish-side state of a session: the in-flight record map and the
/// admission limits guarding it.
///
/// Every publish lives in `in_flight` from enqueue until exactly one of:
/// the ack arrives, the ack-wait deadline fires, or the session terminates.
/// Whichever happens first removes the record, which both delivers the
/// terminal notification (the `oneshot` is consumed) and releases the
/// admission permits (they are owned by the record).
pub(crate) struct Publisher {
    slots: Arc<Semaphore>,
    byte_slots: Option<Arc<Semaphore>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    callbacks: tokio::sync::Mutex<JoinSet<()>>,
}

pub(crate) struct InFlight {
    completion: oneshot::Sender<Result<(), Error>>,
    _permits: Permits,
}

pub(crate) struct Permits {
    _count: tokio::sync::OwnedSemaphorePermit,
    _bytes: Option<tokio::sync::OwnedSemaphorePermit>,
}

pub(crate) enum AdmitError {
    /// The admission wait lasted longer than the ack-wait deadline
    TimedOut,
    /// The session terminated while the caller was parked
    Closed,
}

impl Publisher {
    pub(crate) fn new(count_limit: usize, bytes_limit: Option<usize>) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(count_limit.min(Semaphore::MAX_PERMITS))),
            byte_slots: bytes_limit
                .map(|limit| Arc::new(Semaphore::new(limit.min(Semaphore::MAX_PERMITS)))),
            in_flight: Mutex::new(HashMap::new()),
            callbacks: tokio::sync::Mutex::new(JoinSet::new()),
        }
    }

    /// Wait for an admission slot for a payload of `len` bytes.
    ///
    /// Admission is FIFO-fair: waiters unblock in the order they parked.
    /// The wait is capped at `ack_timeout`; a publish that cannot even be
    /// admitted within the ack window would have timed out anyway.
    pub(crate) async fn admit(&self, len: usize, ack_timeout: Duration) -> Result<Permits, AdmitError> {
        let deadline = Instant::now() + ack_timeout;

        let count = match time::timeout_at(deadline, Arc::clone(&self.slots).acquire_owned()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => return Err(AdmitError::Closed),
            Err(_elapsed) => return Err(AdmitError::TimedOut),
        };

        let bytes = match &self.byte_slots {
            None => None,
            Some(byte_slots) => {
                let wanted = u32::try_from(len).unwrap_or(u32::MAX);
                match time::timeout_at(deadline, Arc::clone(byte_slots).acquire_many_owned(wanted))
                    .await
                {
                    Ok(Ok(permit)) => Some(permit),
                    Ok(Err(_closed)) => return Err(AdmitError::Closed),
                    Err(_elapsed) => return Err(AdmitError::TimedOut),
                }
            }
        };

        Ok(Permits {
            _count: count,
            _bytes: bytes,
        })
    }

    pub(crate) fn insert(
        &self,
        guid: String,
        completion: oneshot::Sender<Result<(), Error>>,
        permits: Permits,
    ) {
        let record = InFlight {
            completion,
            _permits: permits,
        };
        self.in_flight.lock().unwrap().insert(guid, record);
    }

    /// Remove a record, releasing its admission permits.
    pub(crate) fn take(&self, guid: &str) -> Option<InFlight> {
        self.in_flight.lock().unwrap().remove(guid)
    }

    /// Terminate a record with the server's verdict.
    ///
    /// Acks for unknown guids are dropped: the record already timed out or
    /// belongs to a replaced session.
    pub(crate) fn complete(&self, guid: &str, result: Result<(), Error>) {
        match self.take(guid) {
            Some(record) => {
                let _ = record.completion.send(result);
            }
            None => log::debug!("ignoring ack for unknown publish {guid}"),
        }
    }

    /// Terminate every live record and wake every parked admission.
    ///
    /// Used on session close and on ping-declared loss. Closing the
    /// semaphores makes all future admissions fail immediately.
    pub(crate) fn fail_all(&self, error: impl Fn() -> Error) {
        self.slots.close();
        if let Some(byte_slots) = &self.byte_slots {
            byte_slots.close();
        }

        let drained = {
            let mut in_flight = self.in_flight.lock().unwrap();
            in_flight.drain().collect::<Vec<_>>()
        };
        for (_, record) in drained {
            let _ = record.completion.send(Err(error()));
        }
    }

    pub(crate) fn in_flight_len(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    /// Run an ack callback on its own worker task.
    ///
    /// Concurrency is naturally bounded by the in-flight limit: there can
    /// never be more completion tasks than admitted publishes.
    pub(crate) async fn spawn_callback<F>(&self, callback: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.callbacks.lock().await.spawn(callback);
    }

    /// Wait for outstanding ack callbacks, so none fires after `close()`
    /// has returned. Stragglers are aborted once `timeout` elapses.
    pub(crate) async fn drain_callbacks(&self, timeout: Duration) {
        let mut callbacks = self.callbacks.lock().await;
        let deadline = Instant::now() + timeout;
        while !callbacks.is_empty() {
            match time::timeout_at(deadline, callbacks.join_next()).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_elapsed) => {
                    callbacks.abort_all();
                    break;
                }
            }
        }
    }
}

/// Generate a fresh publish guid: 16 random bytes, lowercase hex.
pub(crate) fn new_guid() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{:032x}", u128::from_be_bytes(bytes))
}

pin_project! {
    /// A [`Future`] resolving once a publish reaches its terminal state
    ///
    /// Resolves with the publish guid when the server acknowledges the
    /// message, or with the error that terminated the record.
    ///
    /// Obtained from [`Client::publish_acked`].
    ///
    /// [`Client::publish_acked`]: crate::Client::publish_acked
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct PublishAckFuture {
        session: Arc<Session>,
        guid: String,
        receiver: oneshot::Receiver<Result<(), Error>>,
        #[pin]
        deadline: Sleep,
    }
}

impl PublishAckFuture {
    pub(crate) fn new(
        session: Arc<Session>,
        guid: String,
        receiver: oneshot::Receiver<Result<(), Error>>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            session,
            guid,
            receiver,
            deadline: sleep(ack_timeout),
        }
    }

    /// The guid assigned to this publish
    #[must_use]
    pub fn guid(&self) -> &str {
        &self.guid
    }
}

impl Future for PublishAckFuture {
    type Output = Result<String, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match Pin::new(&mut *this.receiver).poll(cx) {
            Poll::Ready(Ok(Ok(()))) => Poll::Ready(Ok(this.guid.clone())),
            Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(err)),
            Poll::Ready(Err(_sender_gone)) => Poll::Ready(Err(this.session.terminal_error())),
            Poll::Pending => match this.deadline.poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(()) => {
                    if this.session.publisher.take(this.guid).is_some() {
                        Poll::Ready(Err(Error::PublishAckTimeout {
                            guid: this.guid.clone(),
                        }))
                    } else {
                        // Lost the race against the ack dispatcher: the
                        // verdict is already on its way down the channel.
                        match Pin::new(&mut *this.receiver).poll(cx) {
                            Poll::Ready(Ok(result)) => {
                                Poll::Ready(result.map(|()| this.guid.clone()))
                            }
                            Poll::Ready(Err(_sender_gone)) => {
                                Poll::Ready(Err(this.session.terminal_error()))
                            }
                            Poll::Pending => Poll::Pending,
                        }
                    }
                }
            },
        }
    }
}

impl std::fmt::Debug for PublishAckFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishAckFuture")
            .field("guid", &self.guid)
            .finish_non_exhaustive()
    }
}
