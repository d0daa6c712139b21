//! Reconnect controller.
//!
//! [`Controller::run`] drives one logical delivery across any number of calls.
//! It spawns a single receive task at a time and waits on two channels:
//!
//! - **reconnect**: the call failed. Connectivity is restored and a new
//!   receive task continues the same session. The reconnect timeout runs from
//!   the first failure after the last received value, so calls that keep
//!   failing without progress are given up on once it elapses.
//! - **done**: the stream ended cleanly. The verdict becomes the [`Summary`].
//!
//! Leaving the loop, successfully or not, cancels the operation's token so
//! that no receive task outlives it.

use crate::client::{
    backoff::Backoff,
    config::ClientConfig,
    consumer::{Finished, Interrupted, Receiver},
    transport::{JITTER, RECONNECT_BASE, RECONNECT_MAX, Transport},
};
use core::time::Duration;
use numstream_core::{Error, Result, Session, Strategy, types::Value};
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep, timeout_at},
};
use tokio_util::sync::CancellationToken;

/// Outcome of a completed delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    /// Sum of every value received.
    pub total: Value,
    /// Whether `total` matches the checksum sent by the server.
    pub verified: bool,
    /// Number of values received.
    pub received: usize,
    /// Number of times connectivity had to be restored.
    pub reconnects: usize,
}

pub struct Controller<T> {
    transport: Arc<T>,
    strategy: Strategy,
    quantity: i64,
    seed: u64,
    resumable: bool,
    reconnect_timeout: Duration,
}

impl<T: Transport> Controller<T> {
    pub fn new(transport: Arc<T>, config: &ClientConfig) -> Self {
        Self {
            transport,
            strategy: config.strategy,
            quantity: config.quantity,
            seed: config.seed,
            resumable: config.is_resumable(),
            reconnect_timeout: config.reconnect_timeout,
        }
    }

    /// Receives the whole sequence, reconnecting as often as needed.
    ///
    /// A checksum mismatch is reported through [`Summary::verified`], not as
    /// an error.
    ///
    /// # Errors
    ///
    /// - [`Error::ReconnectTimeout`] if no value arrives within the reconnect
    ///   timeout of a failure.
    /// - [`Error::Rpc`] if a call is refused with a non-transient status.
    /// - [`Error::SeedOverflow`] if an ephemeral doubling call cannot be
    ///   continued.
    /// - [`Error::Internal`] if a receive task exits without signalling.
    pub async fn run(self) -> Result<Summary> {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        let (reconnect_tx, mut reconnect_rx) = mpsc::channel::<Interrupted>(1);
        let (done_tx, mut done_rx) = mpsc::channel::<Result<Finished>>(1);
        let receiver = Receiver {
            transport: Arc::clone(&self.transport),
            strategy: self.strategy,
            initial_seed: self.seed,
            resumable: self.resumable,
            reconnect_tx,
            done_tx,
            cancel: cancel.child_token(),
        };

        let session = Session::new(self.quantity, Vec::new());
        let mut task = spawn(&receiver, session, Value::ZERO);
        let mut reconnects = 0;
        let mut backoff = Backoff::new(RECONNECT_BASE, RECONNECT_MAX, JITTER);
        // Deadline of the current run of failures and the session length it
        // started at.
        let mut outage: Option<(Instant, usize)> = None;

        loop {
            tokio::select! {
                biased;
                Some(Interrupted { session, checksum, cause }) = reconnect_rx.recv() => {
                    tracing::warn!(
                        code = ?cause.code(),
                        received = session.len(),
                        "Stream lost, reconnecting: {}",
                        cause.message()
                    );
                    let (deadline, delay) = match outage {
                        Some((deadline, received)) if received == session.len() => {
                            (deadline, backoff.next_delay())
                        }
                        _ => {
                            backoff.reset();
                            (Instant::now() + self.reconnect_timeout, Duration::ZERO)
                        }
                    };
                    outage = Some((deadline, session.len()));

                    self.reconnect(deadline, delay).await?;
                    reconnects += 1;
                    task = spawn(&receiver, session, checksum);
                }
                Some(result) = done_rx.recv() => {
                    let Finished { mut session, verified, .. } = result?;
                    return Ok(Summary {
                        total: session.checksum(),
                        verified,
                        received: session.len(),
                        reconnects,
                    });
                }
                joined = &mut task => {
                    let context = match joined {
                        Ok(()) => String::from("Receive task exited without signalling"),
                        Err(e) => format!("Receive task failed: {e}"),
                    };
                    return Err(Error::Internal { context });
                }
            }
        }
    }

    /// Waits `delay`, then restores connectivity, giving up at `deadline`.
    async fn reconnect(&self, deadline: Instant, delay: Duration) -> Result<()> {
        let attempt = async {
            sleep(delay).await;
            self.transport.reconnect().await
        };
        match timeout_at(deadline, attempt).await {
            Ok(result) => result,
            Err(_) => Err(Error::ReconnectTimeout {
                timeout: self.reconnect_timeout,
            }),
        }
    }
}

fn spawn<T: Transport>(receiver: &Receiver<T>, session: Session, checksum: Value) -> JoinHandle<()> {
    tokio::spawn(receiver.clone().run(session, checksum))
}
