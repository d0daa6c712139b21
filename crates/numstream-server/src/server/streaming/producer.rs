use crate::server::session::store::SharedSession;
use core::time::Duration;
use numstream_core::{
    Error, SequenceGenerator, Strategy,
    proto::SequenceResponse,
    types::Value,
};
use tokio::{sync::mpsc, time::sleep};
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Sending half of a call's response stream.
pub type ResponseSender = mpsc::Sender<Result<SequenceResponse, Status>>;

/// How a drained call ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every value from the cursor onward was emitted, followed by the
    /// checksum.
    Drained { emitted: usize, checksum: Value },
    /// The peer went away. The session keeps its cursor at `position`.
    Disconnected { emitted: usize, position: usize },
    /// The peer went away before the session became available.
    Abandoned,
}

/// Generates the fresh sequence for a request on the blocking pool.
///
/// Doubling sequences of the maximum length hold values tens of kilobytes
/// wide, and the random strategy reads from the operating system, so neither
/// runs on a runtime worker.
///
/// # Errors
///
/// - [`Error::Entropy`] if the random strategy cannot read its source.
/// - [`Error::Internal`] if the generation task panicked.
pub async fn generate(strategy: Strategy, quantity: usize, seed: u64) -> numstream_core::Result<Vec<Value>> {
    tokio::task::spawn_blocking(move || strategy.generate(quantity, &Value::from(seed)))
        .await
        .map_err(|e| Error::Internal {
            context: format!("{strategy} generation task failed: {e}"),
        })?
}

/// Streams `session` into `resp_tx` from its cursor onward.
///
/// The session's drain lock is held for the whole call, so a second call
/// under the same client identifier waits here and picks up wherever this one
/// stops. Each value is followed by a pause of `interval`; that pause is where
/// a vanished peer or a service shutdown is noticed. Once the cursor is past
/// the last value, the checksum of the full sequence is sent.
///
/// A value that cannot be handed to the response channel is logged and
/// skipped; the client's checksum comparison is what decides whether the
/// delivery succeeded.
///
/// # Errors
///
/// Returns [`Error::ServiceShutdown`] if `shutdown_token` is cancelled while
/// the call is still draining. The client is sent an `UNAVAILABLE` status on a
/// best-effort basis.
pub async fn drain_session(
    session: SharedSession,
    resp_tx: ResponseSender,
    interval: Duration,
    shutdown_token: CancellationToken,
) -> numstream_core::Result<Outcome> {
    let mut session = tokio::select! {
        biased;
        () = shutdown_token.cancelled() => return Err(shutdown(&resp_tx).await),
        () = resp_tx.closed() => return Ok(Outcome::Abandoned),
        guard = session.lock() => guard,
    };

    let mut emitted = 0;
    while let Some(value) = session.current().cloned() {
        let position = session.position();
        if let Err(e) = resp_tx.send(Ok(SequenceResponse::value(&value))).await {
            tracing::warn!(position, "Failed to send value: {e}");
        }
        session.advance();
        emitted += 1;

        tokio::select! {
            biased;
            () = shutdown_token.cancelled() => return Err(shutdown(&resp_tx).await),
            () = resp_tx.closed() => {
                let position = session.position();
                tracing::debug!(position, "Peer disconnected");
                return Ok(Outcome::Disconnected { emitted, position });
            }
            () = sleep(interval) => {}
        }
    }

    let checksum = session.checksum();
    if let Err(e) = resp_tx.send(Ok(SequenceResponse::checksum(&checksum))).await {
        tracing::warn!("Failed to send checksum: {e}");
    }

    Ok(Outcome::Drained { emitted, checksum })
}

async fn shutdown(resp_tx: &ResponseSender) -> Error {
    let err = Error::ServiceShutdown;
    if let Err(e) = resp_tx.send(Err(err.clone().into())).await {
        tracing::trace!("Failed to forward shutdown status: {e}");
    }
    err
}
