//! The receive task.
//!
//! A receive task owns the local [`Session`] for as long as its call is open.
//! It builds the continuation request from the session, opens the call,
//! appends every received value, and finally hands the session back to the
//! control loop through exactly one signal:
//!
//! - [`Interrupted`] on the reconnect channel when the call fails, or
//! - a [`Finished`] verdict (or a fatal error) on the done channel when the
//!   stream ends cleanly.

use crate::client::transport::{Transport, is_transient};
use futures::StreamExt;
use numstream_core::{
    Error, Result, Session, Strategy, message::Message, proto::SequenceRequest, types::Value,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::Level;

/// The call failed before the stream ended cleanly.
#[derive(Debug)]
pub struct Interrupted {
    pub session: Session,
    /// Local sum when the call failed, compared against if no terminal
    /// checksum arrives later.
    pub checksum: Value,
    pub cause: Status,
}

/// The stream ended cleanly.
#[derive(Debug)]
pub struct Finished {
    pub session: Session,
    /// Last checksum received from the server, or the carried one.
    pub checksum: Value,
    /// Whether the local sum matches `checksum`.
    pub verified: bool,
}

/// Everything a receive task needs besides its session.
pub struct Receiver<T> {
    pub transport: Arc<T>,
    pub strategy: Strategy,
    pub initial_seed: u64,
    pub resumable: bool,
    pub reconnect_tx: mpsc::Sender<Interrupted>,
    pub done_tx: mpsc::Sender<Result<Finished>>,
    pub cancel: CancellationToken,
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            strategy: self.strategy,
            initial_seed: self.initial_seed,
            resumable: self.resumable,
            reconnect_tx: self.reconnect_tx.clone(),
            done_tx: self.done_tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<T: Transport> Receiver<T> {
    /// Streams one call into `session`, then signals the control loop.
    ///
    /// `checksum` is the local sum carried over from an interrupted call.
    /// Returns without signalling only when cancelled.
    pub async fn run(self, mut session: Session, mut checksum: Value) {
        let request = match self.continuation(&mut session) {
            Ok(request) => request,
            Err(e) => return self.done(Err(e)).await,
        };
        tracing::debug!(
            quantity = request.quantity,
            seed = request.seed,
            received = session.len(),
            "Opening stream"
        );

        let opened = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return,
            opened = self.transport.open(self.strategy, request) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(cause) if is_transient(cause.code()) => {
                return self.interrupted(session, cause).await;
            }
            Err(cause) => return self.done(Err(Error::Rpc(cause))).await,
        };

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(response)) => match response.decode() {
                    Some(Message::Value(value)) => {
                        session.append(value);
                        if tracing::enabled!(Level::DEBUG) {
                            tracing::debug!(
                                tally = %session.checksum(),
                                value = ?session.last(),
                                "Received value"
                            );
                        }
                    }
                    Some(Message::Checksum(received)) => {
                        checksum = received;
                        tracing::debug!(
                            tally = %session.checksum(),
                            checksum = %checksum,
                            "Received checksum"
                        );
                    }
                    None => tracing::warn!("Ignoring empty response"),
                },
                Some(Err(cause)) => return self.interrupted(session, cause).await,
                None => {
                    let verified = session.checksum() == checksum;
                    return self
                        .done(Ok(Finished {
                            session,
                            checksum,
                            verified,
                        }))
                        .await;
                }
            }
        }
    }

    /// Builds the request for the values `session` is still missing.
    ///
    /// The doubling strategy continues from the last received value. A value
    /// that no longer fits in the `seed` field is fatal for an ephemeral call;
    /// a resumable call is served from the stored session whatever the seed,
    /// so zero is sent instead.
    fn continuation(&self, session: &mut Session) -> Result<SequenceRequest> {
        let quantity = session.remaining().max(0);

        let seed = match (self.strategy, session.last()) {
            (Strategy::Doubling, Some(last)) => match u64::try_from(last) {
                Ok(seed) => seed,
                Err(_) if self.resumable => {
                    tracing::warn!(value = %last, "Continuation seed exceeds 64 bits, sending 0");
                    0
                }
                Err(_) => {
                    return Err(Error::SeedOverflow {
                        value: last.to_string(),
                    });
                }
            },
            _ => self.initial_seed,
        };

        Ok(SequenceRequest::new(quantity, seed))
    }

    async fn interrupted(&self, mut session: Session, cause: Status) {
        let checksum = session.checksum();
        let signal = Interrupted {
            session,
            checksum,
            cause,
        };
        if let Err(e) = self.reconnect_tx.send(signal).await {
            tracing::trace!("Control loop gone, dropping reconnect signal: {e}");
        }
    }

    async fn done(&self, result: Result<Finished>) {
        if let Err(e) = self.done_tx.send(result).await {
            tracing::trace!("Control loop gone, dropping completion signal: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::ResponseStream;
    use numstream_core::proto::SequenceResponse;

    struct Unreachable;

    #[tonic::async_trait]
    impl Transport for Unreachable {
        async fn open(
            &self,
            _strategy: Strategy,
            _request: SequenceRequest,
        ) -> core::result::Result<ResponseStream, Status> {
            Err(Status::unavailable("down"))
        }

        async fn reconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    struct Fixed(Vec<SequenceResponse>);

    #[tonic::async_trait]
    impl Transport for Fixed {
        async fn open(
            &self,
            _strategy: Strategy,
            _request: SequenceRequest,
        ) -> core::result::Result<ResponseStream, Status> {
            Ok(Box::pin(futures::stream::iter(
                self.0.clone().into_iter().map(Ok),
            )))
        }

        async fn reconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    type Channels = (
        mpsc::Receiver<Interrupted>,
        mpsc::Receiver<Result<Finished>>,
    );

    fn receiver<T: Transport>(transport: T, strategy: Strategy, resumable: bool) -> (Receiver<T>, Channels) {
        let (reconnect_tx, reconnect_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = mpsc::channel(1);
        let receiver = Receiver {
            transport: Arc::new(transport),
            strategy,
            initial_seed: 1,
            resumable,
            reconnect_tx,
            done_tx,
            cancel: CancellationToken::new(),
        };
        (receiver, (reconnect_rx, done_rx))
    }

    fn values(raw: &[u64]) -> Vec<Value> {
        raw.iter().copied().map(Value::from).collect()
    }

    #[test]
    fn first_request_uses_initial_seed() {
        let (receiver, _channels) = receiver(Unreachable, Strategy::Doubling, true);
        let mut session = Session::new(10, Vec::new());
        assert_eq!(
            receiver.continuation(&mut session).unwrap(),
            SequenceRequest::new(10, 1)
        );
    }

    #[test]
    fn continuation_carries_remaining_and_last_value() {
        let (receiver, _channels) = receiver(Unreachable, Strategy::Doubling, true);
        let mut session = Session::new(10, values(&[1, 2, 4, 8]));
        assert_eq!(
            receiver.continuation(&mut session).unwrap(),
            SequenceRequest::new(6, 8)
        );
    }

    #[test]
    fn random_continuation_ignores_received_values() {
        let (receiver, _channels) = receiver(Unreachable, Strategy::Random, true);
        let mut session = Session::new(3, values(&[77, 99]));
        assert_eq!(
            receiver.continuation(&mut session).unwrap(),
            SequenceRequest::new(1, 1)
        );
    }

    #[test]
    fn overfull_session_requests_nothing() {
        let (receiver, _channels) = receiver(Unreachable, Strategy::Random, true);
        let mut session = Session::new(1, values(&[1, 2, 3]));
        assert_eq!(receiver.continuation(&mut session).unwrap().quantity, 0);
    }

    #[test]
    fn oversized_seed_is_fatal_only_when_ephemeral() {
        let huge = Value::from(u64::MAX) + 1_u32;

        let (ephemeral, _channels) = receiver(Unreachable, Strategy::Doubling, false);
        let mut session = Session::new(100, vec![huge.clone()]);
        assert!(matches!(
            ephemeral.continuation(&mut session),
            Err(Error::SeedOverflow { .. })
        ));

        let (resumable, _channels) = receiver(Unreachable, Strategy::Doubling, true);
        let mut session = Session::new(100, vec![huge]);
        assert_eq!(resumable.continuation(&mut session).unwrap().seed, 0);
    }

    #[tokio::test]
    async fn transient_open_failure_requests_reconnect() {
        let (receiver, (mut reconnect_rx, _done_rx)) =
            receiver(Unreachable, Strategy::Doubling, true);
        receiver
            .run(Session::new(4, values(&[1, 2])), Value::from(5_u32))
            .await;

        let signal = reconnect_rx.recv().await.unwrap();
        assert_eq!(signal.cause.code(), tonic::Code::Unavailable);
        assert_eq!(signal.checksum, Value::from(3_u32));
        assert_eq!(signal.session.len(), 2);
    }

    struct Failing(Vec<SequenceResponse>);

    #[tonic::async_trait]
    impl Transport for Failing {
        async fn open(
            &self,
            _strategy: Strategy,
            _request: SequenceRequest,
        ) -> core::result::Result<ResponseStream, Status> {
            let items = self.0.clone().into_iter().map(Ok);
            let lost = core::iter::once(Err(Status::unavailable("connection reset")));
            Ok(Box::pin(futures::stream::iter(items.chain(lost))))
        }

        async fn reconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn mid_stream_failure_carries_local_sum() {
        let messages = vec![
            SequenceResponse::value(&Value::from(1_u32)),
            SequenceResponse::value(&Value::from(2_u32)),
        ];
        let (receiver, (mut reconnect_rx, _done_rx)) =
            receiver(Failing(messages), Strategy::Doubling, true);
        receiver.run(Session::new(4, Vec::new()), Value::ZERO).await;

        let signal = reconnect_rx.recv().await.unwrap();
        assert_eq!(signal.checksum, Value::from(3_u32));
        assert_eq!(signal.session.len(), 2);
    }

    #[tokio::test]
    async fn clean_end_compares_checksum() {
        let messages = vec![
            SequenceResponse::value(&Value::from(1_u32)),
            SequenceResponse::value(&Value::from(2_u32)),
            SequenceResponse::checksum(&Value::from(3_u32)),
        ];
        let (receiver, (_reconnect_rx, mut done_rx)) =
            receiver(Fixed(messages), Strategy::Doubling, true);
        receiver.run(Session::new(2, Vec::new()), Value::ZERO).await;

        let finished = done_rx.recv().await.unwrap().unwrap();
        assert!(finished.verified);
        assert_eq!(finished.session.len(), 2);
        assert_eq!(finished.checksum, Value::from(3_u32));
    }

    #[tokio::test]
    async fn missing_terminal_checksum_uses_carried_value() {
        let messages = vec![SequenceResponse::value(&Value::from(4_u32))];
        let (receiver, (_reconnect_rx, mut done_rx)) =
            receiver(Fixed(messages), Strategy::Doubling, true);
        receiver
            .run(Session::new(2, values(&[1])), Value::from(5_u32))
            .await;

        let finished = done_rx.recv().await.unwrap().unwrap();
        assert!(finished.verified);
    }

    #[tokio::test]
    async fn cancelled_receiver_does_not_signal() {
        let (receiver, (mut reconnect_rx, mut done_rx)) =
            receiver(Unreachable, Strategy::Doubling, true);
        receiver.cancel.cancel();
        receiver.clone().run(Session::new(2, Vec::new()), Value::ZERO).await;
        drop(receiver);

        assert!(reconnect_rx.recv().await.is_none());
        assert!(done_rx.recv().await.is_none());
    }
}
