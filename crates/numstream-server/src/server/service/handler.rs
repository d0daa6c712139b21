//! gRPC service implementation for resumable sequence streaming.
//!
//! This module defines [`SequenceService`], the implementation of the
//! [`Sequence`] gRPC service. Both RPCs share one code path and differ only in
//! the [`Strategy`] they hand to the producer.
//!
//! ## Responsibilities
//!
//! - Validate incoming requests and enforce the configured quantity limit.
//! - Generate the fresh sequence and resolve the call's session, resuming an
//!   existing one when the `client-id` metadata matches.
//! - Spawn the producer and expose its channel as the response stream.
//! - Run the idle-session sweep and coordinate graceful shutdown.

use crate::server::{
    config::ServerConfig,
    session::{
        store::{Resolution, Resolved, SessionStore},
        sweeper::sweep_loop,
    },
    streaming::producer::{Outcome, drain_session, generate},
    telemetry::{
        decrement_streams_inflight, increment_requests, increment_sessions_resumed,
        increment_stream_errors, increment_streams_inflight, increment_values_emitted,
        record_stream_duration,
    },
};
use core::{pin::Pin, time::Duration};
use futures::TryStreamExt;
use numstream_core::{
    Error, Strategy,
    proto::{SequenceRequest, SequenceResponse, sequence_response::Payload, sequence_server::Sequence},
    types::CLIENT_ID_METADATA_KEY,
};
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    time::{sleep, timeout},
};
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, metadata::MetadataMap};
use tracing::Instrument;

/// Response stream shared by both RPCs.
pub type ValueStream = Pin<Box<dyn Stream<Item = Result<SequenceResponse, Status>> + Send>>;

/// gRPC service streaming doubling and random sequences.
///
/// Cloning is cheap; clones share the session store and the shutdown state.
#[derive(Clone)]
pub struct SequenceService {
    config: ServerConfig,
    store: Arc<SessionStore>,
    state: Arc<ServiceState>,
}

struct ServiceState {
    accepting: AtomicBool,
    streams_inflight: AtomicUsize,
    shutdown_token: CancellationToken,
}

impl SequenceService {
    /// Creates the service and spawns the idle-session sweep.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(SessionStore::new(config.session_ttl));
        let shutdown_token = CancellationToken::new();

        tokio::spawn(sweep_loop(
            Arc::clone(&store),
            config.sweep_interval,
            shutdown_token.child_token(),
        ));

        Self {
            config,
            store,
            state: Arc::new(ServiceState {
                accepting: AtomicBool::new(true),
                streams_inflight: AtomicUsize::new(0),
                shutdown_token,
            }),
        }
    }

    /// The session registry backing this service.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Number of producers currently draining a session.
    pub fn streams_inflight(&self) -> usize {
        self.state.streams_inflight.load(Ordering::Relaxed)
    }

    /// Gracefully shuts the service down.
    ///
    /// - Refuses new calls.
    /// - Waits up to the configured timeout for in-flight streams to finish.
    /// - Cancels whatever is still running, including the sweep task.
    pub async fn shutdown(&self) {
        tracing::info!("Refusing new requests");
        self.state.accepting.store(false, Ordering::Relaxed);

        tracing::info!(
            "Draining in-flight streams ({} active)",
            self.streams_inflight()
        );
        let drained = timeout(self.config.shutdown_timeout, async {
            while self.streams_inflight() > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drained {
            Ok(()) => tracing::debug!("All in-flight streams drained successfully"),
            Err(_) => tracing::warn!(
                "Graceful drain timed out ({} streams still active)",
                self.streams_inflight()
            ),
        }

        tracing::debug!("Cancelling remaining work via shutdown token");
        self.state.shutdown_token.cancel();
    }

    /// Handles a call for either strategy.
    ///
    /// If `metrics` is enabled, emits telemetry for:
    /// - request rate per strategy
    /// - values emitted
    /// - resumed sessions
    /// - concurrent stream count
    /// - stream duration
    /// - stream errors
    #[tracing::instrument(
        skip_all,
        fields(
            strategy = %strategy,
            quantity = req.get_ref().quantity,
            client_id = tracing::field::Empty,
        )
    )]
    async fn stream_sequence(
        &self,
        strategy: Strategy,
        req: Request<SequenceRequest>,
    ) -> Result<Response<ValueStream>, Status> {
        let start = std::time::Instant::now();

        if !self.state.accepting.load(Ordering::Relaxed) {
            increment_stream_errors();
            return Err(Error::ServiceShutdown.into());
        }

        let client_id = client_id(req.metadata());
        if let Some(id) = &client_id {
            tracing::Span::current().record("client_id", id.as_str());
        }

        let SequenceRequest { quantity, seed } = req.into_inner();
        let count = self.validate(quantity).inspect_err(|_| increment_stream_errors())?;

        increment_requests(strategy.name());

        let sequence = generate(strategy, count, seed)
            .await
            .inspect_err(|e| {
                increment_stream_errors();
                tracing::error!("Failed to generate sequence: {e}");
            })?;

        let Resolved {
            session,
            resolution,
        } = self.store.resolve(client_id.as_deref(), quantity, sequence);
        match resolution {
            Resolution::Resumed => {
                increment_sessions_resumed();
                tracing::info!("Resuming session");
            }
            Resolution::Created => tracing::debug!("Registered session"),
            Resolution::Ephemeral => tracing::debug!("Streaming ephemeral session"),
        }

        increment_streams_inflight();
        self.state.streams_inflight.fetch_add(1, Ordering::Relaxed);

        let (resp_tx, resp_rx) =
            mpsc::channel::<Result<SequenceResponse, Status>>(self.config.stream_buffer_size);

        let state = Arc::clone(&self.state);
        let interval = self.config.emit_interval;

        let fut = async move {
            match drain_session(session, resp_tx, interval, state.shutdown_token.clone()).await {
                Ok(Outcome::Drained { emitted, checksum }) => {
                    tracing::debug!(emitted, checksum = %checksum, "Stream finished");
                }
                Ok(Outcome::Disconnected { emitted, position }) => {
                    tracing::info!(emitted, position, "Client disconnected");
                }
                Ok(Outcome::Abandoned) => {
                    tracing::debug!("Client disconnected before streaming started");
                }
                Err(e) => tracing::warn!("Stream aborted: {e}"),
            }

            state.streams_inflight.fetch_sub(1, Ordering::Relaxed);
            decrement_streams_inflight();
            record_stream_duration(start.elapsed().as_millis() as f64);
        };

        tokio::spawn(fut.instrument(tracing::info_span!("streaming")));

        let stream = ReceiverStream::new(resp_rx)
            .inspect_ok(|msg| {
                if matches!(msg.payload, Some(Payload::Value(_))) {
                    increment_values_emitted(1);
                }
            })
            .inspect_err(|_e| {
                increment_stream_errors();
            });

        Ok(Response::new(Box::pin(stream)))
    }

    fn validate(&self, quantity: i64) -> numstream_core::Result<usize> {
        if quantity < 0 {
            return Err(Error::InvalidRequest {
                reason: format!("Quantity must not be negative (got {quantity})"),
            });
        }

        if quantity > self.config.max_quantity {
            return Err(Error::InvalidRequest {
                reason: format!(
                    "Quantity {} exceeds maximum allowed ({})",
                    quantity, self.config.max_quantity
                ),
            });
        }

        usize::try_from(quantity).map_err(|_| Error::InvalidRequest {
            reason: format!("Quantity {quantity} is not addressable on this platform"),
        })
    }
}

/// Reads the optional client identifier from the call metadata.
///
/// A missing, empty, or non-ASCII entry selects an ephemeral session.
fn client_id(metadata: &MetadataMap) -> Option<String> {
    metadata
        .get(CLIENT_ID_METADATA_KEY)
        .and_then(|value| value.to_str().ok())
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

#[tonic::async_trait]
impl Sequence for SequenceService {
    type DoublingStream = ValueStream;
    type RandomStream = ValueStream;

    async fn doubling(
        &self,
        req: Request<SequenceRequest>,
    ) -> Result<Response<Self::DoublingStream>, Status> {
        self.stream_sequence(Strategy::Doubling, req).await
    }

    async fn random(
        &self,
        req: Request<SequenceRequest>,
    ) -> Result<Response<Self::RandomStream>, Status> {
        self.stream_sequence(Strategy::Random, req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use numstream_core::{
        message::Message,
        types::{MAX_RANDOM_VALUE, Value},
    };
    use tonic::Code;

    fn service() -> SequenceService {
        SequenceService::new(ServerConfig {
            session_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(3600),
            ..ServerConfig::default()
        })
    }

    fn request(quantity: i64, seed: u64, client_id: Option<&str>) -> Request<SequenceRequest> {
        let mut req = Request::new(SequenceRequest::new(quantity, seed));
        if let Some(id) = client_id {
            req.metadata_mut()
                .insert(CLIENT_ID_METADATA_KEY, id.parse().unwrap());
        }
        req
    }

    async fn next_message(stream: &mut ValueStream) -> Message {
        stream.next().await.unwrap().unwrap().decode().unwrap()
    }

    async fn collect(mut stream: ValueStream) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(msg) = stream.next().await {
            messages.push(msg.unwrap().decode().unwrap());
        }
        messages
    }

    fn values(raw: &[u32]) -> Vec<Message> {
        raw.iter()
            .map(|&v| Message::Value(Value::from(v)))
            .collect()
    }

    #[tokio::test]
    async fn rejects_negative_quantity() {
        let err = service()
            .doubling(request(-1, 1, None))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn rejects_quantity_above_maximum() {
        let service = SequenceService::new(ServerConfig {
            max_quantity: 8,
            ..ServerConfig::default()
        });
        let err = service.random(request(9, 0, None)).await.err().unwrap();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn empty_client_id_is_ephemeral() {
        let service = service();
        let stream = service
            .doubling(request(0, 1, Some("")))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(collect(stream).await, vec![Message::Checksum(Value::ZERO)]);
        assert!(service.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn doubling_streams_values_then_checksum() {
        let stream = service()
            .doubling(request(4, 1, None))
            .await
            .unwrap()
            .into_inner();

        let mut expected = values(&[1, 2, 4, 8]);
        expected.push(Message::Checksum(Value::from(15_u32)));
        assert_eq!(collect(stream).await, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn random_streams_quantity_plus_one_values() {
        let stream = service()
            .random(request(3, 0, None))
            .await
            .unwrap()
            .into_inner();
        let messages = collect(stream).await;

        let (checksum, values) = messages.split_last().unwrap();
        assert_eq!(values.len(), 4);

        let mut sum = Value::ZERO;
        for message in values {
            let Message::Value(value) = message else {
                panic!("unexpected {message:?}");
            };
            assert!(*value <= Value::from(MAX_RANDOM_VALUE));
            sum += value;
        }
        assert_eq!(checksum, &Message::Checksum(sum));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_with_same_client_id_resumes_at_cursor() {
        let service = service();

        let mut first = service
            .doubling(request(10, 1, Some("x")))
            .await
            .unwrap()
            .into_inner();
        for expected in [1_u32, 2, 4, 8] {
            assert_eq!(
                next_message(&mut first).await,
                Message::Value(Value::from(expected))
            );
        }
        drop(first);
        assert!(service.store().contains("x"));

        // The continuation request would build a different sequence; the
        // stored session wins.
        let second = service
            .doubling(request(6, 8, Some("x")))
            .await
            .unwrap()
            .into_inner();

        let mut expected = values(&[16, 32, 64, 128, 256, 512]);
        expected.push(Message::Checksum(Value::from(1023_u32)));
        assert_eq!(collect(second).await, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn ephemeral_reconnect_starts_over() {
        let service = service();

        let mut first = service
            .doubling(request(10, 1, None))
            .await
            .unwrap()
            .into_inner();
        next_message(&mut first).await;
        next_message(&mut first).await;
        drop(first);

        let second = service
            .doubling(request(8, 4, None))
            .await
            .unwrap()
            .into_inner();
        let messages = collect(second).await;
        assert_eq!(messages.first(), Some(&Message::Value(Value::from(4_u32))));
        assert_eq!(messages.len(), 9);
        assert!(service.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_refuses_new_calls() {
        let service = service();
        service.shutdown().await;

        let err = service
            .doubling(request(1, 1, None))
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), Code::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_inflight_streams() {
        let service = service();
        let stream = service
            .doubling(request(2, 1, None))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(service.streams_inflight(), 1);

        let consumer = tokio::spawn(collect(stream));
        service.shutdown().await;

        assert_eq!(service.streams_inflight(), 0);
        assert_eq!(consumer.await.unwrap().len(), 3);
    }
}
