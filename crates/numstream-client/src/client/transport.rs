//! Connection handling between the consumer and the server.
//!
//! [`Transport`] is the seam the reconnect controller is written against: it
//! opens a call for a strategy and restores connectivity after the stream is
//! lost. [`GrpcTransport`] implements it over a tonic [`Channel`] with HTTP/2
//! keepalive probing, per-call retry of transient failures, and a reconnect
//! loop with exponential backoff.

use crate::client::{backoff::Backoff, config::ClientConfig};
use core::{pin::Pin, time::Duration};
use futures::Stream;
use numstream_core::{
    Error, Result, Strategy,
    proto::{SequenceRequest, SequenceResponse, sequence_client::SequenceClient},
    types::CLIENT_ID_METADATA_KEY,
};
use parking_lot::Mutex;
use tokio::time::sleep;
use tonic::{
    Code, Request, Status,
    codec::CompressionEncoding,
    metadata::AsciiMetadataValue,
    transport::{Channel, Endpoint},
};

/// Messages of one open call.
pub type ResponseStream = Pin<Box<dyn Stream<Item = core::result::Result<SequenceResponse, Status>> + Send>>;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(1);
const CALL_RETRY_BASE: Duration = Duration::from_millis(100);
const CALL_RETRY_MAX: Duration = Duration::from_secs(2);
pub(crate) const RECONNECT_BASE: Duration = Duration::from_millis(100);
pub(crate) const RECONNECT_MAX: Duration = Duration::from_secs(5);
pub(crate) const JITTER: f64 = 0.10;

/// Status codes worth retrying the same call for.
pub const fn is_transient(code: Code) -> bool {
    matches!(
        code,
        Code::NotFound | Code::Aborted | Code::Cancelled | Code::Unavailable | Code::Unknown
    )
}

/// Opens calls and restores connectivity for the reconnect controller.
#[tonic::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a streaming call for `strategy`.
    async fn open(
        &self,
        strategy: Strategy,
        request: SequenceRequest,
    ) -> core::result::Result<ResponseStream, Status>;

    /// Re-establishes connectivity with the server.
    ///
    /// May wait indefinitely; the caller bounds it with a timeout.
    async fn reconnect(&self) -> Result<()>;
}

/// [`Transport`] over a tonic channel.
pub struct GrpcTransport {
    endpoint: Endpoint,
    channel: Mutex<Channel>,
    client_id: Option<AsciiMetadataValue>,
    max_call_retries: usize,
}

impl GrpcTransport {
    /// Creates a transport for `config.dsn`.
    ///
    /// No connection is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the DSN is not a valid URI or the
    /// client identifier is not valid metadata.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let endpoint = Endpoint::from_shared(config.dsn.clone())
            .map_err(|e| Error::InvalidRequest {
                reason: format!("Invalid DSN {:?}: {e}", config.dsn),
            })?
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .keep_alive_timeout(KEEPALIVE_TIMEOUT)
            .keep_alive_while_idle(true);

        let client_id = config
            .client_id
            .as_deref()
            .map(|id| {
                AsciiMetadataValue::try_from(id).map_err(|e| Error::InvalidRequest {
                    reason: format!("Invalid client id {id:?}: {e}"),
                })
            })
            .transpose()?;

        Ok(Self {
            channel: Mutex::new(endpoint.connect_lazy()),
            endpoint,
            client_id,
            max_call_retries: config.max_call_retries,
        })
    }

    fn client(&self) -> SequenceClient<Channel> {
        SequenceClient::new(self.channel.lock().clone())
            .send_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Gzip)
    }

    fn request(&self, request: SequenceRequest) -> Request<SequenceRequest> {
        let mut request = Request::new(request);
        if let Some(id) = &self.client_id {
            request
                .metadata_mut()
                .insert(CLIENT_ID_METADATA_KEY, id.clone());
        }
        request
    }
}

#[tonic::async_trait]
impl Transport for GrpcTransport {
    async fn open(
        &self,
        strategy: Strategy,
        request: SequenceRequest,
    ) -> core::result::Result<ResponseStream, Status> {
        let mut backoff = Backoff::new(CALL_RETRY_BASE, CALL_RETRY_MAX, JITTER);
        let mut attempt = 1;

        loop {
            let mut client = self.client();
            let call = self.request(request.clone());
            let result = match strategy {
                Strategy::Doubling => client.doubling(call).await,
                Strategy::Random => client.random(call).await,
            };

            match result {
                Ok(response) => return Ok(Box::pin(response.into_inner())),
                Err(status) if is_transient(status.code()) && attempt < self.max_call_retries => {
                    let delay = backoff.next_delay();
                    tracing::debug!(
                        attempt,
                        code = ?status.code(),
                        delay_ms = delay.as_millis() as u64,
                        "Retrying call: {}",
                        status.message()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(status) => return Err(status),
            }
        }
    }

    async fn reconnect(&self) -> Result<()> {
        let mut backoff = Backoff::new(RECONNECT_BASE, RECONNECT_MAX, JITTER);

        loop {
            match self.endpoint.connect().await {
                Ok(channel) => {
                    *self.channel.lock() = channel;
                    tracing::debug!(attempts = backoff.attempt() + 1, "Reconnected");
                    return Ok(());
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::debug!(
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "Connect failed: {e}"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
