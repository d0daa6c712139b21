//! Assembly of the tonic server around [`SequenceService`].

use crate::server::service::handler::SequenceService;
use core::future::Future;
use futures::Stream;
use numstream_core::proto::{FILE_DESCRIPTOR_SET, sequence_server::SequenceServer};
use tokio::io::{AsyncRead, AsyncWrite};
use tonic::{
    codec::CompressionEncoding,
    transport::{Server, server::Connected},
};
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// Wraps the service with the compression encodings it offers and accepts.
pub fn build_sequence_service(service: SequenceService) -> SequenceServer<SequenceService> {
    SequenceServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
}

/// Serves `service` on `incoming` until `signal` resolves.
///
/// Alongside the sequence service this registers the gRPC health service and
/// server reflection, and accepts gRPC-web from any origin. Once `signal`
/// resolves the health status flips to not serving and the service drains
/// its in-flight streams before the listener is closed.
pub async fn serve_with_incoming<I, IO, IE, F>(
    service: SequenceService,
    incoming: I,
    signal: F,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IO::ConnectInfo: Clone + Send + Sync + 'static,
    IE: Into<tower::BoxError>,
    F: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<SequenceServer<SequenceService>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let shutdown = {
        let service = service.clone();
        async move {
            signal.await;

            health_reporter
                .set_not_serving::<SequenceServer<SequenceService>>()
                .await;
            service.shutdown().await;
        }
    };

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_sequence_service(service))
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}
