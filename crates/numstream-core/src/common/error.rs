//! Error types for the sequence streaming service.
//!
//! [`Error`] captures every reportable failure on either side of the wire. It
//! implements `From<Error>` for `tonic::Status` so server handlers can return
//! it directly with an appropriate status code.

use core::time::Duration;
use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the sequence streaming service.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The operating system entropy source could not produce a value.
    #[error("Entropy source unavailable: {reason}")]
    Entropy { reason: String },

    /// A background task failed before producing a result.
    #[error("Internal error: {context}")]
    Internal { context: String },

    /// The client request was invalid or exceeded constraints.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// A call could not be opened or failed with a non-transient status.
    #[error("RPC failed: {0}")]
    Rpc(#[from] Status),

    /// Connectivity could not be restored within the allotted time.
    #[error("Timed out after {}s: unable to reconnect", .timeout.as_secs())]
    ReconnectTimeout { timeout: Duration },

    /// The last received value cannot be carried as a continuation seed.
    #[error("Continuation seed {value} does not fit in 64 bits")]
    SeedOverflow { value: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {}", context))
            }
            Error::Entropy { reason } => {
                Status::internal(format!("Entropy source unavailable: {}", reason))
            }
            Error::Internal { context } => Status::internal(context),
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::Rpc(status) => status,
            Error::ReconnectTimeout { timeout } => Status::deadline_exceeded(format!(
                "Timed out after {}s: unable to reconnect",
                timeout.as_secs()
            )),
            Error::SeedOverflow { value } => {
                Status::out_of_range(format!("Seed {} does not fit in 64 bits", value))
            }
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
