//! Client-side components of the numstream service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration.
//! - [`backoff`] - Exponential backoff with jitter.
//! - [`transport`] - The [`Transport`](transport::Transport) seam and its
//!   gRPC implementation (keepalive, call retry, reconnect).
//! - [`consumer`] - The receive task feeding a local session.
//! - [`controller`] - The control loop deciding between reconnect and
//!   completion.
//! - [`telemetry`] - Logging initialization.

pub mod backoff;
pub mod config;
pub mod consumer;
pub mod controller;
pub mod telemetry;
pub mod transport;
