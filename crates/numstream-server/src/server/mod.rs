//! Server-side components of the numstream service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration.
//! - [`service`] - gRPC service entry point (`SequenceService`).
//! - [`session`] - Session store and the idle sweep task.
//! - [`streaming`] - The per-call producer that drains a session.
//! - [`telemetry`] - Logging initialization and optional metrics.

pub mod config;
pub mod service;
pub mod session;
pub mod streaming;
pub mod telemetry;
