//! gRPC service implementation and session coordination.
//!
//! This module contains the client-facing request handling: validation,
//! sequence generation, session resolution, and spawning the producer that
//! drains the session into the response stream. It also owns the sweep task
//! and graceful shutdown.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`SequenceService`).
//! - [`runtime`] - Server assembly: compression, health, reflection, gRPC-web.

pub mod handler;
pub mod runtime;
