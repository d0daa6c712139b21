//! Per-call production of a sequence stream.
//!
//! - [`producer`] - generates the fresh sequence for a request and drains a
//!   session into the response channel.

pub mod producer;
