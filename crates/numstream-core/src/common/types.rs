//! # Protocol Types and Constants
//!
//! Values shared by the client and the server so both sides agree on the
//! wire contract and on the default limits.
//!
//! ## Type Aliases
//!
//! - [`Value`] - One element of a sequence (arbitrary precision, unsigned).
//!
//! ## Constants
//!
//! - [`CLIENT_ID_METADATA_KEY`] - Metadata key selecting resumable sessions.
//! - [`MAX_RANDOM_VALUE`] - Inclusive upper bound of random values.
//! - [`MAX_QUANTITY`] - Default upper bound on requested quantities.
//! - [`MAX_SEED`] - Exclusive upper bound of randomly chosen seeds.

/// One element of a sequence.
///
/// Doubling sequences outgrow every fixed-width integer after a few dozen
/// steps, so values are carried as unbounded unsigned integers.
pub type Value = num_bigint::BigUint;

/// Metadata key carrying the optional client identifier.
///
/// When present, the server keeps the call's session under this identifier so
/// a reconnecting client resumes where it left off.
pub const CLIENT_ID_METADATA_KEY: &str = "client-id";

/// Inclusive upper bound of values produced by the random strategy.
pub const MAX_RANDOM_VALUE: u32 = u32::MAX;

/// Default upper bound on the number of values a single request may ask for.
pub const MAX_QUANTITY: i64 = 0xffff;

/// Exclusive upper bound of seeds picked when the user does not supply one.
pub const MAX_SEED: u64 = 0xff;
