//! Shared building blocks used by both the server and the client.
//!
//! ## Submodules
//!
//! - [`error`] - Error type shared across crates, convertible to
//!   [`tonic::Status`].
//! - [`types`] - Protocol constants and type aliases.
//! - [`session`] - The [`Session`] progress record.
//! - [`generator`] - Sequence generation strategies.
//! - [`checksum`] - Checksum computation and the big-endian value codec.
//! - [`message`] - Constructors and accessors for the wire messages.

pub mod checksum;
pub mod error;
pub mod generator;
pub mod message;
pub mod session;
pub mod types;

pub use error::{Error, Result};
pub use generator::{SequenceGenerator, Strategy};
pub use session::{CursorProbe, Session};
