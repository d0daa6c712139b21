//! Server-side session registry.
//!
//! - [`store`] - [`SessionStore`](store::SessionStore), the process-wide map
//!   from client identifier to session.
//! - [`sweeper`] - background task evicting idle sessions.

pub mod store;
pub mod sweeper;
