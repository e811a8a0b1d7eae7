//! Network transport primitives.
//!
//! Provides non-blocking TCP abstractions for the collector: a listening
//! socket bound to an OS-chosen port and the single accepted connection.
//! Currently mio-based; both types plug into the reactor's readiness
//! polling via [`mio::event::Source`].

pub mod socket;

pub use socket::{Conn, Listener};
