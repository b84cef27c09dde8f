//! Probing: request shaping, transport, classification
//!
//! - [`classifier`] - maps an HTTP exchange onto an outcome kind
//! - [`request`] - per-target request parameters and mismatch retries
//! - [`transport`] - the HTTP POST behind a mockable trait
//! - [`prober`] - one probe, end to end

pub mod classifier;
pub mod prober;
pub mod request;
pub mod transport;

pub use classifier::classify;
pub use prober::Prober;
pub use request::{RequestShape, TokenParam};
pub use transport::{HttpReply, HttpTransport, ProbeTransport, TransportError};
