//! Reads RFC 8460 TLS aggregate reports and re-emits them as key/value text,
//! `|`-delimited text, or gzipped JSON, optionally POSTing the latter to a collector.

pub mod config;
pub mod delivery;
pub mod error;
pub mod input;
pub mod tlsrpt;

pub use error::{DeliveryError, EncodeError, ParseError, TransportError};
