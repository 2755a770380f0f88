use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
	#[error("malformed report: {0}")]
	Malformed(String)
}

#[derive(Debug, Error)]
pub enum EncodeError {
	#[error("unknown output style '{0}' (expected kv, csv or gzip-json)")]
	UnknownStyle(String),

	#[error("could not serialize report: {0}")]
	Serialize(#[from] serde_json::Error),

	#[error("could not compress report: {0}")]
	Compress(#[from] io::Error)
}

/// A POST that got no HTTP response back.
#[derive(Debug, Error)]
pub enum TransportError {
	#[error(transparent)]
	Http(#[from] ureq::Transport),

	#[error("{0}")]
	Other(String)
}

#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error("delivery to {destination} failed after {attempts} attempt(s): {last_error}")]
	TransportExhausted {
		destination: String,
		attempts: u32,
		#[source]
		last_error: TransportError
	},

	#[error("could not write report: {0}")]
	Sink(#[from] io::Error)
}
