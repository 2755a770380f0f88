use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use ureq::{Agent, AgentBuilder};

use crate::error::{DeliveryError, TransportError};
use crate::tlsrpt::{Payload, TLSRPT_GZIP_CONTENT_TYPE};

pub const DEFAULT_ATTEMPTS: u32 = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Sends one request body somewhere. A returned status means a response was
/// received, whatever its code; `Err` means no response came back at all.
pub trait Transport {
	fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<u16, TransportError>;
}

/// Blocking HTTP transport. Redirects are not followed, so a 3xx answer is the outcome.
pub struct HttpTransport {
	agent: Agent
}

impl HttpTransport {
	pub fn new(timeout: Duration) -> Self {
		HttpTransport {
			agent: AgentBuilder::new().timeout(timeout).redirects(0).build()
		}
	}
}

impl Default for HttpTransport {
	fn default() -> Self {
		HttpTransport::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
	}
}

impl Transport for HttpTransport {
	fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<u16, TransportError> {
		match self.agent.post(url).set("Content-Type", content_type).send_bytes(body) {
			Ok(response) => Ok(response.status()),
			Err(ureq::Error::Status(code, _)) => Ok(code),
			Err(e) => {
				let message = e.to_string();
				Err(e.into_transport().map(TransportError::from).unwrap_or(TransportError::Other(message)))
			},
		}
	}
}

/// Where an encoded payload ends up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
	Stdout,
	File(PathBuf),
	Http {
		url: String,
		attempts: u32
	}
}

/// What happened to a payload that was handed off successfully.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
	Written,
	Posted(Receipt)
}

/// The collector's answer to a POST.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
	pub status: u16,
	pub attempts: u32
}

impl Receipt {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Hands a payload to its target.
pub fn deliver<T: Transport>(payload: &Payload, target: &Target, transport: &T) -> Result<Outcome, DeliveryError> {
	match target {
		Target::Stdout => {
			write_stdout(payload)?;
			Ok(Outcome::Written)
		},
		Target::File(path) => {
			write_file(payload, path)?;
			Ok(Outcome::Written)
		},
		Target::Http { url, attempts } => {
			let receipt = post_with_retry(transport, url, payload.as_bytes(), *attempts)?;
			Ok(Outcome::Posted(receipt))
		},
	}
}

fn write_stdout(payload: &Payload) -> Result<(), DeliveryError> {
	let stdout = io::stdout();
	let mut handle = stdout.lock();
	handle.write_all(payload.as_bytes())?;
	handle.flush()?;
	Ok(())
}

/// Writes the payload to `path`, creating parent directories as needed.
pub fn write_file(payload: &Payload, path: &Path) -> Result<(), DeliveryError> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			fs::create_dir_all(parent)?;
		}
	}

	fs::write(path, payload.as_bytes())?;
	info!(path = %path.display(), bytes = payload.as_bytes().len(), "wrote report");
	Ok(())
}

/// File name for a compressed report kept on disk: `<report-id>.json.gz`, or a
/// timestamped name when the report carries no id.
pub fn spool_path(directory: &Path, report_id: &str, process_time: u64) -> PathBuf {
	let stem: String = report_id
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || "-_.@".contains(c) { c } else { '_' })
		.collect();

	if stem.trim_matches('.').is_empty() {
		directory.join(format!("tlsrpt-{}.json.gz", process_time))
	} else {
		directory.join(format!("{}.json.gz", stem))
	}
}

/// POSTs `body` to `url`, resending the same bytes immediately after each
/// transport failure until a response arrives or `attempts` run out.
/// Budgets below one still make a single attempt.
pub fn post_with_retry<T: Transport>(transport: &T, url: &str, body: &[u8], attempts: u32) -> Result<Receipt, DeliveryError> {
	let budget = attempts.max(1);
	let mut last_error = None;

	for attempt in 1..=budget {
		debug!(url, attempt, budget, "posting report");
		match transport.post(url, TLSRPT_GZIP_CONTENT_TYPE, body) {
			Ok(status) => {
				let receipt = Receipt { status, attempts: attempt };
				if receipt.is_success() {
					info!(url, status, attempt, "report delivered");
				} else {
					warn!(url, status, attempt, "collector rejected report");
				}
				return Ok(receipt);
			},
			Err(e) => {
				warn!(url, attempt, budget, error = %e, "delivery attempt failed");
				last_error = Some(e);
			},
		}
	}

	error!(url, attempts = budget, "giving up on delivery");
	Err(DeliveryError::TransportExhausted {
		destination: url.to_string(),
		attempts: budget,
		last_error: last_error.unwrap_or_else(|| TransportError::Other("no attempt made".to_string()))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::RefCell;

	/// Fails a fixed number of times, then answers with `status`.
	struct FlakyTransport {
		failures: u32,
		status: u16,
		calls: RefCell<Vec<(String, String, Vec<u8>)>>
	}

	impl FlakyTransport {
		fn new(failures: u32, status: u16) -> Self {
			FlakyTransport {
				failures,
				status,
				calls: RefCell::new(Vec::new())
			}
		}

		fn call_count(&self) -> usize {
			self.calls.borrow().len()
		}
	}

	impl Transport for FlakyTransport {
		fn post(&self, url: &str, content_type: &str, body: &[u8]) -> Result<u16, TransportError> {
			let mut calls = self.calls.borrow_mut();
			calls.push((url.to_string(), content_type.to_string(), body.to_vec()));
			if calls.len() as u32 <= self.failures {
				Err(TransportError::Other("connection refused".to_string()))
			} else {
				Ok(self.status)
			}
		}
	}

	const URL: &str = "https://collector.example/tlsrpt";

	#[test]
	fn succeeds_on_fifth_attempt() {
		let transport = FlakyTransport::new(4, 200);
		let receipt = post_with_retry(&transport, URL, b"body", DEFAULT_ATTEMPTS).unwrap();

		assert_eq!(receipt, Receipt { status: 200, attempts: 5 });
		assert!(receipt.is_success());
		assert_eq!(transport.call_count(), 5);
	}

	#[test]
	fn exhausts_after_five_attempts() {
		let transport = FlakyTransport::new(u32::MAX, 200);
		let err = post_with_retry(&transport, URL, b"body", DEFAULT_ATTEMPTS).unwrap_err();

		assert_eq!(transport.call_count(), 5);
		match err {
			DeliveryError::TransportExhausted { destination, attempts, last_error } => {
				assert_eq!(destination, URL);
				assert_eq!(attempts, 5);
				assert_eq!(last_error.to_string(), "connection refused");
			},
			other => panic!("unexpected error {:?}", other),
		}
	}

	#[test]
	fn resends_identical_bytes_with_fixed_content_type() {
		let transport = FlakyTransport::new(2, 202);
		post_with_retry(&transport, URL, b"\x1f\x8bpayload", DEFAULT_ATTEMPTS).unwrap();

		let calls = transport.calls.borrow();
		assert_eq!(calls.len(), 3);
		for (url, content_type, body) in calls.iter() {
			assert_eq!(url, URL);
			assert_eq!(content_type, "application/tlsrpt+gzip");
			assert_eq!(body.as_slice(), b"\x1f\x8bpayload");
		}
	}

	#[test]
	fn error_status_ends_retries() {
		let transport = FlakyTransport::new(0, 500);
		let receipt = post_with_retry(&transport, URL, b"body", DEFAULT_ATTEMPTS).unwrap();

		assert_eq!(receipt, Receipt { status: 500, attempts: 1 });
		assert!(!receipt.is_success());
		assert_eq!(transport.call_count(), 1);
	}

	#[test]
	fn zero_budget_still_tries_once() {
		let transport = FlakyTransport::new(u32::MAX, 200);
		let err = post_with_retry(&transport, URL, b"body", 0).unwrap_err();

		assert_eq!(transport.call_count(), 1);
		assert!(matches!(err, DeliveryError::TransportExhausted { attempts: 1, .. }));
	}

	#[test]
	fn budgets_are_independent_between_calls() {
		let transport = FlakyTransport::new(3, 204);
		assert!(post_with_retry(&transport, URL, b"a", 2).is_err());
		let receipt = post_with_retry(&transport, URL, b"b", 2).unwrap();

		assert_eq!(receipt.attempts, 2);
		assert_eq!(transport.call_count(), 4);
	}

	#[test]
	fn file_target_writes_bytes() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("out").join("r1.json.gz");
		let payload = Payload::Bytes(vec![0x1f, 0x8b, 1, 2, 3]);

		let outcome = deliver(&payload, &Target::File(path.clone()), &FlakyTransport::new(0, 200)).unwrap();

		assert_eq!(outcome, Outcome::Written);
		assert_eq!(fs::read(&path).unwrap(), vec![0x1f, 0x8b, 1, 2, 3]);
	}

	#[test]
	fn local_targets_never_touch_transport() {
		let transport = FlakyTransport::new(0, 200);
		deliver(&Payload::Text(String::new()), &Target::Stdout, &transport).unwrap();
		assert_eq!(transport.call_count(), 0);
	}

	#[test]
	fn http_target_reports_receipt() {
		let transport = FlakyTransport::new(1, 201);
		let target = Target::Http { url: URL.to_string(), attempts: 3 };

		let outcome = deliver(&Payload::Bytes(vec![1]), &target, &transport).unwrap();
		assert_eq!(outcome, Outcome::Posted(Receipt { status: 201, attempts: 2 }));
	}

	#[test]
	fn spool_path_uses_report_id() {
		let dir = Path::new("/var/spool/tlsrpt");
		assert_eq!(
			spool_path(dir, "5065427c-23d3-47ca-b6e0-946ea0e8c4be", 1),
			dir.join("5065427c-23d3-47ca-b6e0-946ea0e8c4be.json.gz")
		);
		assert_eq!(spool_path(dir, "2024-01-01T00:00:00Z_reports@example.com", 1), dir.join("2024-01-01T00_00_00Z_reports@example.com.json.gz"));
	}

	#[test]
	fn spool_path_without_usable_id() {
		let dir = Path::new("out");
		assert_eq!(spool_path(dir, "", 1_700_000_000), dir.join("tlsrpt-1700000000.json.gz"));
		assert_eq!(spool_path(dir, "..", 7), dir.join("tlsrpt-7.json.gz"));
		assert_eq!(spool_path(dir, "../../etc/passwd", 7), dir.join(".._.._etc_passwd.json.gz"));
	}

	#[test]
	fn http_transport_reports_refused_connection() {
		let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
		let port = listener.local_addr().unwrap().port();
		drop(listener);

		let transport = HttpTransport::new(Duration::from_secs(2));
		let url = format!("http://127.0.0.1:{}/tlsrpt", port);
		assert!(matches!(
			transport.post(&url, TLSRPT_GZIP_CONTENT_TYPE, b"body"),
			Err(TransportError::Http(_))
		));
	}

	/// Answers every connection with `302 Found` pointing elsewhere and records each request line.
	fn spawn_redirecting_collector() -> (String, std::sync::mpsc::Receiver<String>) {
		use std::io::{BufRead, BufReader, Read, Write};

		let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
		let url = format!("http://{}/v1/tlsrpt", listener.local_addr().unwrap());
		let (tx, rx) = std::sync::mpsc::channel();

		std::thread::spawn(move || {
			for stream in listener.incoming() {
				let mut stream = match stream {
					Ok(stream) => stream,
					Err(_) => return,
				};
				let mut reader = BufReader::new(stream.try_clone().unwrap());

				let mut request_line = String::new();
				reader.read_line(&mut request_line).unwrap();
				let mut content_length = 0;
				loop {
					let mut line = String::new();
					reader.read_line(&mut line).unwrap();
					if line == "\r\n" || line.is_empty() {
						break;
					}
					if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
						content_length = value.trim().parse().unwrap();
					}
				}
				let mut body = vec![0; content_length];
				reader.read_exact(&mut body).unwrap();

				let _ = tx.send(request_line.trim_end().to_string());
				let _ = write!(
					stream,
					"HTTP/1.1 302 Found\r\nLocation: /elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
				);
			}
		});

		(url, rx)
	}

	#[test]
	fn http_transport_reports_redirect_as_outcome() {
		let (url, requests) = spawn_redirecting_collector();
		let transport = HttpTransport::new(Duration::from_secs(5));

		let receipt = post_with_retry(&transport, &url, b"\x1f\x8bPAYLOAD", DEFAULT_ATTEMPTS).unwrap();

		assert_eq!(receipt, Receipt { status: 302, attempts: 1 });
		assert!(!receipt.is_success());
		assert_eq!(requests.recv_timeout(Duration::from_secs(5)).unwrap(), "POST /v1/tlsrpt HTTP/1.1");
		assert!(requests.recv_timeout(Duration::from_millis(200)).is_err());
	}
}
