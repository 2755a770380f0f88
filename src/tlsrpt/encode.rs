use std::fmt;
use std::io::prelude::*;
use std::str::FromStr;

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use super::document::ReportDocument;
use super::types::{FailureDetail, PolicyEntry, Report};
use crate::error::EncodeError;

/// Content type for compressed reports, as registered by RFC 8460.
pub const TLSRPT_GZIP_CONTENT_TYPE: &str = "application/tlsrpt+gzip";

const CSV_SEPARATOR: &str = "|";

/// The output styles a report can be rendered in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStyle {
	Kv,
	Csv,
	GzipJson
}

/// An encoded report, ready for a sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
	Text(String),
	Bytes(Vec<u8>)
}

pub trait Encoder {
	fn encode(&self, report: &Report, process_time: u64) -> Result<Payload, EncodeError>;
}

/// Space-separated `key="value"` lines.
pub struct KeyValueEncoder;

/// `|`-separated lines with selective double-quoting.
pub struct DelimitedTextEncoder;

/// Gzipped RFC 8460 JSON.
pub struct CompressedEncoder;

impl OutputStyle {
	pub fn encoder(self) -> &'static dyn Encoder {
		match self {
			OutputStyle::Kv => &KeyValueEncoder,
			OutputStyle::Csv => &DelimitedTextEncoder,
			OutputStyle::GzipJson => &CompressedEncoder,
		}
	}

	pub fn encode(self, report: &Report, process_time: u64) -> Result<Payload, EncodeError> {
		let payload = self.encoder().encode(report, process_time)?;
		debug!(style = %self, bytes = payload.as_bytes().len(), "encoded report");
		Ok(payload)
	}
}

impl FromStr for OutputStyle {
	type Err = EncodeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"kv" => Ok(OutputStyle::Kv),
			"csv" => Ok(OutputStyle::Csv),
			"gzip-json" => Ok(OutputStyle::GzipJson),
			other => Err(EncodeError::UnknownStyle(other.to_string())),
		}
	}
}

impl fmt::Display for OutputStyle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			OutputStyle::Kv => "kv",
			OutputStyle::Csv => "csv",
			OutputStyle::GzipJson => "gzip-json",
		})
	}
}

impl Payload {
	pub fn as_bytes(&self) -> &[u8] {
		match self {
			Payload::Text(text) => text.as_bytes(),
			Payload::Bytes(bytes) => bytes,
		}
	}
}

impl Encoder for KeyValueEncoder {
	fn encode(&self, report: &Report, process_time: u64) -> Result<Payload, EncodeError> {
		let mut out = String::new();
		for (policy, detail) in report.records() {
			out += &kv_record(report, policy, detail, process_time);
			out.push('\n');
		}
		Ok(Payload::Text(out))
	}
}

fn kv_record(report: &Report, policy: &PolicyEntry, detail: Option<&FailureDetail>, process_time: u64) -> String {
	let mut pairs: Vec<(&str, String)> = vec![
		("process-time", process_time.to_string()),
		("report-id", report.report_id.clone()),
		("organization-name", report.organization_name.clone()),
		("start-date-time", report.start_date_time.clone()),
		("end-date-time", report.end_date_time.clone()),
		("contact-info", report.contact_info.clone()),
		("policy-type", policy.policy_type.clone()),
		("policy-string", policy.policy_string.join(",")),
		("policy-domain", policy.policy_domain.clone()),
		("policy-mx-host", policy.policy_mx_host.clone()),
		("policy-success-count", policy.success_count.to_string()),
		("policy-failure-count", policy.failure_count.to_string()),
	];

	if let Some(detail) = detail {
		pairs.push(("result-type", detail.result_type.clone()));
		pairs.push(("sending-ip", detail.sending_ip.clone()));
		pairs.push(("receiving-mx-hostname", detail.receiving_mx_hostname.clone()));
		if let Some(helo) = &detail.receiving_mx_helo {
			pairs.push(("receiving-mx-helo", helo.clone()));
		}
		pairs.push(("receiving-ip", detail.receiving_ip.clone()));
		pairs.push(("failed-count", detail.failed_session_count.to_string()));
		if let Some(info) = &detail.additional_info {
			pairs.push(("additional-info", info.clone()));
		}
		pairs.push(("failure-error-code", detail.failure_error_code.clone()));
	}

	pairs
		.iter()
		.map(|(key, value)| format!("{}=\"{}\"", key, value))
		.collect::<Vec<_>>()
		.join(" ")
}

impl Encoder for DelimitedTextEncoder {
	fn encode(&self, report: &Report, process_time: u64) -> Result<Payload, EncodeError> {
		let mut out = String::new();
		for (policy, detail) in report.records() {
			out += &csv_record(report, policy, detail, process_time);
			out.push('\n');
		}
		Ok(Payload::Text(out))
	}
}

fn quoted(value: &str) -> String {
	format!("\"{}\"", value)
}

fn csv_record(report: &Report, policy: &PolicyEntry, detail: Option<&FailureDetail>, process_time: u64) -> String {
	let mut fields = vec![
		process_time.to_string(),
		report.report_id.clone(),
		quoted(&report.organization_name),
		report.start_date_time.clone(),
		report.end_date_time.clone(),
		report.contact_info.clone(),
		policy.policy_type.clone(),
		quoted(&policy.policy_string.join(",")),
		policy.policy_domain.clone(),
		quoted(&policy.policy_mx_host),
		policy.success_count.to_string(),
		policy.failure_count.to_string(),
	];

	if let Some(detail) = detail {
		fields.push(detail.result_type.clone());
		fields.push(detail.sending_ip.clone());
		fields.push(detail.receiving_mx_hostname.clone());
		// absent optionals drop their slot entirely; downstream parsers rely on the varying width
		if let Some(helo) = &detail.receiving_mx_helo {
			fields.push(helo.clone());
		}
		fields.push(detail.receiving_ip.clone());
		fields.push(detail.failed_session_count.to_string());
		if let Some(info) = &detail.additional_info {
			fields.push(quoted(info));
		}
		fields.push(detail.failure_error_code.clone());
	}

	fields.join(CSV_SEPARATOR)
}

impl Encoder for CompressedEncoder {
	fn encode(&self, report: &Report, process_time: u64) -> Result<Payload, EncodeError> {
		let json = serde_json::to_vec(&ReportDocument::new(report, process_time))?;

		let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(&json)?;
		Ok(Payload::Bytes(encoder.finish()?))
	}
}
