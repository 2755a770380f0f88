use serde_json::Value;
use tracing::{debug, warn};

use super::types::{FailureDetail, PolicyEntry, Report};
use crate::error::ParseError;

/// Parses the JSON text of a TLS report into a [`Report`].
///
/// Only an unparseable document or one without a `policies` array is rejected.
/// Every other missing or mistyped field falls back to its default.
pub fn parse_report(text: &str) -> Result<Report, ParseError> {
	let document: Value = serde_json::from_str(text)
		.map_err(|e| ParseError::Malformed(format!("invalid JSON: {}", e)))?;
	parse_document(&document)
}

/// Builds a [`Report`] from an already-decoded JSON document.
pub fn parse_document(document: &Value) -> Result<Report, ParseError> {
	if !document.is_object() {
		return Err(ParseError::Malformed("top level is not a JSON object".to_string()));
	}

	let policies = match document.get("policies") {
		Some(Value::Array(policies)) => policies,
		Some(_) => return Err(ParseError::Malformed("'policies' is not an array".to_string())),
		None => return Err(ParseError::Malformed("missing 'policies' array".to_string())),
	};

	let fields = Fields(document);
	let report = Report {
		organization_name: fields.text(&["organization-name"]),
		start_date_time: fields.text(&["date-range", "start-datetime"]),
		end_date_time: fields.text(&["date-range", "end-datetime"]),
		contact_info: fields.text(&["contact-info"]),
		report_id: fields.text(&["report-id"]),
		policies: policies.iter().map(parse_policy).collect()
	};

	debug!(
		report_id = %report.report_id,
		policies = report.policies.len(),
		"parsed report"
	);

	Ok(report)
}

fn parse_policy(policy_set: &Value) -> PolicyEntry {
	let fields = Fields(policy_set);

	let (has_failure_details, failure_details) = match policy_set.get("failure-details") {
		Some(Value::Array(details)) => (true, details.iter().map(parse_failure_detail).collect()),
		_ => (false, Vec::new()),
	};

	PolicyEntry {
		policy_type: fields.text(&["policy", "policy-type"]),
		policy_string: fields.text_list(&["policy", "policy-string"]),
		policy_domain: fields.text(&["policy", "policy-domain"]),
		policy_mx_host: fields.text_list(&["policy", "mx-host"]).join(","),
		success_count: fields.count(&["summary", "total-successful-session-count"]),
		failure_count: fields.count(&["summary", "total-failure-session-count"]),
		has_failure_details,
		failure_details
	}
}

fn parse_failure_detail(detail: &Value) -> FailureDetail {
	let fields = Fields(detail);

	FailureDetail {
		result_type: fields.text(&["result-type"]),
		sending_ip: fields.text(&["sending-mta-ip"]),
		receiving_mx_hostname: fields.text(&["receiving-mx-hostname"]),
		receiving_mx_helo: fields.optional_text(&["receiving-mx-helo"]),
		receiving_ip: fields.text(&["receiving-ip"]),
		failed_session_count: fields.count(&["failed-session-count"]),
		additional_info: fields.optional_text(&["additional-information"]),
		failure_error_code: fields.text(&["failure-error-code"])
	}
}

/// Defaulting accessors over one node of a JSON document.
///
/// Paths are followed through nested objects; any missing step, `null`, or
/// value of an unusable type counts as absent.
struct Fields<'a>(&'a Value);

impl<'a> Fields<'a> {
	fn lookup(&self, path: &[&str]) -> Option<&'a Value> {
		let mut current = self.0;
		for key in path {
			current = current.get(*key)?;
		}

		match current {
			Value::Null => None,
			value => Some(value),
		}
	}

	/// The field as text, or `None` when absent. Numbers and booleans are kept as their JSON text.
	fn optional_text(&self, path: &[&str]) -> Option<String> {
		scalar_text(self.lookup(path)?)
	}

	fn text(&self, path: &[&str]) -> String {
		self.optional_text(path).unwrap_or_default()
	}

	fn count(&self, path: &[&str]) -> u64 {
		match self.lookup(path) {
			Some(Value::Number(n)) => match n.as_u64() {
				Some(count) => count,
				None => match n.as_f64() {
					// integral floats such as 10.0 or 1e2 are still counts
					Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => f as u64,
					_ => {
						warn!(field = %path.join("."), value = %n, "count is not a non-negative integer, using 0");
						0
					},
				},
			},
			Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
			_ => 0,
		}
	}

	/// A field that may hold either a single string or an array of them.
	fn text_list(&self, path: &[&str]) -> Vec<String> {
		match self.lookup(path) {
			Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
			Some(value) => scalar_text(value).into_iter().collect(),
			None => Vec::new(),
		}
	}
}

fn scalar_text(value: &Value) -> Option<String> {
	match value {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		Value::Bool(b) => Some(b.to_string()),
		_ => None,
	}
}
