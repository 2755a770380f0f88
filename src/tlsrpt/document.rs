use serde::Serialize;

use super::types::{FailureDetail, PolicyEntry, Report};

/// The RFC 8460 JSON shape of a [`Report`], stamped with the time it was generated.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportDocument<'a> {
	pub process_time: u64,
	pub organization_name: &'a str,
	pub date_range: DateRange<'a>,
	pub contact_info: &'a str,
	pub report_id: &'a str,
	pub policies: Vec<PolicySet<'a>>
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DateRange<'a> {
	pub start_datetime: &'a str,
	pub end_datetime: &'a str
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicySet<'a> {
	pub policy: Policy<'a>,
	pub summary: Summary,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failure_details: Option<Vec<FailureDetails<'a>>>
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Policy<'a> {
	pub policy_type: &'a str,
	pub policy_string: &'a [String],
	pub policy_domain: &'a str,
	pub mx_host: &'a str
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Summary {
	pub total_successful_session_count: u64,
	pub total_failure_session_count: u64
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailureDetails<'a> {
	pub result_type: &'a str,
	pub sending_mta_ip: &'a str,
	pub receiving_mx_hostname: &'a str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub receiving_mx_helo: Option<&'a str>,
	pub receiving_ip: &'a str,
	pub failed_session_count: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub additional_information: Option<&'a str>,
	pub failure_error_code: &'a str
}

impl<'a> ReportDocument<'a> {
	pub fn new(report: &'a Report, process_time: u64) -> Self {
		ReportDocument {
			process_time,
			organization_name: &report.organization_name,
			date_range: DateRange {
				start_datetime: &report.start_date_time,
				end_datetime: &report.end_date_time
			},
			contact_info: &report.contact_info,
			report_id: &report.report_id,
			policies: report.policies.iter().map(PolicySet::from).collect()
		}
	}
}

impl<'a> From<&'a PolicyEntry> for PolicySet<'a> {
	fn from(entry: &'a PolicyEntry) -> Self {
		let failure_details = if entry.has_failure_details || !entry.failure_details.is_empty() {
			Some(entry.failure_details.iter().map(FailureDetails::from).collect())
		} else {
			None
		};

		PolicySet {
			policy: Policy {
				policy_type: &entry.policy_type,
				policy_string: &entry.policy_string,
				policy_domain: &entry.policy_domain,
				mx_host: &entry.policy_mx_host
			},
			summary: Summary {
				total_successful_session_count: entry.success_count,
				total_failure_session_count: entry.failure_count
			},
			failure_details
		}
	}
}

impl<'a> From<&'a FailureDetail> for FailureDetails<'a> {
	fn from(detail: &'a FailureDetail) -> Self {
		FailureDetails {
			result_type: &detail.result_type,
			sending_mta_ip: &detail.sending_ip,
			receiving_mx_hostname: &detail.receiving_mx_hostname,
			receiving_mx_helo: detail.receiving_mx_helo.as_deref(),
			receiving_ip: &detail.receiving_ip,
			failed_session_count: detail.failed_session_count,
			additional_information: detail.additional_info.as_deref(),
			failure_error_code: &detail.failure_error_code
		}
	}
}
