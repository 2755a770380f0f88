/// A normalized TLS report. Built once per input document and never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
	pub organization_name: String,
	pub start_date_time: String,
	pub end_date_time: String,
	pub contact_info: String,
	pub report_id: String,
	pub policies: Vec<PolicyEntry>
}

/// One policy evaluated by the reporting organization, with its session totals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyEntry {
	pub policy_type: String,
	pub policy_string: Vec<String>,
	pub policy_domain: String,
	pub policy_mx_host: String,
	pub success_count: u64,
	pub failure_count: u64,

	/// Whether the source document carried a `failure-details` array at all, even an empty one.
	pub has_failure_details: bool,
	pub failure_details: Vec<FailureDetail>
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureDetail {
	pub result_type: String,
	pub sending_ip: String,
	pub receiving_mx_hostname: String,
	pub receiving_mx_helo: Option<String>,
	pub receiving_ip: String,
	pub failed_session_count: u64,
	pub additional_info: Option<String>,
	pub failure_error_code: String
}

impl Report {
	/// Walks every output record in order: one per failure detail, or a single
	/// detail-less record for a policy that has none.
	pub fn records(&self) -> impl Iterator<Item = (&PolicyEntry, Option<&FailureDetail>)> + '_ {
		self.policies.iter().flat_map(|policy| {
			let details: Vec<Option<&FailureDetail>> = if policy.failure_details.is_empty() {
				vec![None]
			} else {
				policy.failure_details.iter().map(Some).collect()
			};
			details.into_iter().map(move |detail| (policy, detail))
		})
	}
}
