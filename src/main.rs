use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use tracing::{error, info, warn};

use tlsrpt_processor::config::{self, Config};
use tlsrpt_processor::delivery::{self, HttpTransport, Outcome, Target};
use tlsrpt_processor::error::DeliveryError;
use tlsrpt_processor::input;
use tlsrpt_processor::tlsrpt::{self, OutputStyle};

const EXIT_INPUT: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_UNDELIVERED: u8 = 3;
const EXIT_REJECTED: u8 = 4;

/// Process a TLSRPT JSON report and output it as key/value text, delimited text or gzipped JSON
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
	/// Input file (plain or gzipped JSON)
	#[arg(short, long, value_name = "FILE")]
	input: PathBuf,

	/// Output style (values: kv, csv, gzip-json)
	#[arg(short, long, value_name = "STYLE")]
	output_style: Option<String>,

	/// POST the report to the destination instead of writing it locally (implies gzip-json)
	#[arg(short, long)]
	deliver: bool,

	/// Collector URL for delivery
	#[arg(short = 'u', long, value_name = "URL")]
	destination: Option<String>,

	/// Total delivery attempts before giving up
	#[arg(long, value_name = "N")]
	attempts: Option<u32>,

	/// Per-attempt HTTP timeout in seconds
	#[arg(long, value_name = "SECS")]
	timeout: Option<u64>,

	/// Directory for gzip-json output files
	#[arg(long, value_name = "DIR")]
	output_dir: Option<PathBuf>,

	/// Configuration file; created with defaults if missing
	#[arg(short, long, value_name = "FILE")]
	config: Option<PathBuf>,

	/// Increase log verbosity (-v, -vv, -vvv)
	#[arg(short, long, action = clap::ArgAction::Count)]
	verbose: u8,

	/// Disable logging
	#[arg(short, long)]
	quiet: bool
}

fn main() -> ExitCode {
	let cli = Cli::parse();
	setup_logging(cli.verbose, cli.quiet);

	/*
	 * config parsing
	 */
	let config_text = match &cli.config {
		Some(path) => match config::read_or_create(path) {
			Ok(text) => Some(text),
			Err(e) => return fail(EXIT_CONFIG, format!("Could not read config file: {}", e)),
		},
		None => None,
	};
	let config = match config_text.as_deref().map(Config::from_toml) {
		Some(Ok(config)) => config,
		Some(Err(e)) => return fail(EXIT_CONFIG, format!("Invalid config file: {}", e)),
		None => config::DEFAULT,
	};

	let deliver = cli.deliver || config.delivery.enabled;
	let destination = cli.destination.as_deref().unwrap_or(config.delivery.destination);
	if deliver {
		if let Err(e) = config.delivery.check(destination) {
			return fail(EXIT_CONFIG, format!("Cannot deliver: {} (see --destination)", e));
		}
	}

	let mut style = match cli.output_style.as_deref().unwrap_or(config.output.style).parse::<OutputStyle>() {
		Ok(style) => style,
		Err(e) => return fail(EXIT_INPUT, e.to_string()),
	};
	if deliver && style != OutputStyle::GzipJson {
		info!(requested = %style, "delivery enabled, switching output style to gzip-json");
		style = OutputStyle::GzipJson;
	}

	/*
	 * report parsing
	 */
	let text = match input::read_report_file(&cli.input) {
		Ok(text) => text,
		Err(e) => return fail(EXIT_INPUT, format!("Could not read input file: {}", e)),
	};
	let report = match tlsrpt::parse_report(&text) {
		Ok(report) => report,
		Err(e) => return fail(EXIT_INPUT, format!("Invalid report: {}", e)),
	};

	let process_time = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0);
	let payload = match style.encode(&report, process_time) {
		Ok(payload) => payload,
		Err(e) => return fail(EXIT_INPUT, e.to_string()),
	};

	/*
	 * output
	 */
	let output_dir = cli.output_dir.clone().unwrap_or_else(|| PathBuf::from(config.output.directory));
	let target = if deliver {
		Target::Http {
			url: destination.to_string(),
			attempts: cli.attempts.unwrap_or(config.delivery.attempts)
		}
	} else if style == OutputStyle::GzipJson {
		Target::File(delivery::spool_path(&output_dir, &report.report_id, process_time))
	} else {
		Target::Stdout
	};

	let transport = HttpTransport::new(Duration::from_secs(cli.timeout.unwrap_or(config.delivery.timeout_secs)));
	match delivery::deliver(&payload, &target, &transport) {
		Ok(Outcome::Written) => ExitCode::SUCCESS,
		Ok(Outcome::Posted(receipt)) if receipt.is_success() => {
			println!("Delivered report {} ({})", report.report_id, receipt.status);
			ExitCode::SUCCESS
		},
		Ok(Outcome::Posted(receipt)) => fail(
			EXIT_REJECTED,
			format!("Collector answered {} for report {}", receipt.status, report.report_id)
		),
		Err(e @ DeliveryError::TransportExhausted { .. }) => {
			if config.delivery.spool_on_failure {
				spool(&payload, &output_dir, &report.report_id, process_time);
			}
			fail(EXIT_UNDELIVERED, e.to_string())
		},
		Err(e) => fail(EXIT_INPUT, e.to_string()),
	}
}

fn spool(payload: &tlsrpt::Payload, output_dir: &Path, report_id: &str, process_time: u64) {
	let path = delivery::spool_path(output_dir, report_id, process_time);
	match delivery::write_file(payload, &path) {
		Ok(()) => warn!(path = %path.display(), "kept undelivered report on disk"),
		Err(e) => error!(path = %path.display(), error = %e, "could not keep undelivered report"),
	}
}

fn fail(code: u8, message: String) -> ExitCode {
	eprintln!("ERROR: {}", message);
	ExitCode::from(code)
}

fn setup_logging(verbose: u8, quiet: bool) {
	if quiet {
		return;
	}

	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| {
			match verbose {
				0 => tracing_subscriber::EnvFilter::new("warn"),
				1 => tracing_subscriber::EnvFilter::new("info"),
				2 => tracing_subscriber::EnvFilter::new("debug"),
				_ => tracing_subscriber::EnvFilter::new("trace"),
			}
		});

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_writer(std::io::stderr)
		.init();
}
