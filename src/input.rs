use flate2::read::GzDecoder;
use simple_error::bail;
use std::boxed::Box;
use std::error::Error;
use std::io::{prelude::*, Cursor};
use std::path::Path;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFileType {
	Json,
	Gzip
}

/// Sniffs the leading bytes of a report file to tell gzip apart from plain JSON.
pub fn detect_report_type(data: &[u8]) -> ReportFileType {
	if data.starts_with(&GZIP_MAGIC) {
		ReportFileType::Gzip
	} else {
		ReportFileType::Json
	}
}

/// Given the raw data in bytes, decompresses the report if needed into a String containing JSON.
pub fn read_report(data: Vec<u8>) -> Result<String, Box<dyn Error>> {
	match detect_report_type(&data) {
		ReportFileType::Gzip => {
			let mut d = GzDecoder::new(Cursor::new(data));
			let mut result = String::new();
			d.read_to_string(&mut result)?;
			Ok(result)
		},
		ReportFileType::Json => {
			match String::from_utf8(data) {
				Ok(text) => Ok(text),
				Err(_) => {
					bail!("report is neither gzip nor UTF-8 text");
				}
			}
		}
	}
}

/// Reads a report file from disk. The whole file is loaded before parsing.
pub fn read_report_file(path: &Path) -> Result<String, Box<dyn Error>> {
	if !path.is_file() {
		bail!("input file {} does not exist or is not a regular file", path.display());
	}

	let data = std::fs::read(path)?;
	tracing::debug!(path = %path.display(), bytes = data.len(), "read input file");
	read_report(data)
}
