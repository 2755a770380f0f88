pub mod document;
pub mod encode;
pub mod parse;
pub mod types;

pub use encode::{OutputStyle, Payload, TLSRPT_GZIP_CONTENT_TYPE};
pub use parse::parse_report;
pub use types::{FailureDetail, PolicyEntry, Report};
