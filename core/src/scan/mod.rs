pub mod parser;
pub mod record;

pub use parser::{parse_scan_file, parse_scan_reader, parse_scan_str};
pub use record::{MetaValue, ScanBlock, ScanRecord, ScanType};
