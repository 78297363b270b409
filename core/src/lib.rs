//! Eye-scan evaluation and transmitter equalization sweeps for serial links.
//!
//! Sweep result files exported by the hardware console are parsed into
//! [`scan::ScanRecord`]s, judged by [`eye::EyeEvaluator`] and compared by
//! [`sweep::SweepOptimizer`], which drives both ends of the link through
//! [`channel::CommandChannel`] sessions.

pub mod channel;
pub mod eye;
pub mod math;
pub mod prelude;
pub mod scan;
pub mod sweep;
pub mod telemetry;

pub use channel::{CommandChannel, Side, Transceiver};
pub use eye::{EyeAssessment, EyeEvaluator};
pub use scan::{parse_scan_file, parse_scan_str, ScanRecord};
pub use sweep::{FileScorer, SweepOptimizer, SweepReport};
