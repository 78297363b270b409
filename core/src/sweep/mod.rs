pub mod cancel;
pub mod optimizer;
pub mod scorer;
pub mod session;

pub use cancel::CancelToken;
pub use optimizer::{scan_file_name, scan_file_path, SweepOptimizer};
pub use scorer::{FileScorer, ScanScorer};
pub use session::{CandidateScore, ChosenValue, ParameterOutcome, SweepReport, SweepSession};
