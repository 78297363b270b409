use crate::eye::{EyeAssessment, EyeEvaluator};
use crate::prelude::{EyeThresholds, ScanResult};
use crate::scan::parse_scan_file;
use std::path::Path;

/// Turns a finished sweep file into an assessment.
pub trait ScanScorer {
    fn score(&mut self, file: &Path) -> ScanResult<EyeAssessment>;
}

/// Parses the file from disk and runs the eye evaluator on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileScorer {
    evaluator: EyeEvaluator,
}

impl FileScorer {
    pub fn new(thresholds: EyeThresholds) -> Self {
        Self {
            evaluator: EyeEvaluator::new(thresholds),
        }
    }
}

impl ScanScorer for FileScorer {
    fn score(&mut self, file: &Path) -> ScanResult<EyeAssessment> {
        let record = parse_scan_file(file)?;
        self.evaluator.evaluate(&record)
    }
}
