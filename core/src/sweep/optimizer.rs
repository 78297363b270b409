use crate::channel::{CommandChannel, Transceiver};
use crate::prelude::{ParameterSpace, SweepConfig, SweepError, SweepResult};
use crate::sweep::cancel::CancelToken;
use crate::sweep::scorer::ScanScorer;
use crate::sweep::session::{CandidateScore, ParameterOutcome, SweepReport, SweepSession};
use crate::telemetry::MetricsRecorder;
use log::{error, info, warn};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Scan file for one candidate: `{iteration}{name}{value}` with every
/// non-word character replaced by `_`.
pub fn scan_file_name(iteration: usize, name: &str, value: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let non_word = NON_WORD.get_or_init(|| Regex::new(r"\W").expect("valid pattern"));
    let stem = format!("{}{}{}", iteration, name, value);
    format!("{}.csv", non_word.replace_all(&stem, "_"))
}

pub fn scan_file_path(dir: &Path, iteration: usize, name: &str, value: &str) -> PathBuf {
    dir.join(scan_file_name(iteration, name, value))
}

/// Greedy per-parameter sweep: each parameter is tuned on its own, in list
/// order, with the parameters before it already fixed at their best value.
pub struct SweepOptimizer<S> {
    config: SweepConfig,
    scorer: S,
    cancel: CancelToken,
    metrics: MetricsRecorder,
}

impl<S: ScanScorer> SweepOptimizer<S> {
    pub fn new(config: SweepConfig, scorer: S) -> Self {
        Self {
            config,
            scorer,
            cancel: CancelToken::new(),
            metrics: MetricsRecorder::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Runs every pass over every parameter. Channel faults and scan
    /// trigger failures abort the run; unscorable scans count as zero.
    pub fn run<T: CommandChannel, R: CommandChannel>(
        &mut self,
        tx: &mut Transceiver<T>,
        rx: &mut Transceiver<R>,
    ) -> SweepResult<SweepReport> {
        fs::create_dir_all(&self.config.scan.results_dir)?;

        let mut session = SweepSession::new(self.config.parameters.clone());
        for iteration in 0..self.config.iterations {
            for (index, space) in self.config.parameters.clone().iter().enumerate() {
                let outcome = self.sweep_parameter(iteration, space, tx, rx)?;
                session.record(index, outcome);
            }
        }
        Ok(session.into_report())
    }

    pub fn sweep_parameter<T: CommandChannel, R: CommandChannel>(
        &mut self,
        iteration: usize,
        space: &ParameterSpace,
        tx: &mut Transceiver<T>,
        rx: &mut Transceiver<R>,
    ) -> SweepResult<ParameterOutcome> {
        let name = space.name.as_str();
        let initial = tx.get_parameter(name)?;
        let mut best = initial.clone();
        let mut best_score = 0.0;
        let mut trace = Vec::with_capacity(space.values.len());

        for value in &space.values {
            self.cancel.check()?;
            let candidate = self.evaluate_candidate(iteration, name, value, tx, rx)?;
            if candidate.score > best_score {
                best_score = candidate.score;
                best = value.clone();
            }
            trace.push(candidate);
        }

        info!("{} -> best {} (score {})", name, best, best_score);
        tx.set_parameter(name, &best)?;
        tx.commit()?;

        Ok(ParameterOutcome {
            iteration,
            name: name.to_string(),
            initial,
            best,
            best_score,
            trace,
        })
    }

    fn evaluate_candidate<T: CommandChannel, R: CommandChannel>(
        &mut self,
        iteration: usize,
        name: &str,
        value: &str,
        tx: &mut Transceiver<T>,
        rx: &mut Transceiver<R>,
    ) -> SweepResult<CandidateScore> {
        info!("Create scan ({} {})", name, value);
        tx.set_parameter(name, value)?;
        tx.commit()?;

        // The console drops the `{}` braces on readback.
        let readback = tx.get_parameter(name)?;
        let readback_mismatch = if value.contains(readback.as_str()) {
            None
        } else {
            warn!("Cannot set value: read back {} after setting {}", readback, value);
            self.metrics.record_mismatch();
            Some(readback)
        };

        if self.config.reset_rx_before_scan {
            rx.reset_gt()?;
        }

        let file = scan_file_path(&self.config.scan.results_dir, iteration, name, value);
        rx.run_scan(&file, &self.config.scan)
            .map_err(|source| SweepError::ScanTrigger {
                file: file.display().to_string(),
                source,
            })?;

        self.metrics.record_evaluated();
        let (score, assessment, failure) = match self.scorer.score(&file) {
            Ok(assessment) => (assessment.open_area, Some(assessment), None),
            Err(err) => {
                error!("open area unavailable after reading {}: {}", file.display(), err);
                self.metrics.record_degraded();
                (0.0, None, Some(err.to_string()))
            }
        };
        info!("OpenArea: {}  (parameters: {} = {})", score, name, value);

        Ok(CandidateScore {
            value: value.to_string(),
            file,
            score,
            readback_mismatch,
            assessment,
            error: failure,
        })
    }
}
