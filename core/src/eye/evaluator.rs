use crate::math::stats::StatsHelper;
use crate::prelude::{EyeThresholds, ScanResult};
use crate::scan::record::{ScanBlock, ScanRecord, HORIZONTAL_INCREMENT, OPEN_AREA};
use log::{debug, info, warn};
use serde::Serialize;

/// Outcome of the structural eye test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Validity {
    /// Every edge sample shows at least the minimum error rate.
    Valid { edge_minimum: f64 },
    /// Some edge sample is cleaner than an eye allows.
    ClosedEdges { edge_minimum: f64 },
    /// Too few columns lie beyond the edge offset to judge the scan.
    InsufficientEdgeSamples { found: usize },
    /// The scan block has no rows.
    EmptyScan,
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid { .. })
    }
}

/// Where the reported open area came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AreaSource {
    /// The console's own `Open Area` field.
    Reported,
    /// Mean center error rate scaled by the horizontal increment.
    CenterEstimate,
    /// Too few center columns for the estimate; scored as zero.
    InsufficientCenterSamples { found: usize },
    /// The scan failed the eye test; scored as zero.
    InvalidEye,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EyeAssessment {
    pub validity: Validity,
    pub source: AreaSource,
    pub open_area: f64,
}

impl EyeAssessment {
    fn zero(validity: Validity, source: AreaSource) -> Self {
        Self {
            validity,
            source,
            open_area: 0.0,
        }
    }
}

/// Scores parsed scans. Holds only thresholds, so one evaluator can be
/// shared freely between sweeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct EyeEvaluator {
    thresholds: EyeThresholds,
}

impl EyeEvaluator {
    pub fn new(thresholds: EyeThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &EyeThresholds {
        &self.thresholds
    }

    /// A real eye must show bit errors when sampled far from center; a clean
    /// edge means the sweep never captured the eye boundary.
    pub fn test_eye(&self, scan: &ScanBlock) -> Validity {
        let values = scan.values();
        if values.nrows() == 0 {
            warn!("Scan has no rows");
            return Validity::EmptyScan;
        }

        let edge = column_indexes(scan.x_axis(), |x| x.abs() > self.thresholds.edge_offset);
        if edge.len() < self.thresholds.min_region_samples {
            warn!("Too few edge indexes ({})", edge.len());
            return Validity::InsufficientEdgeSamples { found: edge.len() };
        }

        let edge_minimum = StatsHelper::min(
            edge.iter()
                .flat_map(|&col| values.column(col).to_vec()),
        )
        .unwrap_or(f64::NAN);

        let limit = self.thresholds.min_edge_error_rate;
        if edge_minimum >= limit {
            debug!(
                "globalMinimum ({}) is not less than limit ({}) -> valid eye",
                edge_minimum, limit
            );
            Validity::Valid { edge_minimum }
        } else {
            info!(
                "globalMinimum ({}) is less than limit ({}) -> NOT a valid eye",
                edge_minimum, limit
            );
            Validity::ClosedEdges { edge_minimum }
        }
    }

    /// Average center error rate scaled by `horizontal_increment`. Gives a
    /// nonzero figure when the console's strict open area collapses to zero.
    pub fn center_estimate(&self, scan: &ScanBlock, horizontal_increment: f64) -> (AreaSource, f64) {
        let center = column_indexes(scan.x_axis(), |x| x.abs() < self.thresholds.center_offset);
        if center.len() < self.thresholds.min_region_samples {
            warn!("Too few center indexes ({})", center.len());
            return (AreaSource::InsufficientCenterSamples { found: center.len() }, 0.0);
        }

        let row_means = scan
            .values()
            .rows()
            .into_iter()
            .filter_map(|row| StatsHelper::mean(center.iter().map(|&col| row[col])))
            .collect::<Vec<_>>();

        match StatsHelper::mean(row_means) {
            Some(average) => (AreaSource::CenterEstimate, average * horizontal_increment),
            None => (AreaSource::InsufficientCenterSamples { found: center.len() }, 0.0),
        }
    }

    /// Validity plus open area. Errors only when the record lacks the scan
    /// block or a metadata field the score depends on.
    pub fn evaluate(&self, record: &ScanRecord) -> ScanResult<EyeAssessment> {
        let scan = record.require_scan()?;
        let validity = self.test_eye(scan);
        if !validity.is_valid() {
            return Ok(EyeAssessment::zero(validity, AreaSource::InvalidEye));
        }

        let reported = record.number(OPEN_AREA)?;
        if reported >= 1.0 {
            return Ok(EyeAssessment {
                validity,
                source: AreaSource::Reported,
                open_area: reported,
            });
        }

        let increment = record.number(HORIZONTAL_INCREMENT)?;
        let (source, open_area) = self.center_estimate(scan, increment);
        debug!(
            "reported open area {} below 1.0, estimate {} ({:?})",
            reported, open_area, source
        );
        Ok(EyeAssessment {
            validity,
            source,
            open_area,
        })
    }

    /// Open area only, the value the optimizer compares.
    pub fn open_area(&self, record: &ScanRecord) -> ScanResult<f64> {
        self.evaluate(record).map(|assessment| assessment.open_area)
    }
}

fn column_indexes<F: Fn(f64) -> bool>(axis: &[f64], keep: F) -> Vec<usize> {
    axis.iter()
        .enumerate()
        .filter(|&(_, &x)| keep(x))
        .map(|(index, _)| index)
        .collect()
}
