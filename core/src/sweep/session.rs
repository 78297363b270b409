use crate::eye::EyeAssessment;
use crate::prelude::ParameterSpace;
use serde::Serialize;
use std::path::PathBuf;

/// Result of one candidate value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub value: String,
    pub file: PathBuf,
    pub score: f64,
    /// What the console reported after commit, when it disagreed with `value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readback_mismatch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<EyeAssessment>,
    /// Why the scan could not be scored; the candidate counts as zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One parameter sweep within one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterOutcome {
    pub iteration: usize,
    pub name: String,
    pub initial: String,
    pub best: String,
    pub best_score: f64,
    pub trace: Vec<CandidateScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChosenValue {
    pub name: String,
    pub value: String,
    pub score: f64,
}

/// Final values per parameter plus the full score history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub chosen: Vec<ChosenValue>,
    pub history: Vec<ParameterOutcome>,
}

impl SweepReport {
    pub fn chosen_value(&self, name: &str) -> Option<&str> {
        self.chosen
            .iter()
            .find(|chosen| chosen.name == name)
            .map(|chosen| chosen.value.as_str())
    }
}

/// Optimizer state for one run: the parameter list, the best value known so
/// far for each parameter and every sweep performed.
#[derive(Debug, Clone)]
pub struct SweepSession {
    parameters: Vec<ParameterSpace>,
    best: Vec<Option<ChosenValue>>,
    history: Vec<ParameterOutcome>,
}

impl SweepSession {
    pub fn new(parameters: Vec<ParameterSpace>) -> Self {
        let best = vec![None; parameters.len()];
        Self {
            parameters,
            best,
            history: Vec::new(),
        }
    }

    pub fn parameters(&self) -> &[ParameterSpace] {
        &self.parameters
    }

    pub fn best(&self, name: &str) -> Option<&ChosenValue> {
        self.parameters
            .iter()
            .position(|space| space.name == name)
            .and_then(|index| self.best[index].as_ref())
    }

    pub fn history(&self) -> &[ParameterOutcome] {
        &self.history
    }

    /// Stores a finished sweep of parameter `index`; a later pass replaces
    /// the earlier best value.
    pub fn record(&mut self, index: usize, outcome: ParameterOutcome) {
        if let Some(slot) = self.best.get_mut(index) {
            *slot = Some(ChosenValue {
                name: outcome.name.clone(),
                value: outcome.best.clone(),
                score: outcome.best_score,
            });
        }
        self.history.push(outcome);
    }

    pub fn into_report(self) -> SweepReport {
        SweepReport {
            chosen: self.best.into_iter().flatten().collect(),
            history: self.history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(iteration: usize, name: &str, best: &str, score: f64) -> ParameterOutcome {
        ParameterOutcome {
            iteration,
            name: name.into(),
            initial: "init".into(),
            best: best.into(),
            best_score: score,
            trace: Vec::new(),
        }
    }

    #[test]
    fn later_pass_replaces_best_value() {
        let mut session = SweepSession::new(vec![
            ParameterSpace::new("TXPRE", &["a", "b"]),
            ParameterSpace::new("TXPOST", &["c"]),
        ]);
        session.record(0, outcome(0, "TXPRE", "a", 1.0));
        session.record(1, outcome(0, "TXPOST", "c", 2.0));
        session.record(0, outcome(1, "TXPRE", "b", 3.0));

        assert_eq!(session.best("TXPRE").unwrap().value, "b");
        assert_eq!(session.history().len(), 3);

        let report = session.into_report();
        assert_eq!(report.chosen.len(), 2);
        assert_eq!(report.chosen_value("TXPOST"), Some("c"));
        assert_eq!(report.chosen_value("TXDIFFSWING"), None);
    }

    #[test]
    fn report_json_omits_absent_candidate_details() {
        use crate::eye::{AreaSource, EyeAssessment, Validity};

        let mut sweep = outcome(0, "TXPRE", "{0.22 dB (00001)}", 0.6);
        sweep.trace = vec![
            CandidateScore {
                value: "{0.22 dB (00001)}".into(),
                file: PathBuf::from("runs/0TXPRE_0_22_dB__00001__.csv"),
                score: 0.6,
                readback_mismatch: None,
                assessment: Some(EyeAssessment {
                    validity: Validity::Valid { edge_minimum: 0.5 },
                    source: AreaSource::CenterEstimate,
                    open_area: 0.6,
                }),
                error: None,
            },
            CandidateScore {
                value: "{0.45 dB (00010)}".into(),
                file: PathBuf::from("runs/0TXPRE_0_45_dB__00010__.csv"),
                score: 0.0,
                readback_mismatch: None,
                assessment: None,
                error: Some("scan file has no Scan Start/Scan End block".into()),
            },
        ];
        let mut session = SweepSession::new(vec![ParameterSpace::new("TXPRE", &[])]);
        session.record(0, sweep);

        let json = serde_json::to_value(session.into_report()).unwrap();
        let trace = &json["history"][0]["trace"];
        assert_eq!(trace[0]["assessment"]["validity"]["kind"], "valid");
        assert_eq!(trace[0]["assessment"]["source"]["kind"], "center_estimate");
        assert!(trace[0].get("error").is_none());
        assert!(trace[1].get("assessment").is_none());
        assert!(trace[1].get("readback_mismatch").is_none());
        assert_eq!(json["chosen"][0]["value"], "{0.22 dB (00001)}");
    }
}
