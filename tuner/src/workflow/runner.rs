use crate::workflow::config::WorkflowConfig;
use crate::workflow::link::{establish_link, Selector};
use anyhow::Context;
use cleyecore::channel::{CommandChannel, Transceiver};
use cleyecore::prelude::SweepError;
use cleyecore::sweep::{CancelToken, FileScorer, SweepOptimizer, SweepReport};
use log::{error, info, warn};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub struct Runner {
    config: WorkflowConfig,
    cancel: CancelToken,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Loads the helper procedures into both consoles and selects the link.
    pub fn prepare<T: CommandChannel, R: CommandChannel>(
        &self,
        tx: &mut Transceiver<T>,
        rx: &mut Transceiver<R>,
        selector: &mut dyn Selector,
    ) -> anyhow::Result<()> {
        self.cancel.check()?;
        if let Some(script) = &self.config.console.startup_script {
            info!("Sourcing TCL procedures.");
            rx.source(script)
                .with_context(|| format!("sourcing {} on RX", script))?;
            tx.source(script)
                .with_context(|| format!("sourcing {} on TX", script))?;
        }
        establish_link(tx, rx, selector, &self.cancel).context("selecting the link")
    }

    pub fn execute<T: CommandChannel, R: CommandChannel>(
        &self,
        tx: &mut Transceiver<T>,
        rx: &mut Transceiver<R>,
    ) -> anyhow::Result<SweepReport> {
        let sweep = self.config.sweep.clone();
        let scorer = FileScorer::new(sweep.thresholds);
        let mut optimizer = SweepOptimizer::new(sweep, scorer).with_cancel(self.cancel.clone());
        let result = optimizer.run(tx, rx);

        let counts = optimizer.metrics().snapshot();
        info!(
            "Evaluated {} scans ({} degraded, {} readback mismatches)",
            counts.evaluated, counts.degraded, counts.readback_mismatches
        );
        result.context("running the parameter sweep")
    }

    pub fn run<T: CommandChannel, R: CommandChannel>(
        &self,
        tx: &mut Transceiver<T>,
        rx: &mut Transceiver<R>,
        selector: &mut dyn Selector,
    ) -> anyhow::Result<SweepReport> {
        self.prepare(tx, rx, selector)?;
        self.execute(tx, rx)
    }
}

pub fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<SweepError>(), Some(SweepError::Cancelled))
}

/// Exits the transmitter console first, then the receiver.
pub fn shutdown_both<T: CommandChannel, R: CommandChannel>(
    tx: &mut Transceiver<T>,
    rx: &mut Transceiver<R>,
) {
    for (side, outcome) in [(tx.side(), tx.shutdown()), (rx.side(), rx.shutdown())] {
        if let Err(err) = outcome {
            error!("{} console did not exit cleanly: {}", side, err);
        }
    }
}

/// Ends a failed or interrupted run with both consoles shut down, TX first.
/// An operator interrupt is not an error; anything else is handed back.
pub fn abandon_run<T: CommandChannel, R: CommandChannel>(
    tx: &mut Transceiver<T>,
    rx: &mut Transceiver<R>,
    err: anyhow::Error,
) -> anyhow::Result<()> {
    let cancelled = is_cancelled(&err);
    if cancelled {
        warn!("Run interrupted, shutting down both consoles");
    }
    shutdown_both(tx, rx);
    if cancelled {
        Ok(())
    } else {
        Err(err)
    }
}

pub fn write_report<P: AsRef<Path>>(report: &SweepReport, path: P) -> anyhow::Result<()> {
    let path_ref = path.as_ref();
    if let Some(parent) = path_ref.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(report).context("serialising the sweep report")?;
    fs::write(path_ref, json).with_context(|| format!("writing {}", path_ref.display()))?;
    Ok(())
}

pub fn summarize(report: &SweepReport) -> String {
    let mut summary = String::new();
    for chosen in &report.chosen {
        let _ = writeln!(
            summary,
            "{} -> best {} (score {:.4})",
            chosen.name, chosen.value, chosen.score
        );
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::synthetic::{SimulatedLink, SyntheticConfig};
    use crate::workflow::config::LinkSelection;
    use crate::workflow::link::{NoOperator, PresetSelector};
    use cleyecore::channel::Side;
    use tempfile::TempDir;

    fn offline_config(dir: &TempDir) -> WorkflowConfig {
        WorkflowConfig {
            link: LinkSelection {
                tx_device: Some(0),
                rx_device: Some(1),
                tx_sio: Some(0),
                rx_sio: Some(1),
            },
            synthetic: SyntheticConfig {
                noise: 0.0,
                ..Default::default()
            },
            ..Default::default()
        }
        .with_results_dir(Some(dir.path().join("runs")))
    }

    #[test]
    fn offline_run_finds_synthetic_optimum() {
        let dir = TempDir::new().unwrap();
        let config = offline_config(&dir);
        let link = SimulatedLink::new(config.synthetic.clone());
        let mut tx = Transceiver::new(link.console(Side::Tx), Side::Tx);
        let mut rx = Transceiver::new(link.console(Side::Rx), Side::Rx);
        let mut selector = PresetSelector::new(&config.link, NoOperator);

        let runner = Runner::new(config);
        let report = runner.run(&mut tx, &mut rx, &mut selector).unwrap();

        assert_eq!(report.chosen_value("TXDIFFSWING"), Some("{1056 mV (1101)}"));
        assert_eq!(report.chosen_value("TXPRE"), Some("{0.45 dB (00010)}"));
        assert_eq!(report.chosen_value("TXPOST"), Some("{0.92 dB (00100)}"));
        assert_eq!(link.scans_taken(), 15);
        assert!(dir.path().join("runs").join("0TXPRE_0_45_dB__00010__.csv").exists());

        let summary = summarize(&report);
        assert!(summary.contains("TXPOST -> best {0.92 dB (00100)}"));
    }

    #[test]
    fn cancelled_run_is_recognised() {
        let dir = TempDir::new().unwrap();
        let config = offline_config(&dir);
        let link = SimulatedLink::new(config.synthetic.clone());
        let mut tx = Transceiver::new(link.console(Side::Tx), Side::Tx);
        let mut rx = Transceiver::new(link.console(Side::Rx), Side::Rx);
        let mut selector = PresetSelector::new(&config.link, NoOperator);

        let cancel = CancelToken::new();
        let runner = Runner::new(config).with_cancel(cancel.clone());
        runner.prepare(&mut tx, &mut rx, &mut selector).unwrap();
        cancel.cancel();
        let err = runner.execute(&mut tx, &mut rx).unwrap_err();
        assert!(is_cancelled(&err));
        assert_eq!(link.scans_taken(), 0);

        shutdown_both(&mut tx, &mut rx);
        assert!(tx.channel().is_terminated());
        assert!(rx.channel().is_terminated());
    }

    #[test]
    fn interrupt_before_run_skips_link_setup() {
        let dir = TempDir::new().unwrap();
        let config = offline_config(&dir);
        let link = SimulatedLink::new(config.synthetic.clone());
        let mut tx = Transceiver::new(link.console(Side::Tx), Side::Tx);
        let mut rx = Transceiver::new(link.console(Side::Rx), Side::Rx);
        let mut selector = PresetSelector::new(&config.link, NoOperator);

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = Runner::new(config)
            .with_cancel(cancel)
            .run(&mut tx, &mut rx, &mut selector)
            .unwrap_err();
        assert!(is_cancelled(&err));
        assert_eq!(tx.sio(), None);
        assert_eq!(rx.sio(), None);
        assert_eq!(link.scans_taken(), 0);

        abandon_run(&mut tx, &mut rx, err).unwrap();
        assert!(tx.channel().is_terminated());
        assert!(rx.channel().is_terminated());
    }

    #[test]
    fn fatal_error_shuts_down_and_is_returned() {
        let dir = TempDir::new().unwrap();
        let mut config = offline_config(&dir);
        config.synthetic.devices.clear();
        let link = SimulatedLink::new(config.synthetic.clone());
        let mut tx = Transceiver::new(link.console(Side::Tx), Side::Tx);
        let mut rx = Transceiver::new(link.console(Side::Rx), Side::Rx);
        let mut selector = PresetSelector::new(&config.link, NoOperator);

        let err = Runner::new(config)
            .run(&mut tx, &mut rx, &mut selector)
            .unwrap_err();
        assert!(!is_cancelled(&err));

        let returned = abandon_run(&mut tx, &mut rx, err).unwrap_err();
        assert!(format!("{:#}", returned).contains("No target device found"));
        assert!(tx.channel().is_terminated());
        assert!(rx.channel().is_terminated());
    }

    #[test]
    fn report_is_written_as_json() {
        let dir = TempDir::new().unwrap();
        let config = offline_config(&dir);
        let link = SimulatedLink::new(config.synthetic.clone());
        let mut tx = Transceiver::new(link.console(Side::Tx), Side::Tx);
        let mut rx = Transceiver::new(link.console(Side::Rx), Side::Rx);
        let mut selector = PresetSelector::new(&config.link, NoOperator);
        let report = Runner::new(config)
            .run(&mut tx, &mut rx, &mut selector)
            .unwrap();

        let path = dir.path().join("out").join("report.json");
        write_report(&report, &path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["chosen"].as_array().unwrap().len(), 3);
        assert_eq!(value["history"][0]["name"], "TXDIFFSWING");
        assert_eq!(value["history"][0]["trace"].as_array().unwrap().len(), 5);
    }
}
