use crate::generator::synthetic::SyntheticConfig;
use anyhow::Context;
use cleyecore::prelude::{ParameterSpace, SweepConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How the vendor console is launched and recognised.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub executable: String,
    pub args: Vec<String>,
    pub prompt: String,
    /// Tcl procedures sourced into both consoles at startup.
    pub startup_script: Option<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            executable: "vivado".into(),
            args: vec!["-mode".into(), "tcl".into()],
            prompt: "Vivado% ".into(),
            startup_script: Some("sourceme.tcl".into()),
        }
    }
}

/// Fixed menu choices for unattended runs; unset entries are asked for.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSelection {
    pub tx_device: Option<usize>,
    pub rx_device: Option<usize>,
    pub tx_sio: Option<usize>,
    pub rx_sio: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub console: ConsoleConfig,
    pub link: LinkSelection,
    pub sweep: SweepConfig,
    pub synthetic: SyntheticConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            console: ConsoleConfig::default(),
            link: LinkSelection::default(),
            sweep: SweepConfig {
                parameters: default_parameters(),
                ..Default::default()
            },
            synthetic: SyntheticConfig::default(),
        }
    }
}

/// Candidate tables for the GTX transmitter driver.
pub fn default_parameters() -> Vec<ParameterSpace> {
    vec![
        ParameterSpace::new(
            "TXDIFFSWING",
            &[
                "{973 mV (1011)}",
                "{1018 mV (1100)}",
                "{1056 mV (1101)}",
                "{1092 mV (1110)}",
                "{1119 mV (1111)}",
            ],
        ),
        ParameterSpace::new(
            "TXPRE",
            &[
                "{0.00 dB (00000)}",
                "{0.22 dB (00001)}",
                "{0.45 dB (00010)}",
                "{0.68 dB (00011)}",
                "{0.92 dB (00100)}",
            ],
        ),
        ParameterSpace::new(
            "TXPOST",
            &[
                "{0.45 dB (00010)}",
                "{0.68 dB (00011)}",
                "{0.92 dB (00100)}",
                "{1.16 dB (00101)}",
                "{1.41 dB (00110)}",
            ],
        ),
    ]
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sweep.iterations == 0 {
            anyhow::bail!("sweep.iterations must be at least 1");
        }
        for space in &self.sweep.parameters {
            if space.values.is_empty() {
                anyhow::bail!("parameter {} has no candidate values", space.name);
            }
        }
        Ok(())
    }

    pub fn with_results_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.sweep.scan.results_dir = dir;
        }
        self
    }

    pub fn with_iterations(mut self, iterations: Option<usize>) -> Self {
        if let Some(iterations) = iterations {
            self.sweep.iterations = iterations;
        }
        self
    }

    pub fn with_selection(mut self, selection: LinkSelection) -> Self {
        let link = &mut self.link;
        link.tx_device = selection.tx_device.or(link.tx_device);
        link.rx_device = selection.rx_device.or(link.rx_device);
        link.tx_sio = selection.tx_sio.or(link.tx_sio);
        link.rx_sio = selection.rx_sio.or(link.rx_sio);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_sweeps_driver_parameters_in_order() {
        let cfg = WorkflowConfig::default();
        let names: Vec<&str> = cfg
            .sweep
            .parameters
            .iter()
            .map(|space| space.name.as_str())
            .collect();
        assert_eq!(names, vec!["TXDIFFSWING", "TXPRE", "TXPOST"]);
        assert_eq!(cfg.console.prompt, "Vivado% ");
        assert_eq!(cfg.sweep.thresholds.edge_offset, 0.45);
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"console:\n  executable: /opt/Xilinx/Vivado/2017.4/bin/vivado\nlink:\n  tx_device: 0\n  rx_device: 1\nsweep:\n  iterations: 2\n  parameters:\n    - name: TXPRE\n      values: ['{0.00 dB (00000)}', '{0.22 dB (00001)}']\n  thresholds:\n    center_offset: 0.25\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.console.executable, "/opt/Xilinx/Vivado/2017.4/bin/vivado");
        assert_eq!(cfg.console.prompt, "Vivado% ");
        assert_eq!(cfg.link.rx_device, Some(1));
        assert_eq!(cfg.sweep.iterations, 2);
        assert_eq!(cfg.sweep.parameters.len(), 1);
        assert_eq!(cfg.sweep.thresholds.center_offset, 0.25);
        assert_eq!(cfg.sweep.thresholds.edge_offset, 0.45);
        assert_eq!(cfg.sweep.scan.scan_type, "2d_full_eye");
    }

    #[test]
    fn empty_candidate_list_is_rejected() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"sweep:\n  parameters:\n    - name: TXPRE\n      values: []\n")
            .unwrap();
        let path = temp.into_temp_path();
        assert!(WorkflowConfig::load(&path).is_err());
    }

    #[test]
    fn command_line_selection_overrides_file() {
        let cfg = WorkflowConfig::default()
            .with_selection(LinkSelection {
                tx_device: Some(1),
                ..Default::default()
            })
            .with_iterations(Some(3))
            .with_results_dir(Some(PathBuf::from("/tmp/scans")));
        assert_eq!(cfg.link.tx_device, Some(1));
        assert_eq!(cfg.link.rx_device, None);
        assert_eq!(cfg.sweep.iterations, 3);
        assert_eq!(cfg.sweep.scan.results_dir, PathBuf::from("/tmp/scans"));
    }
}
