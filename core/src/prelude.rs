use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Thresholds that decide whether a scan is an eye and how its area is estimated.
///
/// Offsets are in unit intervals of the normalized horizontal axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeThresholds {
    /// Columns with `|x|` above this are edge samples.
    pub edge_offset: f64,
    /// Smallest error rate every edge sample must reach for the scan to be an eye.
    pub min_edge_error_rate: f64,
    /// Columns with `|x|` below this are center samples.
    pub center_offset: f64,
    /// Minimum number of edge (and center) columns needed to judge a scan.
    pub min_region_samples: usize,
}

impl Default for EyeThresholds {
    fn default() -> Self {
        Self {
            edge_offset: 0.45,
            min_edge_error_rate: 0.005,
            center_offset: 0.2,
            min_region_samples: 2,
        }
    }
}

/// How a scan is requested from the receiver console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub horizontal_increment: u32,
    pub vertical_increment: u32,
    /// Scan geometry passed to `run_scan`, e.g. `2d_full_eye` or `1d_bathtub`.
    pub scan_type: String,
    pub link_name: String,
    /// Directory the console writes sweep files into.
    pub results_dir: PathBuf,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            horizontal_increment: 4,
            vertical_increment: 4,
            scan_type: "2d_full_eye".into(),
            link_name: "*".into(),
            results_dir: PathBuf::from("runs"),
        }
    }
}

/// One transmitter parameter and the ordered candidate values to try.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    pub name: String,
    pub values: Vec<String>,
}

impl ParameterSpace {
    pub fn new<S: Into<String>>(name: S, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Everything the optimizer needs besides the two device sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Number of greedy passes over the whole parameter list.
    pub iterations: usize,
    /// Swept in this order; later sweeps see earlier parameters at their best value.
    pub parameters: Vec<ParameterSpace>,
    pub scan: ScanSettings,
    pub thresholds: EyeThresholds,
    /// Pulse the receiver reset after each transmitter commit.
    pub reset_rx_before_scan: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            parameters: Vec::new(),
            scan: ScanSettings::default(),
            thresholds: EyeThresholds::default(),
            reset_rx_before_scan: false,
        }
    }
}

/// Errors raised while reading a sweep result file.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("io failure reading scan: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv failure reading scan: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed scan file: {0}")]
    Malformed(String),
    #[error("scan file has no scan block")]
    MissingScan,
    #[error("scan file has no `{0}` field")]
    MissingField(String),
    #[error("scan field `{0}` is not numeric")]
    NonNumericField(String),
}

pub type ScanResult<T> = Result<T, ScanError>;

/// Faults of the console conversation itself.
#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("the console process has terminated, sending commands is not possible")]
    Terminated,
    #[error("error during command `{command}`: {output}")]
    Command { command: String, output: String },
    #[error("{0} console has no transceiver channel selected")]
    NotLinked(String),
    #[error("no such variable: {0}")]
    UndefinedVariable(String),
    #[error("unexpected response to `{command}`: {output:?}")]
    UnexpectedResponse { command: String, output: String },
    #[error("console io failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Failures that abort a whole optimization run.
#[derive(thiserror::Error, Debug)]
pub enum SweepError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("scan `{file}` failed: {source}")]
    ScanTrigger {
        file: String,
        #[source]
        source: ChannelError,
    },
    #[error("sweep cancelled by operator")]
    Cancelled,
    #[error("cannot prepare results directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type SweepResult<T> = Result<T, SweepError>;
