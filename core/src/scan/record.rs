use crate::prelude::{ScanError, ScanResult};
use ndarray::{Array2, ArrayView2};
use std::collections::BTreeMap;
use std::fmt;

pub const SCAN_START: &str = "Scan Start";
pub const SCAN_END: &str = "Scan End";
pub const SCAN_NAME: &str = "Scan Name";
pub const OPEN_AREA: &str = "Open Area";
pub const HORIZONTAL_INCREMENT: &str = "Horizontal Increment";

/// A metadata value: numeric when the field parses as a float, text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Number(f64),
    Text(String),
}

impl MetaValue {
    pub fn from_field(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(value) => MetaValue::Number(value),
            Err(_) => MetaValue::Text(raw.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetaValue::Number(value) => Some(*value),
            MetaValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Number(_) => None,
            MetaValue::Text(text) => Some(text),
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Number(value) => write!(f, "{}", value),
            MetaValue::Text(text) => f.write_str(text),
        }
    }
}

/// Scan geometries the console can export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanType {
    Bathtub1d,
    Statistical2d,
}

impl ScanType {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "1d bathtub" => Some(ScanType::Bathtub1d),
            "2d statistical" => Some(ScanType::Statistical2d),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ScanType::Bathtub1d => "1d bathtub",
            ScanType::Statistical2d => "2d statistical",
        }
    }
}

/// The embedded sweep payload: one error-rate row per vertical offset.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanBlock {
    scan_type: ScanType,
    x_axis: Vec<f64>,
    y_axis: Vec<f64>,
    values: Array2<f64>,
}

impl ScanBlock {
    /// Builds a block, rejecting axes that disagree with the value matrix.
    pub fn new(
        scan_type: ScanType,
        x_axis: Vec<f64>,
        y_axis: Vec<f64>,
        values: Array2<f64>,
    ) -> ScanResult<Self> {
        let (rows, cols) = values.dim();
        if rows != y_axis.len() || cols != x_axis.len() {
            return Err(ScanError::Malformed(format!(
                "scan matrix is {}x{} but axes are {}x{}",
                rows,
                cols,
                y_axis.len(),
                x_axis.len()
            )));
        }
        Ok(Self {
            scan_type,
            x_axis,
            y_axis,
            values,
        })
    }

    pub fn scan_type(&self) -> ScanType {
        self.scan_type
    }

    /// Normalized horizontal offsets, in unit intervals.
    pub fn x_axis(&self) -> &[f64] {
        &self.x_axis
    }

    pub fn y_axis(&self) -> &[f64] {
        &self.y_axis
    }

    /// Rows follow `y_axis`, columns follow `x_axis`.
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }
}

/// One parsed sweep result file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanRecord {
    metadata: BTreeMap<String, MetaValue>,
    scan: Option<ScanBlock>,
}

impl ScanRecord {
    pub(crate) fn new(metadata: BTreeMap<String, MetaValue>, scan: Option<ScanBlock>) -> Self {
        Self { metadata, scan }
    }

    pub fn metadata(&self) -> &BTreeMap<String, MetaValue> {
        &self.metadata
    }

    pub fn field(&self, name: &str) -> Option<&MetaValue> {
        self.metadata.get(name)
    }

    pub fn number(&self, name: &str) -> ScanResult<f64> {
        match self.metadata.get(name) {
            Some(MetaValue::Number(value)) => Ok(*value),
            Some(MetaValue::Text(_)) => Err(ScanError::NonNumericField(name.to_string())),
            None => Err(ScanError::MissingField(name.to_string())),
        }
    }

    pub fn scan_name(&self) -> Option<String> {
        self.field(SCAN_NAME).map(|value| value.to_string())
    }

    pub fn scan(&self) -> Option<&ScanBlock> {
        self.scan.as_ref()
    }

    pub fn require_scan(&self) -> ScanResult<&ScanBlock> {
        self.scan.as_ref().ok_or(ScanError::MissingScan)
    }
}
