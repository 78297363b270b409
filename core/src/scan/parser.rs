use crate::prelude::{ScanError, ScanResult};
use crate::scan::record::{
    MetaValue, ScanBlock, ScanRecord, ScanType, HORIZONTAL_INCREMENT, OPEN_AREA, SCAN_END,
    SCAN_START,
};
use csv::StringRecord;
use log::error;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Parses a sweep result file written by the hardware console.
pub fn parse_scan_file<P: AsRef<Path>>(path: P) -> ScanResult<ScanRecord> {
    let file = File::open(path.as_ref())?;
    parse_scan_reader(file)
}

pub fn parse_scan_str(contents: &str) -> ScanResult<ScanRecord> {
    parse_scan_reader(contents.as_bytes())
}

/// Streams comma-delimited rows: `key,value` metadata outside the
/// `Scan Start`/`Scan End` sentinels, raw scan rows inside them.
pub fn parse_scan_reader<R: Read>(reader: R) -> ScanResult<ScanRecord> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut metadata = BTreeMap::new();
    let mut capture: Option<Vec<StringRecord>> = None;
    let mut scan = None;

    for result in rdr.records() {
        let row = result?;
        let first = row.get(0).unwrap_or("");

        if let Some(rows) = capture.as_mut() {
            match first {
                SCAN_END => {
                    let rows = std::mem::take(rows);
                    capture = None;
                    scan = Some(parse_scan_rows(&rows)?);
                }
                SCAN_START => {
                    return Err(ScanError::Malformed("nested `Scan Start`".into()));
                }
                _ => rows.push(row),
            }
            continue;
        }

        match first {
            SCAN_START => {
                if scan.is_some() {
                    return Err(ScanError::Malformed("more than one scan block".into()));
                }
                capture = Some(Vec::new());
            }
            SCAN_END => {
                return Err(ScanError::Malformed(
                    "`Scan End` without `Scan Start`".into(),
                ));
            }
            key => {
                let value = MetaValue::from_field(row.get(1).unwrap_or(""));
                metadata.insert(key.to_string(), value);
            }
        }
    }

    if capture.is_some() {
        return Err(ScanError::Malformed("unterminated scan block".into()));
    }

    for name in [OPEN_AREA, HORIZONTAL_INCREMENT] {
        if let Some(MetaValue::Text(_)) = metadata.get(name) {
            return Err(ScanError::NonNumericField(name.to_string()));
        }
    }

    Ok(ScanRecord::new(metadata, scan))
}

fn parse_scan_rows(rows: &[StringRecord]) -> ScanResult<ScanBlock> {
    let header = rows
        .first()
        .ok_or_else(|| ScanError::Malformed("empty scan block".into()))?;

    let tag = header.get(0).unwrap_or("");
    let scan_type = ScanType::from_tag(tag).ok_or_else(|| {
        error!("Unknown scan type: {}", tag);
        ScanError::Malformed(format!("unknown scan type `{}`", tag))
    })?;

    let raw_x = parse_fields(header.iter().skip(1))?;
    let first_x = raw_x
        .first()
        .copied()
        .ok_or_else(|| ScanError::Malformed("scan header has no horizontal offsets".into()))?;

    // Thresholds are calibrated against this divisor; keep it as is.
    let divisor = (first_x * 2.0).abs();
    if divisor == 0.0 || !divisor.is_finite() {
        return Err(ScanError::Malformed(format!(
            "cannot normalize horizontal axis starting at {}",
            first_x
        )));
    }
    let x_axis: Vec<f64> = raw_x.iter().map(|x| x / divisor).collect();

    let mut y_axis = Vec::with_capacity(rows.len() - 1);
    let mut values = Vec::with_capacity((rows.len() - 1) * x_axis.len());
    for (index, row) in rows[1..].iter().enumerate() {
        let fields = parse_fields(row.iter())?;
        if fields.len() != x_axis.len() + 1 {
            return Err(ScanError::Malformed(format!(
                "scan row {} has {} values, expected {}",
                index + 1,
                fields.len().saturating_sub(1),
                x_axis.len()
            )));
        }
        y_axis.push(fields[0]);
        values.extend_from_slice(&fields[1..]);
    }

    let values = Array2::from_shape_vec((y_axis.len(), x_axis.len()), values)
        .map_err(|err| ScanError::Malformed(err.to_string()))?;
    ScanBlock::new(scan_type, x_axis, y_axis, values)
}

fn parse_fields<'a, I: Iterator<Item = &'a str>>(fields: I) -> ScanResult<Vec<f64>> {
    fields
        .map(|field| {
            field
                .trim()
                .parse::<f64>()
                .map_err(|_| ScanError::Malformed(format!("non-numeric scan field `{}`", field)))
        })
        .collect()
}
