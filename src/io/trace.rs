//! Raw trace file reading.
//!
//! Trace files are whitespace-delimited text with two columns,
//! `(time_seconds, intensity_lux)`, optionally preceded by a few header
//! lines. Header lines are detected by failing to parse as two numbers;
//! unparseable lines after data has started are an error, not a header.

use std::fs;
use std::path::Path;

use crate::error::AppError;

/// A raw `(time, lux)` series as read from disk.
#[derive(Debug, Clone)]
pub struct RawTrace {
    pub time: Vec<f64>,
    pub intensity: Vec<f64>,
    /// Number of leading header lines that were skipped.
    pub header_lines: usize,
}

impl RawTrace {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

fn parse_row(line: &str) -> Option<(f64, f64)> {
    let mut cols = line.split_whitespace();
    let t: f64 = cols.next()?.parse().ok()?;
    let lux: f64 = cols.next()?.parse().ok()?;
    Some((t, lux))
}

/// Read and validate a trace file.
pub fn read_trace(path: &Path) -> Result<RawTrace, AppError> {
    let text = fs::read_to_string(path).map_err(|e| {
        AppError::data(format!("Failed to read trace '{}': {e}", path.display()))
    })?;
    parse_trace(&text, path)
}

fn parse_trace(text: &str, path: &Path) -> Result<RawTrace, AppError> {
    let mut time = Vec::new();
    let mut intensity = Vec::new();
    let mut header_lines = 0usize;

    for (lineno, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_row(line) {
            Some((t, lux)) => {
                time.push(t);
                intensity.push(lux);
            }
            None if time.is_empty() => header_lines += 1,
            None => {
                return Err(AppError::data(format!(
                    "Unparseable line {} in '{}': {line}",
                    lineno + 1,
                    path.display()
                )));
            }
        }
    }

    if time.len() < 2 {
        return Err(AppError::data(format!(
            "Trace '{}' has {} data rows; at least 2 are required.",
            path.display(),
            time.len()
        )));
    }

    for (i, pair) in time.windows(2).enumerate() {
        if !(pair[1] > pair[0]) {
            return Err(AppError::data(format!(
                "Non-monotonic time in '{}' at row {}: {} s follows {} s.",
                path.display(),
                i + 2,
                pair[1],
                pair[0]
            )));
        }
    }

    if let Some(bad) = intensity.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        return Err(AppError::data(format!(
            "Non-positive intensity {bad} lux in '{}'; transmission is undefined.",
            path.display()
        )));
    }

    Ok(RawTrace {
        time,
        intensity,
        header_lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fake_path() -> PathBuf {
        PathBuf::from("test.txt")
    }

    #[test]
    fn parses_two_columns() {
        let text = "0.0 812.5\n0.5 810.1\n1.0 808.9\n";
        let trace = parse_trace(text, &fake_path()).unwrap();
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.header_lines, 0);
        assert!((trace.intensity[1] - 810.1).abs() < 1e-12);
    }

    #[test]
    fn skips_leading_header_lines() {
        let text = "MAP test 2024.03.01\nsample: A7\ntime lux\n0.0 812.5\n0.5 810.1\n";
        let trace = parse_trace(text, &fake_path()).unwrap();
        assert_eq!(trace.header_lines, 3);
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn junk_after_data_is_a_data_error() {
        let text = "0.0 812.5\n0.5 810.1\noops\n";
        let err = parse_trace(text, &fake_path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }

    #[test]
    fn non_monotonic_time_is_a_data_error() {
        let text = "0.0 812.5\n1.0 810.1\n0.5 809.0\n";
        let err = parse_trace(text, &fake_path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
        assert!(err.to_string().contains("Non-monotonic"));
    }

    #[test]
    fn non_positive_intensity_is_a_data_error() {
        let text = "0.0 812.5\n0.5 0.0\n1.0 809.0\n";
        let err = parse_trace(text, &fake_path()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }

    #[test]
    fn extra_columns_are_tolerated() {
        let text = "0.0 812.5 1\n0.5 810.1 1\n";
        let trace = parse_trace(text, &fake_path()).unwrap();
        assert_eq!(trace.len(), 2);
    }
}
