//! Scalar and array extraction.
//!
//! Turns raw archive contents into clean typed values:
//!
//! - fixed-width byte strings → trimmed `String` with every NUL removed
//! - 14-digit `YYYYMMDDHHMMSS` stamps → `NaiveDateTime`
//! - 0-d and single-element variables → bare `f64`
//! - CF time units (`"days since 1950-01-01 00:00:00 UTC"`) → UTC timestamps
//! - 1-D and 2-D normalisation of time- and depth-indexed variables
//!
//! Everything optional degrades to `None` instead of failing. Only the
//! shape helpers return [`ArchiveError`], because a wrong shape means the
//! archive is not the kind this pipeline understands.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::archive::{Archive, ArchiveError, AttrValue, VarData, Variable};

/// Decode a fixed-width character buffer.
///
/// NUL bytes are removed wherever they occur, not only at the ends:
/// fixed-width encodings can pad in the middle of the buffer. An empty
/// result is treated as missing.
pub fn clean_char_bytes(raw: &[u8]) -> Option<String> {
    let bytes: Vec<u8> = raw.iter().copied().filter(|&b| b != 0).collect();
    let text = String::from_utf8_lossy(&bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a compact `YYYYMMDDHHMMSS` timestamp. Anything else is `None`.
pub fn parse_compact_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.len() != 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S").ok()
}

/// Read a text value, preferring the global attribute over a variable.
pub fn read_text(archive: &dyn Archive, name: &str) -> Option<String> {
    match archive.attribute(name) {
        Some(AttrValue::Text(s)) => return clean_char_bytes(s.as_bytes()),
        Some(_) => return None,
        None => {}
    }
    match archive.variable(name) {
        Ok(Some(Variable {
            data: VarData::Chars(bytes),
            ..
        })) => clean_char_bytes(&bytes),
        _ => None,
    }
}

/// Read a numeric scalar, preferring the global attribute over a variable.
///
/// 0-d variables and single-element containers unwrap to their element.
/// Masked elements, NaN and multi-element containers give `None`.
pub fn read_scalar(archive: &dyn Archive, name: &str) -> Option<f64> {
    let value = match archive.attribute(name) {
        Some(AttrValue::Number(v)) => Some(v),
        Some(AttrValue::Numbers(vs)) if vs.len() == 1 => Some(vs[0]),
        Some(_) => None,
        None => match archive.variable(name) {
            Ok(Some(var)) => match var.values() {
                Some([single]) => *single,
                _ => None,
            },
            _ => None,
        },
    };
    value.filter(|v| v.is_finite())
}

/// Read a compact timestamp stored as text (attribute or char variable).
pub fn read_timestamp(archive: &dyn Archive, name: &str) -> Option<NaiveDateTime> {
    read_text(archive, name).and_then(|s| parse_compact_timestamp(&s))
}

/// A parsed CF-style `"<unit> since <reference>"` time declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    seconds_per_unit: f64,
    epoch: DateTime<Utc>,
}

impl TimeUnits {
    /// Parse a units string such as `"days since 1950-01-01 00:00:00 UTC"`.
    pub fn parse(units: &str) -> Option<Self> {
        let lower = units.trim().to_ascii_lowercase();
        let (unit, reference) = lower.split_once(" since ")?;
        let seconds_per_unit = match unit.trim() {
            "days" | "day" | "d" => 86_400.0,
            "hours" | "hour" | "hr" | "h" => 3_600.0,
            "minutes" | "minute" | "min" => 60.0,
            "seconds" | "second" | "sec" | "s" => 1.0,
            _ => return None,
        };
        let epoch = parse_reference(reference)?;
        Some(Self {
            seconds_per_unit,
            epoch,
        })
    }

    /// Convert a numeric offset into a timestamp. Non-finite or absurd
    /// offsets give `None`.
    pub fn to_datetime(&self, value: f64) -> Option<DateTime<Utc>> {
        if !value.is_finite() {
            return None;
        }
        let micros = value * self.seconds_per_unit * 1e6;
        if micros.abs() > 1e17 {
            return None;
        }
        self.epoch
            .checked_add_signed(Duration::microseconds(micros.round() as i64))
    }
}

fn parse_reference(reference: &str) -> Option<DateTime<Utc>> {
    let cleaned = reference
        .trim()
        .trim_end_matches("utc")
        .trim_end_matches('z')
        .trim();
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dt%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
    ];
    for fmt in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(cleaned, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(cleaned, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Normalise a time-indexed variable to 1-D.
///
/// A 0-d variable becomes a one-element series, so single-profile and
/// multi-profile archives look the same downstream.
pub fn series_1d(var: &Variable) -> Result<Vec<Option<f64>>, ArchiveError> {
    let values = var.values().ok_or_else(|| ArchiveError::Shape {
        name: var.name.clone(),
        shape: var.shape.clone(),
        detail: "expected a numeric variable".to_string(),
    })?;
    if var.shape.iter().filter(|&&d| d != 1).count() > 1 {
        return Err(ArchiveError::Shape {
            name: var.name.clone(),
            shape: var.shape.clone(),
            detail: "expected at most one non-trivial dimension".to_string(),
        });
    }
    Ok(values.to_vec())
}

/// A depth-indexed variable normalised to profiles × levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    values: Vec<Option<f64>>,
}

impl Grid {
    /// Normalise to 2-D: a 1-D variable of length `L` becomes `1 × L`,
    /// a 0-d variable becomes `1 × 1`.
    pub fn from_variable(var: &Variable) -> Result<Self, ArchiveError> {
        let shape_err = |detail: &str| ArchiveError::Shape {
            name: var.name.clone(),
            shape: var.shape.clone(),
            detail: detail.to_string(),
        };
        let values = var
            .values()
            .ok_or_else(|| shape_err("expected a numeric variable"))?;
        let (rows, cols) = match var.shape.as_slice() {
            [] => (1, 1),
            [len] => (1, *len),
            [rows, cols] => (*rows, *cols),
            _ => return Err(shape_err("expected at most two dimensions")),
        };
        if rows * cols != values.len() {
            return Err(shape_err("element count does not match shape"));
        }
        Ok(Self {
            rows,
            cols,
            values: values.to_vec(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Element at `(row, col)`; `None` when masked or out of range.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.values[row * self.cols + col]
    }
}
