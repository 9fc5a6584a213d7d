//! Read-only view of a scientific array archive.
//!
//! [`Archive`] is the seam between the NetCDF reader in the application
//! crate and the pure extraction and assembly code in this crate. Numeric
//! values arrive already masked: an element equal to the variable's fill
//! value (or NaN) is `None`, which is distinct from zero.
//!
//! [`MemoryArchive`] is a builder-style in-memory implementation used by
//! tests and by callers that synthesise archives.

use std::collections::HashMap;

use thiserror::Error;

/// Structural failures while reading an archive.
///
/// Any of these aborts ingestion of the float the archive belongs to.
/// Decoding problems on optional fields are never errors; they degrade
/// to `None` in [`crate::extract`].
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive is missing required variable `{0}`")]
    MissingVariable(String),

    #[error("variable `{name}` has unexpected shape {shape:?}: {detail}")]
    Shape {
        name: String,
        shape: Vec<usize>,
        detail: String,
    },

    #[error("failed to read `{name}`: {message}")]
    Read { name: String, message: String },

    #[error("float identity mismatch: expected platform {expected}, archive says {found}")]
    Identity { expected: i64, found: String },

    #[error("failed to open archive {path}: {message}")]
    Open { path: String, message: String },
}

/// A global attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Numbers(Vec<f64>),
}

/// Element storage of a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum VarData {
    /// Numeric elements in row-major order, `None` where masked.
    Numeric(Vec<Option<f64>>),
    /// Raw bytes of a fixed-width character variable.
    Chars(Vec<u8>),
}

/// A fully materialised variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    /// Dimension lengths; empty for a 0-d (scalar) variable.
    pub shape: Vec<usize>,
    pub data: VarData,
    /// The `units` attribute, if the variable carries one.
    pub units: Option<String>,
}

impl Variable {
    pub fn numeric(name: &str, shape: &[usize], values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.to_string(),
            shape: shape.to_vec(),
            data: VarData::Numeric(values),
            units: None,
        }
    }

    pub fn chars(name: &str, shape: &[usize], bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            shape: shape.to_vec(),
            data: VarData::Chars(bytes),
            units: None,
        }
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = Some(units.to_string());
        self
    }

    /// Numeric elements, or `None` for a character variable.
    pub fn values(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            VarData::Numeric(v) => Some(v),
            VarData::Chars(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            VarData::Numeric(v) => v.len(),
            VarData::Chars(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read access to one archive file.
pub trait Archive {
    /// Look up a global attribute.
    fn attribute(&self, name: &str) -> Option<AttrValue>;

    /// Read a whole variable. `Ok(None)` when the archive has no such variable.
    fn variable(&self, name: &str) -> Result<Option<Variable>, ArchiveError>;

    /// Read a variable that must exist.
    fn require(&self, name: &str) -> Result<Variable, ArchiveError> {
        self.variable(name)?
            .ok_or_else(|| ArchiveError::MissingVariable(name.to_string()))
    }
}

/// In-memory archive.
///
/// ```rust
/// use argo_core::archive::{Archive, AttrValue, MemoryArchive, Variable};
///
/// let archive = MemoryArchive::new()
///     .with_attribute("PROJECT_NAME", AttrValue::Text("Argo India".into()))
///     .with_variable(Variable::numeric("CYCLE_NUMBER", &[2], vec![Some(1.0), None]));
/// assert!(archive.variable("CYCLE_NUMBER").unwrap().is_some());
/// assert!(archive.variable("JULD").unwrap().is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    attributes: HashMap<String, AttrValue>,
    variables: HashMap<String, Variable>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, name: &str, value: AttrValue) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn with_variable(mut self, var: Variable) -> Self {
        self.variables.insert(var.name.clone(), var);
        self
    }
}

impl Archive for MemoryArchive {
    fn attribute(&self, name: &str) -> Option<AttrValue> {
        self.attributes.get(name).cloned()
    }

    fn variable(&self, name: &str) -> Result<Option<Variable>, ArchiveError> {
        Ok(self.variables.get(name).cloned())
    }
}
