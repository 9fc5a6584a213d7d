//! NetCDF-backed [`Archive`].
//!
//! Variables are read whole. Numeric elements are widened to `f64` and
//! masked against the variable's `_FillValue` / `missing_value`
//! attributes (and NaN). `NC_CHAR` variables are returned as raw bytes so
//! the core extractor can strip the NUL padding.
//!
//! [`ArchiveOpener`] is the seam the ingest pipeline opens files through;
//! tests plug in in-memory archives instead of real files.

use std::path::Path;

use argo_core::archive::{Archive, ArchiveError};

/// Opens archive files for the ingest pipeline.
pub trait ArchiveOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Archive>, ArchiveError>;
}

#[cfg(feature = "netcdf")]
pub use self::reader::{NetcdfArchive, NetcdfOpener};

#[cfg(feature = "netcdf")]
mod reader {
    use std::path::{Path, PathBuf};

    use argo_core::archive::{Archive, ArchiveError, AttrValue, VarData, Variable};
    use netcdf::types::NcVariableType;
    use netcdf::AttributeValue;

    use super::ArchiveOpener;

    /// An open NetCDF file.
    pub struct NetcdfArchive {
        file: netcdf::File,
        path: PathBuf,
    }

    impl NetcdfArchive {
        pub fn open(path: &Path) -> Result<Self, ArchiveError> {
            let file = netcdf::open(path).map_err(|e| ArchiveError::Open {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            Ok(Self {
                file,
                path: path.to_path_buf(),
            })
        }
    }

    /// Opens real files with [`NetcdfArchive`].
    #[derive(Debug, Default, Clone, Copy)]
    pub struct NetcdfOpener;

    impl ArchiveOpener for NetcdfOpener {
        fn open(&self, path: &Path) -> Result<Box<dyn Archive>, ArchiveError> {
            Ok(Box::new(NetcdfArchive::open(path)?))
        }
    }

    fn convert(value: AttributeValue) -> Option<AttrValue> {
        let numbers = |v: Vec<f64>| match v.as_slice() {
            [single] => Some(AttrValue::Number(*single)),
            _ => Some(AttrValue::Numbers(v)),
        };
        match value {
            AttributeValue::Str(s) => Some(AttrValue::Text(s)),
            AttributeValue::Strs(v) => Some(AttrValue::Text(v.join(""))),
            AttributeValue::Double(x) => Some(AttrValue::Number(x)),
            AttributeValue::Doubles(v) => numbers(v),
            AttributeValue::Float(x) => Some(AttrValue::Number(x as f64)),
            AttributeValue::Floats(v) => numbers(v.into_iter().map(f64::from).collect()),
            AttributeValue::Int(x) => Some(AttrValue::Number(x as f64)),
            AttributeValue::Ints(v) => numbers(v.into_iter().map(f64::from).collect()),
            AttributeValue::Short(x) => Some(AttrValue::Number(x as f64)),
            AttributeValue::Shorts(v) => numbers(v.into_iter().map(f64::from).collect()),
            AttributeValue::Schar(x) => Some(AttrValue::Number(x as f64)),
            AttributeValue::Uchar(x) => Some(AttrValue::Number(x as f64)),
            AttributeValue::Longlong(x) => Some(AttrValue::Number(x as f64)),
            _ => None,
        }
    }

    fn number(value: Option<AttrValue>) -> Option<f64> {
        match value? {
            AttrValue::Number(x) => Some(x),
            AttrValue::Numbers(v) => v.first().copied(),
            AttrValue::Text(_) => None,
        }
    }

    fn var_attribute(var: &netcdf::Variable<'_>, name: &str) -> Option<AttrValue> {
        var.attribute(name)
            .and_then(|a| a.value().ok())
            .and_then(convert)
    }

    fn mask(value: f64, fills: &[f64]) -> Option<f64> {
        if value.is_nan() || fills.iter().any(|f| *f == value) {
            None
        } else {
            Some(value)
        }
    }

    impl Archive for NetcdfArchive {
        fn attribute(&self, name: &str) -> Option<AttrValue> {
            self.file
                .attribute(name)
                .and_then(|a| a.value().ok())
                .and_then(convert)
        }

        fn variable(&self, name: &str) -> Result<Option<Variable>, ArchiveError> {
            let Some(var) = self.file.variable(name) else {
                return Ok(None);
            };
            let read_err = |e: netcdf::Error| ArchiveError::Read {
                name: name.to_string(),
                message: format!("{}: {}", self.path.display(), e),
            };

            let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
            let units = match var_attribute(&var, "units") {
                Some(AttrValue::Text(u)) => Some(u),
                _ => None,
            };

            let data = if matches!(var.vartype(), NcVariableType::Char) {
                VarData::Chars(var.get_raw_values(..).map_err(read_err)?)
            } else {
                let fills: Vec<f64> = ["_FillValue", "missing_value"]
                    .iter()
                    .filter_map(|attr| number(var_attribute(&var, attr)))
                    .collect();
                let raw: Vec<f64> = var.get_values::<f64, _>(..).map_err(read_err)?;
                VarData::Numeric(raw.into_iter().map(|v| mask(v, &fills)).collect())
            };

            Ok(Some(Variable {
                name: name.to_string(),
                shape,
                data,
                units,
            }))
        }
    }

}
