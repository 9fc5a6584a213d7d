//! Float and profile assembly.
//!
//! Converts a float's metadata archive into a [`FloatRecord`] and its
//! profile archive into [`ProfileRecord`]s carrying depth-ordered
//! [`MeasurementRecord`]s. Records that lack a mandatory field are
//! dropped and reported as [`SkippedProfile`]s rather than stored with
//! nulls.

use std::ops::RangeInclusive;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::archive::{Archive, ArchiveError};
use crate::extract::{read_scalar, read_text, read_timestamp, series_1d, Grid, TimeUnits};

/// Variable names used in Argo metadata and profile files.
pub mod vars {
    pub const PLATFORM_NUMBER: &str = "PLATFORM_NUMBER";
    pub const PROJECT_NAME: &str = "PROJECT_NAME";
    pub const LAUNCH_DATE: &str = "LAUNCH_DATE";
    pub const LAUNCH_LATITUDE: &str = "LAUNCH_LATITUDE";
    pub const LAUNCH_LONGITUDE: &str = "LAUNCH_LONGITUDE";

    pub const JULD: &str = "JULD";
    pub const LATITUDE: &str = "LATITUDE";
    pub const LONGITUDE: &str = "LONGITUDE";
    pub const CYCLE_NUMBER: &str = "CYCLE_NUMBER";

    pub const PRES: &str = "PRES";
    pub const TEMP: &str = "TEMP";
    pub const PSAL: &str = "PSAL";
    pub const DOXY: &str = "DOXY";
    pub const CHLA: &str = "CHLA";
    pub const NITRATE: &str = "NITRATE";
    pub const PH_IN_SITU_TOTAL: &str = "PH_IN_SITU_TOTAL";
    pub const BBP700: &str = "BBP700";
}

/// Float class, decided by which profile archive variant was ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FloatType {
    /// Biogeochemical float (synthetic `_Sprof.nc` archive).
    Bgc,
    /// Core float (`_prof.nc` archive).
    Core,
}

impl FloatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FloatType::Bgc => "BGC",
            FloatType::Core => "core",
        }
    }
}

/// One float's metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FloatRecord {
    pub platform_id: i64,
    pub project_name: Option<String>,
    pub launch_date: Option<NaiveDateTime>,
    pub launch_latitude: Option<f64>,
    pub launch_longitude: Option<f64>,
    pub float_type: FloatType,
}

/// One depth level of a profile. Pressure is always present.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MeasurementRecord {
    pub pressure: f64,
    pub temperature: Option<f64>,
    pub salinity: Option<f64>,
    pub doxy: Option<f64>,
    pub chla: Option<f64>,
    pub nitrate: Option<f64>,
    pub ph_in_situ_total: Option<f64>,
    pub bbp700: Option<f64>,
}

/// One vertical cast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRecord {
    pub cycle_number: i32,
    pub profile_date: Option<DateTime<Utc>>,
    pub latitude: f64,
    pub longitude: f64,
    /// Pressure-ascending.
    pub measurements: Vec<MeasurementRecord>,
}

/// Accepted latitude range, degrees.
pub const LATITUDE_RANGE: RangeInclusive<f64> = -90.0..=90.0;
/// Accepted longitude range, degrees. Some archives use 0..360.
pub const LONGITUDE_RANGE: RangeInclusive<f64> = -180.0..=360.0;

/// A profile dropped because a mandatory field was masked or out of range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedProfile {
    pub index: usize,
    pub reason: &'static str,
}

/// Result of assembling a profile archive.
#[derive(Debug, Clone, Default)]
pub struct AssembledProfiles {
    pub profiles: Vec<ProfileRecord>,
    pub skipped: Vec<SkippedProfile>,
    /// The `units` string of `JULD` when it could not be parsed; every
    /// profile date is then missing.
    pub unparsed_time_units: Option<String>,
}

/// Build the float record from a metadata archive.
///
/// `platform_id` comes from the float's directory name. If the archive
/// also carries `PLATFORM_NUMBER` it must agree, otherwise the float is
/// rejected: its identity cannot be trusted.
pub fn assemble_float(
    platform_id: i64,
    meta: &dyn Archive,
    float_type: FloatType,
) -> Result<FloatRecord, ArchiveError> {
    if let Some(number) = read_text(meta, vars::PLATFORM_NUMBER) {
        match number.parse::<i64>() {
            Ok(found) if found == platform_id => {}
            _ => {
                return Err(ArchiveError::Identity {
                    expected: platform_id,
                    found: number,
                })
            }
        }
    }

    Ok(FloatRecord {
        platform_id,
        project_name: read_text(meta, vars::PROJECT_NAME),
        launch_date: read_timestamp(meta, vars::LAUNCH_DATE),
        launch_latitude: read_scalar(meta, vars::LAUNCH_LATITUDE),
        launch_longitude: read_scalar(meta, vars::LAUNCH_LONGITUDE),
        float_type,
    })
}

struct LevelGrids {
    pres: Grid,
    temp: Option<Grid>,
    psal: Option<Grid>,
    doxy: Option<Grid>,
    chla: Option<Grid>,
    nitrate: Option<Grid>,
    ph: Option<Grid>,
    bbp700: Option<Grid>,
}

impl LevelGrids {
    fn load(archive: &dyn Archive) -> Result<Self, ArchiveError> {
        let pres = Grid::from_variable(&archive.require(vars::PRES)?)?;
        let optional = |name: &str| -> Result<Option<Grid>, ArchiveError> {
            let Some(var) = archive.variable(name)? else {
                return Ok(None);
            };
            let grid = Grid::from_variable(&var)?;
            if grid.dims() != pres.dims() {
                return Err(ArchiveError::Shape {
                    name: name.to_string(),
                    shape: var.shape.clone(),
                    detail: format!("does not match {} {:?}", vars::PRES, pres.dims()),
                });
            }
            Ok(Some(grid))
        };
        Ok(Self {
            temp: optional(vars::TEMP)?,
            psal: optional(vars::PSAL)?,
            doxy: optional(vars::DOXY)?,
            chla: optional(vars::CHLA)?,
            nitrate: optional(vars::NITRATE)?,
            ph: optional(vars::PH_IN_SITU_TOTAL)?,
            bbp700: optional(vars::BBP700)?,
            pres,
        })
    }

    fn level(&self, i: usize, j: usize) -> Option<MeasurementRecord> {
        let at = |grid: &Option<Grid>| grid.as_ref().and_then(|g| g.get(i, j));
        Some(MeasurementRecord {
            pressure: self.pres.get(i, j)?,
            temperature: at(&self.temp),
            salinity: at(&self.psal),
            doxy: at(&self.doxy),
            chla: at(&self.chla),
            nitrate: at(&self.nitrate),
            ph_in_situ_total: at(&self.ph),
            bbp700: at(&self.bbp700),
        })
    }
}

/// Assemble every profile of a profile archive.
///
/// Structural problems (missing core variables, mismatched lengths or
/// shapes) abort with an error. A masked or out-of-range position, or a
/// masked cycle number, drops that profile only; masked time is allowed and stored as `None`;
/// masked pressure drops that level only.
pub fn assemble_profiles(archive: &dyn Archive) -> Result<AssembledProfiles, ArchiveError> {
    let juld = archive.require(vars::JULD)?;
    let times = series_1d(&juld)?;
    let n_prof = times.len();

    let indexed = |name: &str| -> Result<Vec<Option<f64>>, ArchiveError> {
        let var = archive.require(name)?;
        let values = series_1d(&var)?;
        if values.len() != n_prof {
            return Err(ArchiveError::Shape {
                name: name.to_string(),
                shape: var.shape.clone(),
                detail: format!("expected {} profiles", n_prof),
            });
        }
        Ok(values)
    };
    let lats = indexed(vars::LATITUDE)?;
    let lons = indexed(vars::LONGITUDE)?;
    let cycles = indexed(vars::CYCLE_NUMBER)?;

    let grids = LevelGrids::load(archive)?;
    if grids.pres.rows() != n_prof {
        return Err(ArchiveError::Shape {
            name: vars::PRES.to_string(),
            shape: vec![grids.pres.rows(), grids.pres.cols()],
            detail: format!("expected {} profiles", n_prof),
        });
    }

    let time_units = juld.units.as_deref().and_then(TimeUnits::parse);
    let mut out = AssembledProfiles {
        unparsed_time_units: match time_units {
            Some(_) => None,
            None => Some(juld.units.clone().unwrap_or_default()),
        },
        ..Default::default()
    };

    for i in 0..n_prof {
        let (latitude, longitude, cycle) = match (lats[i], lons[i], cycles[i]) {
            (Some(lat), Some(lon), Some(cycle)) => (lat, lon, cycle),
            (lat, lon, _) => {
                let reason = if lat.is_none() {
                    "latitude missing"
                } else if lon.is_none() {
                    "longitude missing"
                } else {
                    "cycle_number missing"
                };
                out.skipped.push(SkippedProfile { index: i, reason });
                continue;
            }
        };
        let out_of_range = if !LATITUDE_RANGE.contains(&latitude) {
            Some("latitude out of range")
        } else if !LONGITUDE_RANGE.contains(&longitude) {
            Some("longitude out of range")
        } else {
            None
        };
        if let Some(reason) = out_of_range {
            out.skipped.push(SkippedProfile { index: i, reason });
            continue;
        }

        let profile_date = match (time_units, times[i]) {
            (Some(units), Some(t)) => units.to_datetime(t),
            _ => None,
        };

        let mut measurements: Vec<MeasurementRecord> = (0..grids.pres.cols())
            .filter_map(|j| grids.level(i, j))
            .collect();
        measurements.sort_by(|a, b| a.pressure.total_cmp(&b.pressure));

        out.profiles.push(ProfileRecord {
            cycle_number: cycle.trunc() as i32,
            profile_date,
            latitude,
            longitude,
            measurements,
        });
    }

    Ok(out)
}
