#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use argo_core::archive::{Archive, ArchiveError, AttrValue, MemoryArchive, Variable};
use argo_core::assemble::FloatType;
use argo_harness::ingest::FloatSource;
use argo_harness::netcdf_archive::ArchiveOpener;
use sqlx::SqlitePool;
use tempfile::TempDir;

pub const JULD_UNITS: &str = "days since 1950-01-01 00:00:00 UTC";

/// 2024-01-15 00:00 UTC as days since 1950-01-01.
pub const JAN_15_2024: f64 = 27042.0;

/// Opens in-memory archives registered under file paths.
#[derive(Default)]
pub struct MapOpener {
    archives: HashMap<PathBuf, MemoryArchive>,
}

impl MapOpener {
    pub fn insert(&mut self, path: &Path, archive: MemoryArchive) {
        self.archives.insert(path.to_path_buf(), archive);
    }
}

impl ArchiveOpener for MapOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn Archive>, ArchiveError> {
        match self.archives.get(path) {
            Some(archive) => Ok(Box::new(archive.clone())),
            None => Err(ArchiveError::Open {
                path: path.display().to_string(),
                message: "no such archive".to_string(),
            }),
        }
    }
}

pub fn meta_archive(platform_number: &str) -> MemoryArchive {
    let mut padded = platform_number.as_bytes().to_vec();
    padded.resize(8, 0);
    MemoryArchive::new()
        .with_variable(Variable::chars("PLATFORM_NUMBER", &[8], padded))
        .with_attribute("PROJECT_NAME", AttrValue::Text("ARGO INDIA".into()))
        .with_variable(Variable::chars("LAUNCH_DATE", &[14], b"20230601120000".to_vec()))
        .with_variable(Variable::numeric("LAUNCH_LATITUDE", &[], vec![Some(12.0)]))
        .with_variable(Variable::numeric("LAUNCH_LONGITUDE", &[], vec![Some(65.0)]))
}

/// One cast for [`profile_archive`].
#[derive(Clone)]
pub struct Cast {
    pub cycle: Option<f64>,
    pub juld: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// `(pressure, temperature, salinity)` per level.
    pub levels: Vec<(Option<f64>, Option<f64>, Option<f64>)>,
}

impl Cast {
    pub fn new(cycle: f64, latitude: f64, longitude: f64) -> Self {
        Self {
            cycle: Some(cycle),
            juld: Some(JAN_15_2024),
            latitude: Some(latitude),
            longitude: Some(longitude),
            levels: vec![
                (Some(5.0), Some(28.0), Some(36.1)),
                (Some(50.0), Some(27.5), Some(36.2)),
                (Some(100.0), Some(20.0), Some(35.4)),
                (Some(200.0), Some(14.0), Some(35.1)),
            ],
        }
    }
}

/// A multi-profile archive; shorter casts are padded with masked levels.
pub fn profile_archive(casts: &[Cast]) -> MemoryArchive {
    let n = casts.len();
    let width = casts.iter().map(|c| c.levels.len()).max().unwrap_or(0);
    let mut pres = Vec::with_capacity(n * width);
    let mut temp = Vec::with_capacity(n * width);
    let mut psal = Vec::with_capacity(n * width);
    for cast in casts {
        for j in 0..width {
            let (p, t, s) = cast.levels.get(j).copied().unwrap_or((None, None, None));
            pres.push(p);
            temp.push(t);
            psal.push(s);
        }
    }

    MemoryArchive::new()
        .with_variable(
            Variable::numeric("JULD", &[n], casts.iter().map(|c| c.juld).collect())
                .with_units(JULD_UNITS),
        )
        .with_variable(Variable::numeric("LATITUDE", &[n], casts.iter().map(|c| c.latitude).collect()))
        .with_variable(Variable::numeric("LONGITUDE", &[n], casts.iter().map(|c| c.longitude).collect()))
        .with_variable(Variable::numeric("CYCLE_NUMBER", &[n], casts.iter().map(|c| c.cycle).collect()))
        .with_variable(Variable::numeric("PRES", &[n, width], pres))
        .with_variable(Variable::numeric("TEMP", &[n, width], temp))
        .with_variable(Variable::numeric("PSAL", &[n, width], psal))
}

/// Register a float's two archives and return its source.
pub fn add_float(
    opener: &mut MapOpener,
    platform_id: i64,
    float_type: FloatType,
    meta: MemoryArchive,
    profiles: MemoryArchive,
) -> FloatSource {
    let dir = PathBuf::from("/archives").join(platform_id.to_string());
    let suffix = match float_type {
        FloatType::Bgc => "Sprof",
        FloatType::Core => "prof",
    };
    let source = FloatSource {
        platform_id,
        meta_path: dir.join(format!("{}_meta.nc", platform_id)),
        profile_path: dir.join(format!("{}_{}.nc", platform_id, suffix)),
        float_type,
    };
    opener.insert(&source.meta_path, meta);
    opener.insert(&source.profile_path, profiles);
    source
}

/// A fresh database with the schema applied.
pub async fn test_pool() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let pool = argo_harness::db::connect_path(&tmp.path().join("data/argo.sqlite"))
        .await
        .unwrap();
    argo_harness::migrate::apply_schema(&pool).await.unwrap();
    (tmp, pool)
}

pub async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}
