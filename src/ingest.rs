//! Ingestion pipeline orchestration.
//!
//! Coordinates the full ingest flow: float discovery → archive reading →
//! profile assembly → transactional write. Floats are processed one after
//! another; a failing float is rolled back and reported, the run goes on.
//! Only connection-level database failures stop the run.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use argo_core::archive::ArchiveError;
use argo_core::assemble::{assemble_float, assemble_profiles, AssembledProfiles, FloatRecord, FloatType};
use sqlx::SqlitePool;
use walkdir::WalkDir;

use crate::config::{Config, IngestConfig};
use crate::db;
use crate::error::IngestError;
use crate::migrate;
use crate::netcdf_archive::ArchiveOpener;
use crate::progress::{ProgressEvent, ProgressMode, ProgressReporter};
use crate::writer::FloatWriter;

/// The archive files of one float directory.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatSource {
    pub platform_id: i64,
    pub meta_path: PathBuf,
    pub profile_path: PathBuf,
    pub float_type: FloatType,
}

/// A float directory that could not be ingested at all.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverySkip {
    pub platform_id: i64,
    pub reason: String,
}

/// Synthetic BGC archives carry `Sprof` in their suffix.
fn float_type_for_suffix(suffix: &str) -> FloatType {
    if suffix.contains("Sprof") {
        FloatType::Bgc
    } else {
        FloatType::Core
    }
}

/// Platform id of a float directory: the name must be all ASCII digits.
fn platform_id_from_dir(name: &str) -> Option<i64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Find float directories directly under `root`.
///
/// Directory names that are not all digits are ignored. A float without a
/// metadata archive, or without any profile archive, is skipped and
/// reported. Results are ordered by platform id.
pub fn discover_floats(
    root: &Path,
    cfg: &IngestConfig,
) -> Result<(Vec<FloatSource>, Vec<DiscoverySkip>)> {
    if !root.is_dir() {
        bail!("Archive root is not a directory: {}", root.display());
    }

    let mut sources = Vec::new();
    let mut skipped = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to scan {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(platform_id) = platform_id_from_dir(&name) else {
            tracing::debug!(dir = %name, "ignoring non-float directory");
            continue;
        };
        let dir = entry.path();

        let meta_path = dir.join(format!("{}{}", name, cfg.meta_suffix));
        if !meta_path.is_file() {
            skipped.push(DiscoverySkip {
                platform_id,
                reason: format!("missing metadata archive {}", meta_path.display()),
            });
            continue;
        }

        let profile = cfg.profile_suffixes.iter().find_map(|suffix| {
            let path = dir.join(format!("{}{}", name, suffix));
            path.is_file().then(|| (path, float_type_for_suffix(suffix)))
        });
        let Some((profile_path, float_type)) = profile else {
            skipped.push(DiscoverySkip {
                platform_id,
                reason: format!(
                    "no profile archive (looked for {})",
                    cfg.profile_suffixes.join(", ")
                ),
            });
            continue;
        };

        sources.push(FloatSource {
            platform_id,
            meta_path,
            profile_path,
            float_type,
        });
    }

    sources.sort_by_key(|s| s.platform_id);
    skipped.sort_by_key(|s| s.platform_id);
    Ok((sources, skipped))
}

/// A float read from its archives, ready to write.
#[derive(Debug, Clone)]
pub struct LoadedFloat {
    pub float: FloatRecord,
    pub profiles: AssembledProfiles,
}

/// Read and assemble both archives of a float.
///
/// Synchronous: archive handles are opened and closed here and never held
/// across an await.
pub fn load_float(opener: &dyn ArchiveOpener, source: &FloatSource) -> Result<LoadedFloat, ArchiveError> {
    let meta = opener.open(&source.meta_path)?;
    let float = assemble_float(source.platform_id, meta.as_ref(), source.float_type)?;
    drop(meta);

    let prof = opener.open(&source.profile_path)?;
    let profiles = assemble_profiles(prof.as_ref())?;
    Ok(LoadedFloat { float, profiles })
}

/// Row counts written for one float.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FloatOutcome {
    pub float_existed: bool,
    pub profiles_inserted: u64,
    pub profiles_existing: u64,
    pub measurements_inserted: u64,
}

/// Write one float in a single transaction.
///
/// Measurements are only inserted for profiles created by this call, so
/// re-ingesting a float adds no rows.
pub async fn write_float(pool: &SqlitePool, loaded: &LoadedFloat) -> Result<FloatOutcome, IngestError> {
    let platform_id = loaded.float.platform_id;
    let mut writer = FloatWriter::begin(pool).await?;
    let mut outcome = FloatOutcome {
        float_existed: writer.upsert_float(&loaded.float).await?,
        ..Default::default()
    };

    for profile in &loaded.profiles.profiles {
        match writer.insert_profile_if_absent(platform_id, profile).await? {
            Some(profile_id) => {
                outcome.profiles_inserted += 1;
                outcome.measurements_inserted += writer
                    .bulk_insert_measurements(profile_id, &profile.measurements)
                    .await?;
            }
            None => outcome.profiles_existing += 1,
        }
    }

    writer.commit().await?;
    Ok(outcome)
}

/// Totals of an ingest run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub floats_found: u64,
    pub floats_new: u64,
    pub floats_existing: u64,
    pub floats_failed: u64,
    pub floats_skipped: u64,
    pub profiles_inserted: u64,
    pub profiles_existing: u64,
    pub profiles_skipped: u64,
    pub measurements_inserted: u64,
}

/// Ingest `sources` one float at a time.
///
/// Errors on a single float are logged and counted. A fatal database
/// error returns immediately; floats committed before it stay.
pub async fn ingest_all(
    pool: &SqlitePool,
    opener: &dyn ArchiveOpener,
    sources: &[FloatSource],
    reporter: &dyn ProgressReporter,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary {
        floats_found: sources.len() as u64,
        ..Default::default()
    };
    let total = sources.len() as u64;

    for (n, source) in sources.iter().enumerate() {
        let platform_id = source.platform_id;

        let loaded = match load_float(opener, source) {
            Ok(loaded) => loaded,
            Err(e) => {
                let e = IngestError::from(e);
                if e.is_identity() {
                    tracing::error!(platform_id, error = %e, "platform number does not match directory; float rejected");
                } else {
                    tracing::error!(platform_id, error = %e, "failed to read float archives");
                }
                summary.floats_failed += 1;
                continue;
            }
        };

        if let Some(units) = &loaded.profiles.unparsed_time_units {
            tracing::warn!(platform_id, units = %units, "unrecognised JULD units; profile dates left empty");
        }
        for skip in &loaded.profiles.skipped {
            tracing::warn!(platform_id, profile_index = skip.index, reason = skip.reason, "skipping profile");
        }
        summary.profiles_skipped += loaded.profiles.skipped.len() as u64;

        match write_float(pool, &loaded).await {
            Ok(outcome) => {
                if outcome.float_existed {
                    summary.floats_existing += 1;
                } else {
                    summary.floats_new += 1;
                }
                summary.profiles_inserted += outcome.profiles_inserted;
                summary.profiles_existing += outcome.profiles_existing;
                summary.measurements_inserted += outcome.measurements_inserted;
                tracing::info!(
                    platform_id,
                    profiles = outcome.profiles_inserted,
                    measurements = outcome.measurements_inserted,
                    "float ingested"
                );
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(platform_id, error = %e, "database unavailable; stopping");
                return Err(e).with_context(|| format!("ingest stopped at float {}", platform_id));
            }
            Err(e) => {
                tracing::error!(platform_id, error = %e, "float rolled back");
                summary.floats_failed += 1;
            }
        }

        reporter.report(ProgressEvent::Ingesting {
            platform_id,
            n: n as u64 + 1,
            total,
        });
    }

    Ok(summary)
}

#[cfg(feature = "netcdf")]
fn default_opener() -> Result<Box<dyn ArchiveOpener>> {
    Ok(Box::new(crate::netcdf_archive::NetcdfOpener))
}

#[cfg(not(feature = "netcdf"))]
fn default_opener() -> Result<Box<dyn ArchiveOpener>> {
    bail!("argo was built without NetCDF support; rebuild with --features netcdf")
}

pub async fn run_ingest(
    config: &Config,
    root: &Path,
    limit: Option<usize>,
    progress: ProgressMode,
) -> Result<()> {
    let opener = default_opener()?;
    let reporter = progress.reporter();

    reporter.report(ProgressEvent::Discovering {
        root: root.display().to_string(),
    });
    let (mut sources, skipped) = discover_floats(root, &config.ingest)?;
    for skip in &skipped {
        tracing::warn!(platform_id = skip.platform_id, reason = %skip.reason, "skipping float");
    }
    if let Some(lim) = limit {
        sources.truncate(lim);
    }

    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let mut summary = ingest_all(&pool, opener.as_ref(), &sources, reporter.as_ref()).await?;
    summary.floats_skipped = skipped.len() as u64;

    println!("ingest {}", root.display());
    println!("  floats found: {}", summary.floats_found);
    println!("  floats new: {}", summary.floats_new);
    println!("  floats already present: {}", summary.floats_existing);
    println!("  floats skipped: {}", summary.floats_skipped);
    println!("  floats failed: {}", summary.floats_failed);
    println!("  profiles inserted: {}", summary.profiles_inserted);
    println!("  profiles already present: {}", summary.profiles_existing);
    println!("  profiles skipped: {}", summary.profiles_skipped);
    println!("  measurements inserted: {}", summary.measurements_inserted);
    println!("ok");

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn discovery_prefers_sprof_and_reports_gaps() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        let a = root.join("1000");
        std::fs::create_dir(&a).unwrap();
        touch(&a.join("1000_meta.nc"));
        touch(&a.join("1000_Sprof.nc"));
        touch(&a.join("1000_prof.nc"));

        let b = root.join("2000");
        std::fs::create_dir(&b).unwrap();
        touch(&b.join("2000_meta.nc"));
        touch(&b.join("2000_prof.nc"));

        let c = root.join("3000");
        std::fs::create_dir(&c).unwrap();
        touch(&c.join("3000_Sprof.nc"));

        let d = root.join("4000");
        std::fs::create_dir(&d).unwrap();
        touch(&d.join("4000_meta.nc"));

        std::fs::create_dir(root.join("notes")).unwrap();

        let (sources, skipped) = discover_floats(root, &IngestConfig::default()).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].platform_id, 1000);
        assert_eq!(sources[0].float_type, FloatType::Bgc);
        assert!(sources[0].profile_path.ends_with("1000_Sprof.nc"));
        assert_eq!(sources[1].float_type, FloatType::Core);

        let ids: Vec<i64> = skipped.iter().map(|s| s.platform_id).collect();
        assert_eq!(ids, vec![3000, 4000]);
        assert!(skipped[0].reason.contains("metadata"));
        assert!(skipped[1].reason.contains("no profile archive"));
    }

    #[test]
    fn signed_directory_names_are_not_floats() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for name in ["+123", "-5", "4200"] {
            let dir = root.join(name);
            std::fs::create_dir(&dir).unwrap();
            touch(&dir.join(format!("{}_meta.nc", name)));
            touch(&dir.join(format!("{}_prof.nc", name)));
        }

        let (sources, skipped) = discover_floats(root, &IngestConfig::default()).unwrap();
        let ids: Vec<i64> = sources.iter().map(|s| s.platform_id).collect();
        assert_eq!(ids, vec![4200]);
        assert!(skipped.is_empty());
        assert_eq!(platform_id_from_dir(""), None);
        assert_eq!(platform_id_from_dir("007"), Some(7));
    }

    #[test]
    fn discovery_rejects_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_floats(&tmp.path().join("absent"), &IngestConfig::default()).is_err());
    }
}
