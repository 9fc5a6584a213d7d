//! Database statistics.
//!
//! `argo stats` prints row counts for every table plus index coverage, so
//! a user can check that ingest and index runs did what they expected.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::migrate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub floats: i64,
    pub bgc_floats: i64,
    pub profiles: i64,
    pub measurements: i64,
    pub documents: i64,
    pub embedded: i64,
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

pub async fn collect_counts(pool: &SqlitePool) -> Result<Counts> {
    Ok(Counts {
        floats: count(pool, "SELECT COUNT(*) FROM floats").await?,
        bgc_floats: count(pool, "SELECT COUNT(*) FROM floats WHERE float_type = 'BGC'").await?,
        profiles: count(pool, "SELECT COUNT(*) FROM profiles").await?,
        measurements: count(pool, "SELECT COUNT(*) FROM measurements").await?,
        documents: count(pool, "SELECT COUNT(*) FROM index_documents").await?,
        embedded: count(
            pool,
            "SELECT COUNT(*) FROM index_documents WHERE embedding IS NOT NULL",
        )
        .await?,
    })
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;
    let counts = collect_counts(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Argo Harness — Database Stats");
    println!("=============================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Floats:        {} ({} BGC)", counts.floats, counts.bgc_floats);
    println!("  Profiles:      {}", counts.profiles);
    println!("  Measurements:  {}", counts.measurements);
    println!(
        "  Indexed:       {} / {} ({}%)",
        counts.documents,
        counts.profiles,
        percent(counts.documents, counts.profiles)
    );
    println!(
        "  Embedded:      {} / {} ({}%)",
        counts.embedded,
        counts.documents,
        percent(counts.embedded, counts.documents)
    );
    println!();

    pool.close().await;
    Ok(())
}

fn percent(part: i64, whole: i64) -> i64 {
    if whole > 0 {
        (part * 100) / whole
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanised() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn percent_handles_empty_tables() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(1, 4), 25);
    }
}
