//! Transactional per-float persistence.
//!
//! A [`FloatWriter`] owns one SQLite transaction. All writes for a float go
//! through it and become visible together on [`FloatWriter::commit`].
//! Dropping the writer without committing (an early return or `?`) rolls
//! the whole float back.
//!
//! Writes are idempotent: floats and profiles are insert-if-absent on their
//! natural keys, and measurement rows are only written for a profile row
//! this writer just created.

use argo_core::assemble::{FloatRecord, MeasurementRecord, ProfileRecord};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER`.
const BIND_LIMIT: usize = 32766;
const MEASUREMENT_COLUMNS: usize = 9;
/// Rows per multi-row `INSERT`.
pub const MEASUREMENT_CHUNK: usize = BIND_LIMIT / MEASUREMENT_COLUMNS;

pub struct FloatWriter {
    tx: Transaction<'static, Sqlite>,
}

impl FloatWriter {
    pub async fn begin(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        Ok(Self {
            tx: pool.begin().await?,
        })
    }

    /// Insert the float if its platform id is new.
    ///
    /// Returns `true` when the float already existed; the stored row is
    /// left untouched.
    pub async fn upsert_float(&mut self, float: &FloatRecord) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO floats (platform_id, project_name, launch_date, launch_latitude, launch_longitude, float_type)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(platform_id) DO NOTHING
            "#,
        )
        .bind(float.platform_id)
        .bind(&float.project_name)
        .bind(float.launch_date)
        .bind(float.launch_latitude)
        .bind(float.launch_longitude)
        .bind(float.float_type.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 0)
    }

    /// Insert a profile unless `(platform_id, cycle_number)` already exists.
    ///
    /// Returns the new profile id, or `None` for an existing profile.
    pub async fn insert_profile_if_absent(
        &mut self,
        platform_id: i64,
        profile: &ProfileRecord,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO profiles (platform_id, cycle_number, profile_date, latitude, longitude, location)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(platform_id, cycle_number) DO NOTHING
            RETURNING profile_id
            "#,
        )
        .bind(platform_id)
        .bind(profile.cycle_number)
        .bind(profile.profile_date)
        .bind(profile.latitude)
        .bind(profile.longitude)
        .bind(wkt_point(profile.longitude, profile.latitude))
        .fetch_optional(&mut *self.tx)
        .await
    }

    /// Insert all measurement rows of one profile.
    ///
    /// One multi-row `INSERT`, split only when the rows would exceed the
    /// bind-parameter ceiling.
    pub async fn bulk_insert_measurements(
        &mut self,
        profile_id: i64,
        rows: &[MeasurementRecord],
    ) -> Result<u64, sqlx::Error> {
        let mut written = 0;
        for chunk in rows.chunks(MEASUREMENT_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO measurements (profile_id, pressure, temperature, salinity, doxy, chla, nitrate, ph_in_situ_total, bbp700) ",
            );
            qb.push_values(chunk, |mut b, m| {
                b.push_bind(profile_id)
                    .push_bind(m.pressure)
                    .push_bind(m.temperature)
                    .push_bind(m.salinity)
                    .push_bind(m.doxy)
                    .push_bind(m.chla)
                    .push_bind(m.nitrate)
                    .push_bind(m.ph_in_situ_total)
                    .push_bind(m.bbp700);
            });
            written += qb.build().execute(&mut *self.tx).await?.rows_affected();
        }
        Ok(written)
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}

/// WKT point, longitude first.
pub fn wkt_point(longitude: f64, latitude: f64) -> String {
    format!("POINT({} {})", longitude, latitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wkt_is_lon_lat() {
        assert_eq!(wkt_point(70.5, -10.25), "POINT(70.5 -10.25)");
    }

    #[test]
    fn chunk_stays_under_bind_limit() {
        assert!(MEASUREMENT_CHUNK * MEASUREMENT_COLUMNS <= BIND_LIMIT);
        assert!(MEASUREMENT_CHUNK > 3000);
    }
}
