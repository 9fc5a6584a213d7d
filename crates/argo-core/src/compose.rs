//! Index document composer.
//!
//! Renders one profile plus its [`DerivedMetrics`] into an
//! [`IndexDocument`]: a deterministic natural-language summary for
//! embedding and a flat metadata map for filtering.
//!
//! Absent metrics are left out of the summary. In the metadata map they
//! become [`MISSING_VALUE`]; this is the only place the pipeline turns an
//! `Option` into a sentinel.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::features::{DerivedMetrics, Season};

/// Out-of-band value for a missing numeric metadata field.
///
/// Below every physical range it substitutes for: pressure and depth are
/// non-negative, sea water stays above -3 °C, salinity and oxygen are
/// non-negative.
pub const MISSING_VALUE: f64 = -999.0;

/// Integer counterpart of [`MISSING_VALUE`] for date parts.
pub const MISSING_INT: i64 = -999;

/// Identifying context of a profile, as stored in the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileContext {
    pub profile_id: i64,
    pub platform_id: i64,
    pub cycle_number: i32,
    pub profile_date: Option<DateTime<Utc>>,
    pub latitude: f64,
    pub longitude: f64,
    pub float_type: Option<String>,
    /// Short place name from reverse geocoding, when enabled.
    pub place_name: Option<String>,
}

/// A document ready for the index store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDocument {
    pub id: String,
    pub document: String,
    pub metadata: Map<String, Value>,
}

impl IndexDocument {
    /// SHA-256 over the document text and its metadata.
    ///
    /// Used to tell whether a stored embedding still describes the
    /// document.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.document.as_bytes());
        hasher.update([0u8]);
        hasher.update(Value::Object(self.metadata.clone()).to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

fn float_type_description(float_type: Option<&str>) -> &'static str {
    match float_type {
        Some("BGC") => "Biogeochemical",
        _ => "core",
    }
}

/// Build the natural-language summary.
pub fn compose_summary(ctx: &ProfileContext, metrics: &DerivedMetrics) -> String {
    let mut parts = vec![format!(
        "An oceanographic profile from a {} Argo float (ID {}).",
        float_type_description(ctx.float_type.as_deref()),
        ctx.platform_id
    )];

    match ctx.profile_date {
        Some(date) => parts.push(format!(
            "Data collected on {} during cycle {} in the {}.",
            date.format("%Y-%m-%d"),
            ctx.cycle_number,
            Season::of(&date)
        )),
        None => parts.push(format!(
            "Data collected during cycle {}; the observation date is unknown.",
            ctx.cycle_number
        )),
    }

    match &ctx.place_name {
        Some(place) => parts.push(format!(
            "Location: latitude {:.3}, longitude {:.3}, near {}.",
            ctx.latitude, ctx.longitude, place
        )),
        None => parts.push(format!(
            "Location: latitude {:.3}, longitude {:.3}.",
            ctx.latitude, ctx.longitude
        )),
    }

    if let Some(p) = metrics.max_pressure {
        parts.push(format!(
            "The profile extends to a maximum pressure of {:.1} dbar.",
            p
        ));
    }
    if let Some(t) = metrics.sea_surface_temp {
        parts.push(format!("Sea surface temperature was {:.2}°C.", t));
    }
    if let Some(d) = metrics.thermocline_depth {
        parts.push(format!(
            "A distinct thermocline was detected near {:.1} dbar.",
            d
        ));
    }
    if let Some(s) = metrics.mean_salinity {
        parts.push(format!("The average salinity was {:.2} PSU.", s));
    }
    if let Some(o) = metrics.mean_oxygen {
        parts.push(format!(
            "The average dissolved oxygen was {:.1} µmol/kg.",
            o
        ));
    }

    parts.join(" ")
}

fn or_missing(value: Option<f64>) -> Value {
    Value::from(value.unwrap_or(MISSING_VALUE))
}

/// Build the flat metadata map.
pub fn compose_metadata(ctx: &ProfileContext, metrics: &DerivedMetrics) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("profile_id".into(), Value::from(ctx.profile_id));
    meta.insert("platform_id".into(), Value::from(ctx.platform_id));
    meta.insert("cycle_number".into(), Value::from(ctx.cycle_number));
    meta.insert(
        "float_type".into(),
        Value::from(ctx.float_type.as_deref().unwrap_or("Unknown")),
    );

    match ctx.profile_date {
        Some(date) => {
            meta.insert("date".into(), Value::from(date.format("%Y-%m-%d").to_string()));
            meta.insert("year".into(), Value::from(date.year()));
            meta.insert("month".into(), Value::from(date.month()));
            meta.insert("season".into(), Value::from(Season::of(&date).as_str()));
        }
        None => {
            meta.insert("date".into(), Value::from("unknown"));
            meta.insert("year".into(), Value::from(MISSING_INT));
            meta.insert("month".into(), Value::from(MISSING_INT));
            meta.insert("season".into(), Value::from("Unknown"));
        }
    }

    meta.insert("lat".into(), Value::from(ctx.latitude));
    meta.insert("lon".into(), Value::from(ctx.longitude));
    meta.insert("max_pressure".into(), or_missing(metrics.max_pressure));
    meta.insert("sea_surface_temp".into(), or_missing(metrics.sea_surface_temp));
    meta.insert("thermocline_depth".into(), or_missing(metrics.thermocline_depth));
    meta.insert("mean_salinity".into(), or_missing(metrics.mean_salinity));
    meta.insert("mean_oxygen".into(), or_missing(metrics.mean_oxygen));
    meta
}

/// Compose the full document, keyed by profile id.
pub fn compose_document(ctx: &ProfileContext, metrics: &DerivedMetrics) -> IndexDocument {
    IndexDocument {
        id: ctx.profile_id.to_string(),
        document: compose_summary(ctx, metrics),
        metadata: compose_metadata(ctx, metrics),
    }
}

/// Fixed-size accumulator for index upserts.
///
/// Holds whole documents only, so a flushed batch never carries half a
/// record. Call [`Batcher::finish`] at the end of a run to get the last
/// partial batch.
#[derive(Debug)]
pub struct Batcher {
    size: usize,
    pending: Vec<IndexDocument>,
}

impl Batcher {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            pending: Vec::with_capacity(size),
        }
    }

    /// Add a document; returns a full batch when the limit is reached.
    pub fn push(&mut self, doc: IndexDocument) -> Option<Vec<IndexDocument>> {
        self.pending.push(doc);
        if self.pending.len() >= self.size {
            Some(std::mem::replace(
                &mut self.pending,
                Vec::with_capacity(self.size),
            ))
        } else {
            None
        }
    }

    /// Take the remaining partial batch, if any.
    pub fn finish(&mut self) -> Option<Vec<IndexDocument>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}
