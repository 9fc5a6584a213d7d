//! Reverse geocoding of profile positions.
//!
//! The index run owns one [`GeocodeCache`]. Positions are bucketed to
//! 0.1° so neighbouring profiles share a lookup, and every outcome is
//! cached, failures included: a position that failed once is not retried
//! in the same run.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::GeocodingConfig;

/// Place name used when the geocoder knows nothing about a position.
pub const OPEN_OCEAN: &str = "Open Ocean";

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Full display name for a position, `None` when there is no result.
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<String>>;
}

/// Nominatim `/reverse` client.
///
/// Calls are spaced at least `min_interval` apart, as the public
/// instance's usage policy requires.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    url: String,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            min_interval: Duration::from_millis(config.min_interval_ms),
            last_call: Mutex::new(None),
        })
    }

    async fn throttle(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<String>> {
        self.throttle().await;

        let response = self
            .client
            .get(format!("{}/reverse", self.url))
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("accept-language", "en".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Nominatim error {}: {}", status, body);
        }

        let json: serde_json::Value = response.json().await?;
        Ok(parse_nominatim_response(&json))
    }
}

/// `display_name` of a reverse response; `None` for Nominatim's
/// `{"error": "Unable to geocode"}` answer over open water.
fn parse_nominatim_response(json: &serde_json::Value) -> Option<String> {
    json.get("display_name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First comma-separated component of a display name.
pub fn short_place_name(display_name: &str) -> String {
    display_name
        .split(',')
        .next()
        .unwrap_or(display_name)
        .trim()
        .to_string()
}

fn bucket(latitude: f64, longitude: f64) -> (i64, i64) {
    ((latitude * 10.0).round() as i64, (longitude * 10.0).round() as i64)
}

/// Run-scoped lookup cache in front of an optional [`Geocoder`].
pub struct GeocodeCache {
    geocoder: Option<Box<dyn Geocoder>>,
    /// `None` marks a lookup that failed.
    entries: HashMap<(i64, i64), Option<String>>,
    calls: u64,
}

impl GeocodeCache {
    pub fn new(geocoder: Box<dyn Geocoder>) -> Self {
        Self {
            geocoder: Some(geocoder),
            entries: HashMap::new(),
            calls: 0,
        }
    }

    /// A cache that never looks anything up.
    pub fn disabled() -> Self {
        Self {
            geocoder: None,
            entries: HashMap::new(),
            calls: 0,
        }
    }

    pub fn from_config(config: &GeocodingConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        Ok(Self::new(Box::new(NominatimGeocoder::new(config)?)))
    }

    /// Number of geocoder calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Short place name for a position.
    ///
    /// `None` when geocoding is disabled or the lookup for this bucket
    /// failed; [`OPEN_OCEAN`] when the geocoder had no result.
    pub async fn place_name(&mut self, latitude: f64, longitude: f64) -> Option<String> {
        let geocoder = self.geocoder.as_ref()?;
        let key = bucket(latitude, longitude);
        if let Some(cached) = self.entries.get(&key) {
            return cached.clone();
        }

        self.calls += 1;
        let place = match geocoder.reverse(latitude, longitude).await {
            Ok(Some(display)) => Some(short_place_name(&display)),
            Ok(None) => Some(OPEN_OCEAN.to_string()),
            Err(e) => {
                tracing::warn!(latitude, longitude, error = %e, "reverse geocoding failed");
                None
            }
        };
        self.entries.insert(key, place.clone());
        place
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    struct Scripted {
        calls: Arc<AtomicU64>,
        answer: fn(f64) -> Result<Option<String>>,
    }

    #[async_trait]
    impl Geocoder for Scripted {
        async fn reverse(&self, latitude: f64, _longitude: f64) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.answer)(latitude)
        }
    }

    fn cache(answer: fn(f64) -> Result<Option<String>>) -> (GeocodeCache, Arc<AtomicU64>) {
        let calls = Arc::new(AtomicU64::new(0));
        let geocoder = Scripted {
            calls: calls.clone(),
            answer,
        };
        (GeocodeCache::new(Box::new(geocoder)), calls)
    }

    #[tokio::test]
    async fn nearby_positions_share_a_lookup() {
        let (mut cache, calls) = cache(|_| Ok(Some("Arabian Sea, Indian Ocean".into())));
        assert_eq!(cache.place_name(12.31, 65.02).await.as_deref(), Some("Arabian Sea"));
        assert_eq!(cache.place_name(12.34, 64.98).await.as_deref(), Some("Arabian Sea"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        cache.place_name(13.0, 65.0).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_result_is_open_ocean() {
        let (mut cache, _) = cache(|_| Ok(None));
        assert_eq!(cache.place_name(-40.0, -120.0).await.as_deref(), Some(OPEN_OCEAN));
    }

    #[tokio::test]
    async fn failures_are_cached_not_retried() {
        let (mut cache, calls) = cache(|_| bail!("timeout"));
        assert_eq!(cache.place_name(1.0, 2.0).await, None);
        assert_eq!(cache.place_name(1.0, 2.0).await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.calls(), 1);
    }

    #[tokio::test]
    async fn disabled_cache_returns_nothing() {
        let mut cache = GeocodeCache::disabled();
        assert_eq!(cache.place_name(1.0, 2.0).await, None);
        assert_eq!(cache.calls(), 0);
    }

    #[test]
    fn parses_display_name_or_error() {
        let ok = serde_json::json!({"display_name": "Laccadive Sea, India"});
        assert_eq!(parse_nominatim_response(&ok).as_deref(), Some("Laccadive Sea, India"));
        let err = serde_json::json!({"error": "Unable to geocode"});
        assert_eq!(parse_nominatim_response(&err), None);
    }
}
