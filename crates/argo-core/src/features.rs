//! Oceanographic feature engine.
//!
//! Derives per-profile summary metrics from the measurement series.
//! Every metric is an `Option<f64>`: `None` when its prerequisite data is
//! absent, never a fabricated number. `0.0` is an ordinary value.
//!
//! | Metric | Input | Rule |
//! |--------|-------|------|
//! | `max_pressure` | (pressure, temperature) pairs | max pressure |
//! | `sea_surface_temp` | (pressure, temperature) pairs | mean temperature where pressure ≤ 10 dbar |
//! | `thermocline_depth` | ≥ 3 (pressure, temperature) pairs | pressure at the steepest temperature drop |
//! | `mean_salinity` | salinity samples | mean |
//! | `mean_oxygen` | dissolved oxygen samples | mean |

use std::fmt;

use chrono::Datelike;
use serde::Serialize;

/// Upper pressure bound (dbar) of the surface layer.
pub const SURFACE_LAYER_DBAR: f64 = 10.0;

/// Minimum number of (pressure, temperature) pairs for a thermocline.
pub const MIN_THERMOCLINE_SAMPLES: usize = 3;

/// Parallel per-level series of one profile. Missing values are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSeries {
    pub pressures: Vec<Option<f64>>,
    pub temperatures: Vec<Option<f64>>,
    pub salinities: Vec<Option<f64>>,
    pub oxygen: Vec<Option<f64>>,
}

impl ProfileSeries {
    pub fn push(
        &mut self,
        pressure: Option<f64>,
        temperature: Option<f64>,
        salinity: Option<f64>,
        oxygen: Option<f64>,
    ) {
        self.pressures.push(pressure);
        self.temperatures.push(temperature);
        self.salinities.push(salinity);
        self.oxygen.push(oxygen);
    }
}

/// Summary metrics of one profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub max_pressure: Option<f64>,
    pub sea_surface_temp: Option<f64>,
    pub thermocline_depth: Option<f64>,
    pub mean_salinity: Option<f64>,
    pub mean_oxygen: Option<f64>,
}

/// Keep the positions where both series have a value.
///
/// Pairing is per property: missingness of temperature and salinity is
/// independent, so each pairing yields its own subset of levels.
pub fn pair_present(a: &[Option<f64>], b: &[Option<f64>]) -> (Vec<f64>, Vec<f64>) {
    a.iter()
        .zip(b.iter())
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        })
        .unzip()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Discrete derivative of `values` with respect to `coords`.
///
/// Second-order central differences on the (possibly non-uniform)
/// interior points and first-order one-sided differences at both ends.
/// Coincident coordinates produce non-finite entries.
pub fn gradient(values: &[f64], coords: &[f64]) -> Vec<f64> {
    let n = values.len().min(coords.len());
    if n < 2 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(n);
    out.push((values[1] - values[0]) / (coords[1] - coords[0]));
    for i in 1..n - 1 {
        let dx1 = coords[i] - coords[i - 1];
        let dx2 = coords[i + 1] - coords[i];
        let a = -dx2 / (dx1 * (dx1 + dx2));
        let b = (dx2 - dx1) / (dx1 * dx2);
        let c = dx1 / (dx2 * (dx1 + dx2));
        out.push(a * values[i - 1] + b * values[i] + c * values[i + 1]);
    }
    out.push((values[n - 1] - values[n - 2]) / (coords[n - 1] - coords[n - 2]));
    out
}

fn thermocline_depth(pressures: &[f64], temps: &[f64]) -> Option<f64> {
    if pressures.len() < MIN_THERMOCLINE_SAMPLES {
        return None;
    }
    let mut pairs: Vec<(f64, f64)> = pressures.iter().copied().zip(temps.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (sorted_p, sorted_t): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();

    let mut steepest: Option<(usize, f64)> = None;
    for (i, g) in gradient(&sorted_t, &sorted_p).into_iter().enumerate() {
        if !g.is_finite() {
            continue;
        }
        if steepest.map_or(true, |(_, best)| g < best) {
            steepest = Some((i, g));
        }
    }
    steepest.map(|(i, _)| sorted_p[i])
}

/// Compute every derived metric of a profile.
pub fn derive_metrics(series: &ProfileSeries) -> DerivedMetrics {
    let (pressures, temps) = pair_present(&series.pressures, &series.temperatures);

    let max_pressure = pressures.iter().copied().reduce(f64::max);
    let sea_surface_temp = mean(
        pressures
            .iter()
            .zip(temps.iter())
            .filter(|(p, _)| **p <= SURFACE_LAYER_DBAR)
            .map(|(_, t)| *t),
    );

    DerivedMetrics {
        max_pressure,
        sea_surface_temp,
        thermocline_depth: thermocline_depth(&pressures, &temps),
        mean_salinity: mean(series.salinities.iter().flatten().copied().filter(|v| v.is_finite())),
        mean_oxygen: mean(series.oxygen.iter().flatten().copied().filter(|v| v.is_finite())),
    }
}

/// Meteorological season, Northern-Hemisphere convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Autumn,
        }
    }

    pub fn of<D: Datelike>(date: &D) -> Self {
        Self::from_month(date.month())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Autumn => "Autumn",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(pairs: &[(f64, f64)]) -> ProfileSeries {
        let mut s = ProfileSeries::default();
        for &(p, t) in pairs {
            s.push(Some(p), Some(t), None, None);
        }
        s
    }

    #[test]
    fn thermocline_needs_three_pairs() {
        let m = derive_metrics(&series(&[(5.0, 20.0), (15.0, 18.0)]));
        assert_eq!(m.thermocline_depth, None);
        assert_eq!(m.max_pressure, Some(15.0));
    }

    #[test]
    fn sea_surface_temp_excludes_deep_samples() {
        let m = derive_metrics(&series(&[(2.0, 28.0), (5.0, 27.0), (50.0, 10.0)]));
        assert_eq!(m.sea_surface_temp, Some(27.5));
    }

    #[test]
    fn sea_surface_temp_of_zero_is_a_value() {
        let m = derive_metrics(&series(&[(1.0, 0.0), (4.0, 0.0)]));
        assert_eq!(m.sea_surface_temp, Some(0.0));
    }

    #[test]
    fn sea_surface_temp_missing_without_shallow_samples() {
        let m = derive_metrics(&series(&[(20.0, 15.0), (40.0, 12.0)]));
        assert_eq!(m.sea_surface_temp, None);
    }

    #[test]
    fn thermocline_at_steepest_drop() {
        let m = derive_metrics(&series(&[
            (40.0, 8.5),
            (0.0, 20.0),
            (20.0, 10.0),
            (10.0, 20.0),
            (30.0, 9.0),
        ]));
        assert_eq!(m.thermocline_depth, Some(20.0));
    }

    #[test]
    fn thermocline_ignores_duplicate_pressure_blowups() {
        let m = derive_metrics(&series(&[(10.0, 20.0), (10.0, 19.0), (30.0, 10.0)]));
        assert!(m.thermocline_depth.is_some());
    }

    #[test]
    fn pairing_is_per_property() {
        let s = ProfileSeries {
            pressures: vec![Some(1.0), Some(2.0), Some(3.0)],
            temperatures: vec![Some(20.0), None, Some(18.0)],
            salinities: vec![None, Some(35.0), Some(36.0)],
            oxygen: vec![None, None, None],
        };
        let m = derive_metrics(&s);
        assert_eq!(m.max_pressure, Some(3.0));
        assert_eq!(m.mean_salinity, Some(35.5));
        assert_eq!(m.mean_oxygen, None);
    }

    #[test]
    fn empty_profile_has_no_metrics() {
        assert_eq!(derive_metrics(&ProfileSeries::default()), DerivedMetrics::default());
    }

    #[test]
    fn gradient_matches_uniform_central_differences() {
        let g = gradient(&[0.0, 1.0, 4.0, 9.0], &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(g, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn gradient_non_uniform_spacing_is_exact_for_quadratics() {
        let x = [0.0, 1.0, 3.0];
        let y: Vec<f64> = x.iter().map(|v| v * v).collect();
        let g = gradient(&y, &x);
        assert!((g[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn seasons() {
        let winter = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let summer = NaiveDate::from_ymd_opt(2025, 7, 4).unwrap();
        assert_eq!(Season::of(&winter), Season::Winter);
        assert_eq!(Season::of(&summer).to_string(), "Summer");
        assert_eq!(Season::from_month(12), Season::Winter);
        assert_eq!(Season::from_month(4), Season::Spring);
        assert_eq!(Season::from_month(10), Season::Autumn);
    }
}
