//! # Moving-object metrics
//!
//! Metrics meant for [`MovingObjectSlicer`](crate::slicers::mo_slicer::MovingObjectSlicer)
//! slices, whose visits are the detections of one object at one H value.
//!
//! * [`ObsArcMetric`] – time span between the first and last detection.
//! * [`ActivityOverTimeMetric`] – fraction of survey time bins holding a detection.
//! * [`ActivityOverPeriodMetric`] – fraction of orbital phase (mean anomaly) bins holding a
//!   detection.
//! * [`LightcurveInversionMetric`] – 1 when enough high-SNR detections span enough time for a
//!   lightcurve inversion, 0 otherwise.
//! * [`ColorDeterminationMetric`] – 1 when two bands observed the object close enough in time
//!   to measure a color, 0 otherwise.
//!
//! The SNR of a detection is derived from its H-scaled magnitude and the visit depth with
//! [`signal_to_noise`].
use crate::{
    constants::{Degree, Days, DPI, RADEG},
    observations::{Filter, Visit},
    skyslice_errors::SkysliceError,
    slicers::{mo_slicer::signal_to_noise, Slice, SlicePoint},
};

use super::{count_in_closed, sorted_times, Metric, MetricValue};

/// Number of histogram bins, defined by ascending `edges`, that receive at least one value.
/// Bins are half-open except the last one, which includes its right edge.
fn occupied_bins(values: impl Iterator<Item = f64>, edges: &[f64]) -> usize {
    if edges.len() < 2 {
        return 0;
    }
    let n_bins = edges.len() - 1;
    let mut occupied = vec![false; n_bins];
    for v in values {
        if v < edges[0] || v > edges[n_bins] {
            continue;
        }
        let idx = (edges.partition_point(|&e| e <= v) - 1).min(n_bins - 1);
        occupied[idx] = true;
    }
    occupied.iter().filter(|&&o| o).count()
}

/// Edges `0, step, 2·step, ...` strictly below `stop`.
fn arange(stop: f64, step: f64) -> Vec<f64> {
    let n = (stop / step - 1e-9).ceil().max(0.0) as usize;
    (0..n).map(|i| i as f64 * step).collect()
}

/// Time between the first and the last detection, in days.
#[derive(Debug, Clone, Default)]
pub struct ObsArcMetric;

impl Metric for ObsArcMetric {
    fn name(&self) -> String {
        "ObsArc".into()
    }

    fn units(&self) -> &str {
        "days"
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        if slice.is_empty() {
            return Ok(None);
        }
        let (min, max) = slice
            .visits
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v.time), hi.max(v.time))
            });
        Ok(Some(MetricValue::Scalar(max - min)))
    }
}

/// Fraction of the survey, cut in bins of `window` nights, during which the object was
/// detected at least once.
#[derive(Debug, Clone)]
pub struct ActivityOverTimeMetric {
    window: Days,
    edges: Vec<f64>,
}

impl ActivityOverTimeMetric {
    /// Arguments
    /// -----------------
    /// * `window`: bin width, in nights.
    /// * `survey_years`: survey duration in years of 365 nights.
    pub fn new(window: Days, survey_years: f64) -> Result<Self, SkysliceError> {
        if !(window > 0.0) || !(survey_years > 0.0) {
            return Err(SkysliceError::InvalidMetricParameter(format!(
                "window ({window}) and survey_years ({survey_years}) must be > 0"
            )));
        }
        Ok(ActivityOverTimeMetric {
            window,
            edges: arange(survey_years * 365.0 + window / 2.0, window),
        })
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }
}

impl Metric for ActivityOverTimeMetric {
    fn name(&self) -> String {
        format!("ActivityOverTime {}", self.window)
    }

    fn units(&self) -> &str {
        "fraction"
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        if slice.is_empty() || self.n_bins() == 0 {
            return Ok(None);
        }
        let hit = occupied_bins(slice.visits.iter().map(|v| v.night as f64), &self.edges);
        Ok(Some(MetricValue::Scalar(hit as f64 / self.n_bins() as f64)))
    }
}

/// Fraction of the orbit, cut in mean-anomaly bins of `bin_size` degrees, during which the
/// object was detected at least once.
///
/// The mean anomaly of every detection is propagated from the orbit's elements with the
/// period `P = 2π a^{3/2} / k`. Objects without elements fail the evaluation.
#[derive(Debug, Clone)]
pub struct ActivityOverPeriodMetric {
    bin_size: Degree,
    edges: Vec<f64>,
}

impl ActivityOverPeriodMetric {
    pub fn new(bin_size: Degree) -> Result<Self, SkysliceError> {
        if !(bin_size > 0.0) || bin_size > 360.0 {
            return Err(SkysliceError::InvalidMetricParameter(format!(
                "bin_size must be in (0, 360] degrees (got {bin_size})"
            )));
        }
        let step = bin_size * RADEG;
        Ok(ActivityOverPeriodMetric {
            bin_size,
            edges: arange(DPI + step / 2.0, step),
        })
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }
}

impl Metric for ActivityOverPeriodMetric {
    fn name(&self) -> String {
        format!("ActivityOverPeriod {}", self.bin_size)
    }

    fn units(&self) -> &str {
        "fraction"
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        if slice.is_empty() || self.n_bins() == 0 {
            return Ok(None);
        }
        let SlicePoint::Object { object, orbit, .. } = &slice.point else {
            return Err(SkysliceError::MetricEvaluation(format!(
                "slice {} is not an object slice",
                slice.index
            )));
        };
        let elements = orbit
            .elements
            .as_ref()
            .ok_or(SkysliceError::MissingOrbitElements(*object))?;

        let hit = occupied_bins(
            slice.visits.iter().map(|v| elements.mean_anomaly_at(v.time)),
            &self.edges,
        );
        Ok(Some(MetricValue::Scalar(hit as f64 / self.n_bins() as f64)))
    }
}

/// SNR of a detection; fails on a visit without an object magnitude.
fn detection_snr(visit: &Visit) -> Result<f64, SkysliceError> {
    let magnitude = visit.magnitude.ok_or_else(|| {
        SkysliceError::MetricEvaluation(format!(
            "visit at MJD {} carries no object magnitude",
            visit.time
        ))
    })?;
    Ok(signal_to_noise(magnitude, visit.five_sigma_depth))
}

/// Whether an object is a candidate for lightcurve inversion: at least `n_obs` detections with
/// SNR ≥ `snr_limit`, spanning at least `n_days`.
#[derive(Debug, Clone)]
pub struct LightcurveInversionMetric {
    snr_limit: f64,
    n_obs: usize,
    n_days: Days,
}

impl LightcurveInversionMetric {
    pub fn new(snr_limit: f64, n_obs: usize, n_days: Days) -> Result<Self, SkysliceError> {
        if !(snr_limit > 0.0) || n_obs == 0 || !(n_days >= 0.0) {
            return Err(SkysliceError::InvalidMetricParameter(format!(
                "snr_limit ({snr_limit}) and n_obs ({n_obs}) must be > 0, n_days ({n_days}) >= 0"
            )));
        }
        Ok(LightcurveInversionMetric {
            snr_limit,
            n_obs,
            n_days,
        })
    }
}

impl Default for LightcurveInversionMetric {
    /// 100 detections at SNR ≥ 20 over five years.
    fn default() -> Self {
        LightcurveInversionMetric {
            snr_limit: 20.0,
            n_obs: 100,
            n_days: 5.0 * 365.0,
        }
    }
}

impl Metric for LightcurveInversionMetric {
    fn name(&self) -> String {
        "LightcurveInversion".into()
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        if slice.is_empty() {
            return Ok(None);
        }
        let mut good = Vec::with_capacity(slice.len());
        for visit in &slice.visits {
            if detection_snr(visit)? >= self.snr_limit {
                good.push(*visit);
            }
        }
        if good.len() < self.n_obs {
            return Ok(Some(MetricValue::Scalar(0.0)));
        }
        let times = sorted_times(&good);
        let span = times[times.len() - 1] - times[0];
        Ok(Some(MetricValue::Scalar(if span >= self.n_days { 1.0 } else { 0.0 })))
    }
}

/// Whether a color in `band_one − band_two` can be measured: at least `n_pairs` detections in
/// `band_one` with SNR ≥ `snr_limit` each have a matching `band_two` detection (same SNR cut)
/// within `n_hours`.
#[derive(Debug, Clone)]
pub struct ColorDeterminationMetric {
    band_one: Filter,
    band_two: Filter,
    n_pairs: usize,
    snr_limit: f64,
    n_hours: f64,
}

impl ColorDeterminationMetric {
    /// Arguments
    /// -----------------
    /// * `band_one`, `band_two`: the two distinct bands of the color.
    /// * `n_pairs`: number of close pairs required.
    /// * `snr_limit`: minimum SNR of both members of a pair.
    /// * `n_hours`: largest time separation inside a pair.
    pub fn new(
        band_one: Filter,
        band_two: Filter,
        n_pairs: usize,
        snr_limit: f64,
        n_hours: f64,
    ) -> Result<Self, SkysliceError> {
        if band_one == band_two {
            return Err(SkysliceError::InvalidMetricParameter(format!(
                "a color needs two distinct bands (got {band_one} twice)"
            )));
        }
        if n_pairs == 0 || !(snr_limit > 0.0) || !(n_hours > 0.0) {
            return Err(SkysliceError::InvalidMetricParameter(format!(
                "n_pairs ({n_pairs}), snr_limit ({snr_limit}) and n_hours ({n_hours}) must be > 0"
            )));
        }
        Ok(ColorDeterminationMetric {
            band_one,
            band_two,
            n_pairs,
            snr_limit,
            n_hours,
        })
    }

    /// One pair with SNR ≥ 10 within two hours.
    pub fn with_bands(band_one: Filter, band_two: Filter) -> Result<Self, SkysliceError> {
        ColorDeterminationMetric::new(band_one, band_two, 1, 10.0, 2.0)
    }

    /// Sorted times of the detections in `band` passing the SNR cut.
    fn band_times(&self, slice: &Slice, band: Filter) -> Result<Vec<f64>, SkysliceError> {
        let mut good = Vec::new();
        for visit in slice.visits.iter().filter(|v| v.filter == band) {
            if detection_snr(visit)? >= self.snr_limit {
                good.push(*visit);
            }
        }
        Ok(sorted_times(&good))
    }
}

impl Metric for ColorDeterminationMetric {
    fn name(&self) -> String {
        format!("ColorDetermination {}-{}", self.band_one, self.band_two)
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        if slice.is_empty() {
            return Ok(None);
        }
        let one = self.band_times(slice, self.band_one)?;
        let two = self.band_times(slice, self.band_two)?;
        let window = self.n_hours / 24.0;
        let pairs = one
            .iter()
            .filter(|&&t| count_in_closed(&two, t - window, t + window) > 0)
            .count();
        Ok(Some(MetricValue::Scalar(if pairs >= self.n_pairs { 1.0 } else { 0.0 })))
    }
}
