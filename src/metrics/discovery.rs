//! # Discovery chances
//!
//! Counts the time windows in which a moving object could have been *discovered*, i.e.
//! linked from enough well-sampled nights.
//!
//! Algorithm
//! -----------------
//! 1. Sort a local copy of the visits by `(night, time)`.
//! 2. A night **qualifies** when it contains `n_obs_per_night` visits spanning at most
//!    `t_night` days. Its time stamp is the time of the first visit of its earliest such run.
//! 3. A window `[t, t + t_window]` is opened at every qualifying night time `t`; it
//!    **qualifies** when it contains at least `n_nights_per_window` qualifying nights.
//! 4. Window ends are located by binary search on the ascending night times.
//!
//! Overlapping windows are all counted. With `unique_windows`, the search resumes at the first
//! qualifying night strictly after the last night used by a qualifying window.
//!
//! See also
//! ------------
//! * [`Completeness`](crate::summary::completeness::Completeness) – Turns per (object, H)
//!   discovery chances into completeness curves.
use std::cmp::Ordering::{Equal, Greater};

use itertools::Itertools;

use crate::{
    constants::Days,
    observations::Visit,
    skyslice_errors::SkysliceError,
    slicers::Slice,
};

use super::{Metric, MetricValue};

/// Parameters of [`DiscoveryChancesMetric`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryChancesParams {
    /// Visits needed within one night (M).
    pub n_obs_per_night: usize,
    /// Largest span of those visits, in days.
    pub t_night: Days,
    /// Qualifying nights needed within one window (K).
    pub n_nights_per_window: usize,
    /// Window length W, in days.
    pub t_window: Days,
    /// Count non-overlapping windows only.
    pub unique_windows: bool,
}

impl Default for DiscoveryChancesParams {
    fn default() -> Self {
        DiscoveryChancesParams {
            n_obs_per_night: 2,
            t_night: 90.0 / 60.0 / 24.0,
            n_nights_per_window: 3,
            t_window: 15.0,
            unique_windows: false,
        }
    }
}

impl DiscoveryChancesParams {
    pub fn builder() -> DiscoveryChancesParamsBuilder {
        DiscoveryChancesParamsBuilder {
            params: DiscoveryChancesParams::default(),
        }
    }
}

/// Builder for [`DiscoveryChancesParams`], with validation.
#[derive(Debug, Clone)]
pub struct DiscoveryChancesParamsBuilder {
    params: DiscoveryChancesParams,
}

impl DiscoveryChancesParamsBuilder {
    pub fn n_obs_per_night(mut self, v: usize) -> Self {
        self.params.n_obs_per_night = v;
        self
    }
    pub fn t_night(mut self, v: Days) -> Self {
        self.params.t_night = v;
        self
    }
    pub fn n_nights_per_window(mut self, v: usize) -> Self {
        self.params.n_nights_per_window = v;
        self
    }
    pub fn t_window(mut self, v: Days) -> Self {
        self.params.t_window = v;
        self
    }
    pub fn unique_windows(mut self, v: bool) -> Self {
        self.params.unique_windows = v;
        self
    }

    /// Return true iff x > 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    /// Return true iff x >= 0.0 and comparable (i.e., not NaN).
    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    pub fn build(self) -> Result<DiscoveryChancesParams, SkysliceError> {
        let p = &self.params;

        if p.n_obs_per_night == 0 {
            return Err(SkysliceError::InvalidMetricParameter(
                "n_obs_per_night must be >= 1".into(),
            ));
        }
        if p.n_nights_per_window == 0 {
            return Err(SkysliceError::InvalidMetricParameter(
                "n_nights_per_window must be >= 1".into(),
            ));
        }
        if !Self::ge0(p.t_night) {
            return Err(SkysliceError::InvalidMetricParameter(
                "t_night must be >= 0".into(),
            ));
        }
        if !Self::gt0(p.t_window) {
            return Err(SkysliceError::InvalidMetricParameter(
                "t_window must be > 0".into(),
            ));
        }

        Ok(self.params)
    }
}

/// Number of windows in which an object could be discovered.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryChancesMetric {
    params: DiscoveryChancesParams,
}

impl DiscoveryChancesMetric {
    pub fn new(params: DiscoveryChancesParams) -> Self {
        DiscoveryChancesMetric { params }
    }

    pub fn params(&self) -> &DiscoveryChancesParams {
        &self.params
    }

    /// Time stamps of the qualifying nights, ascending.
    fn qualifying_nights(&self, visits: &[Visit]) -> Vec<f64> {
        let m = self.params.n_obs_per_night;
        let mut sorted = visits.to_vec();
        sorted.sort_by(|a, b| a.night.cmp(&b.night).then(a.time.total_cmp(&b.time)));

        let mut nights = Vec::new();
        for (_, group) in &sorted.iter().chunk_by(|v| v.night) {
            let times: Vec<f64> = group.map(|v| v.time).collect();
            if times.len() < m {
                continue;
            }
            if let Some(w) = times
                .windows(m)
                .find(|w| w[m - 1] - w[0] <= self.params.t_night)
            {
                nights.push(w[0]);
            }
        }
        nights.sort_unstable_by(f64::total_cmp);
        nights
    }

    /// Count qualifying windows over ascending night time stamps.
    fn count_windows(&self, nights: &[f64]) -> usize {
        let k = self.params.n_nights_per_window;
        let mut count = 0;
        let mut i = 0;
        while i < nights.len() {
            let end = nights.partition_point(|&t| t <= nights[i] + self.params.t_window);
            if end - i >= k {
                count += 1;
                if self.params.unique_windows {
                    i = end;
                    continue;
                }
            }
            i += 1;
        }
        count
    }
}

impl Metric for DiscoveryChancesMetric {
    fn name(&self) -> String {
        "DiscoveryChances".into()
    }

    fn units(&self) -> &str {
        "Chances"
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        if slice.is_empty() {
            return Ok(None);
        }
        let nights = self.qualifying_nights(&slice.visits);
        Ok(Some(MetricValue::Scalar(self.count_windows(&nights) as f64)))
    }
}
