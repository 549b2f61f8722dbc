//! # Cadence metrics
//!
//! Windowed metrics describing how well the time sampling of a slice serves a science case:
//!
//! * [`SupernovaMetric`] – number of light-curve-quality sequences for a supernova at redshift z.
//! * [`UniformityMetric`] – KS-style distance between the visit dates and a uniform cadence.
//! * [`TemplateExistsMetric`] – fraction of visits preceded by a visit of equal or better seeing.
//!
//! Every metric works on a local, time-sorted copy of the slice and locates window boundaries
//! by binary search, so a slice of `n` visits costs `O(n log n)` plus the per-window work.
use std::{
    cmp::Ordering::{Equal, Greater},
    collections::BTreeMap,
};

use smallvec::SmallVec;

use crate::{
    constants::{
        Days, Magnitude, DAYS_PER_YEAR, REST_FRAME_MAX_WAVELENGTH, REST_FRAME_MIN_WAVELENGTH,
    },
    observations::Filter,
    skyslice_errors::SkysliceError,
    slicers::Slice,
};

use super::{median, sorted_by_time, sorted_times, Metric, MetricValue, NamedReducer};

// -------------------------------------------------------------------------------------------------
// Supernova cadence
// -------------------------------------------------------------------------------------------------

/// Parameters of [`SupernovaMetric`]. Times are rest-frame days relative to the explosion
/// window origin.
#[derive(Debug, Clone, PartialEq)]
pub struct SupernovaParams {
    pub redshift: f64,
    /// Start of the light curve relative to the window origin.
    pub t_min: Days,
    /// End of the light curve.
    pub t_max: Days,
    /// Visits required over `[t_min, t_max]`.
    pub n_between: usize,
    /// Distinct filters required near peak, each deeper than `single_depth_limit`.
    pub n_filt: usize,
    /// Start of the near-peak interval.
    pub t_less: Days,
    /// Visits required before `t_less`.
    pub n_less: usize,
    /// End of the near-peak interval.
    pub t_more: Days,
    /// Visits required after `t_more`.
    pub n_more: usize,
    /// Largest gap allowed between near-peak visits (exclusive).
    pub peak_gap: Days,
    pub single_depth_limit: Magnitude,
    /// Spacing of the window origins.
    pub resolution: Days,
    /// Count non-overlapping sequences only.
    pub unique_blocks: bool,
}

impl Default for SupernovaParams {
    fn default() -> Self {
        SupernovaParams {
            redshift: 0.0,
            t_min: -20.0,
            t_max: 60.0,
            n_between: 7,
            n_filt: 2,
            t_less: -5.0,
            n_less: 1,
            t_more: 30.0,
            n_more: 1,
            peak_gap: 15.0,
            single_depth_limit: 23.0,
            resolution: 5.0,
            unique_blocks: false,
        }
    }
}

impl SupernovaParams {
    pub fn builder() -> SupernovaParamsBuilder {
        SupernovaParamsBuilder {
            params: SupernovaParams::default(),
        }
    }
}

/// Builder for [`SupernovaParams`], with validation.
#[derive(Debug, Clone)]
pub struct SupernovaParamsBuilder {
    params: SupernovaParams,
}

impl SupernovaParamsBuilder {
    pub fn redshift(mut self, v: f64) -> Self {
        self.params.redshift = v;
        self
    }
    pub fn t_min(mut self, v: Days) -> Self {
        self.params.t_min = v;
        self
    }
    pub fn t_max(mut self, v: Days) -> Self {
        self.params.t_max = v;
        self
    }
    pub fn n_between(mut self, v: usize) -> Self {
        self.params.n_between = v;
        self
    }
    pub fn n_filt(mut self, v: usize) -> Self {
        self.params.n_filt = v;
        self
    }
    pub fn t_less(mut self, v: Days) -> Self {
        self.params.t_less = v;
        self
    }
    pub fn n_less(mut self, v: usize) -> Self {
        self.params.n_less = v;
        self
    }
    pub fn t_more(mut self, v: Days) -> Self {
        self.params.t_more = v;
        self
    }
    pub fn n_more(mut self, v: usize) -> Self {
        self.params.n_more = v;
        self
    }
    pub fn peak_gap(mut self, v: Days) -> Self {
        self.params.peak_gap = v;
        self
    }
    pub fn single_depth_limit(mut self, v: Magnitude) -> Self {
        self.params.single_depth_limit = v;
        self
    }
    pub fn resolution(mut self, v: Days) -> Self {
        self.params.resolution = v;
        self
    }
    pub fn unique_blocks(mut self, v: bool) -> Self {
        self.params.unique_blocks = v;
        self
    }

    #[inline]
    fn gt0(x: f64) -> bool {
        x.partial_cmp(&0.0) == Some(Greater)
    }

    #[inline]
    fn ge0(x: f64) -> bool {
        matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
    }

    pub fn build(self) -> Result<SupernovaParams, SkysliceError> {
        let p = &self.params;

        if !Self::ge0(p.redshift) {
            return Err(SkysliceError::InvalidMetricParameter(
                "redshift must be >= 0".into(),
            ));
        }
        if !Self::gt0(p.resolution) {
            return Err(SkysliceError::InvalidMetricParameter(
                "resolution must be > 0".into(),
            ));
        }
        if !Self::gt0(p.peak_gap) {
            return Err(SkysliceError::InvalidMetricParameter(
                "peak_gap must be > 0".into(),
            ));
        }
        if !Self::gt0(p.t_max - p.t_min) {
            return Err(SkysliceError::InvalidMetricParameter(
                "t_max must be greater than t_min".into(),
            ));
        }
        if !Self::gt0(p.t_more - p.t_less) {
            return Err(SkysliceError::InvalidMetricParameter(
                "t_more must be greater than t_less".into(),
            ));
        }
        if !p.single_depth_limit.is_finite() {
            return Err(SkysliceError::InvalidMetricParameter(
                "single_depth_limit must be finite".into(),
            ));
        }

        Ok(self.params)
    }
}

/// Count the supernova light-curve sequences a slice supports.
///
/// Times are taken relative to the first usable visit and divided by `1 + z`; only filters
/// whose rest-frame effective wavelength lies in `(300, 900)` nm are kept. Window origins are
/// laid every `resolution` days. For an origin `o`, the visits in `[o, o + t_max − t_min]`
/// get shifted times `t = time − o + t_min`, and the window qualifies when it has:
///
/// * at least `n_between` visits,
/// * at least `n_less` visits with `t < t_less` and `n_more` visits with `t > t_more`,
/// * at least `n_filt` filters whose deepest near-peak (`t_less < t < t_more`) visit is deeper
///   than `single_depth_limit`,
/// * at least two near-peak visits, all separated by less than `peak_gap`.
///
/// The result is a compound value: `n_sequences`, and the medians of the near-peak max gap
/// (`median_max_gap`) and of the visit count (`median_n_obs`) over qualifying windows, both
/// missing when nothing qualifies.
///
/// With `unique_blocks`, origins up to the last visit of a qualifying window are skipped.
#[derive(Debug, Clone, Default)]
pub struct SupernovaMetric {
    params: SupernovaParams,
}

impl SupernovaMetric {
    pub const N_SEQUENCES: &'static str = "n_sequences";
    pub const MEDIAN_MAX_GAP: &'static str = "median_max_gap";
    pub const MEDIAN_N_OBS: &'static str = "median_n_obs";

    pub fn new(params: SupernovaParams) -> Self {
        SupernovaMetric { params }
    }

    fn kept_filter(&self, filter: Filter) -> bool {
        let rest = filter.effective_wavelength() / (1.0 + self.params.redshift);
        rest > REST_FRAME_MIN_WAVELENGTH && rest < REST_FRAME_MAX_WAVELENGTH
    }

    /// Max near-peak gap of the window `[left, right)` if it qualifies.
    fn evaluate_window(
        &self,
        times: &[f64],
        filters: &[Filter],
        depths: &[f64],
        left: usize,
        right: usize,
        origin: f64,
    ) -> Option<f64> {
        let p = &self.params;
        let shifted: SmallVec<[f64; 32]> = times[left..right]
            .iter()
            .map(|t| t - origin + p.t_min)
            .collect();

        if shifted.len() < p.n_between {
            return None;
        }
        if shifted.iter().filter(|&&t| t < p.t_less).count() < p.n_less {
            return None;
        }
        if shifted.iter().filter(|&&t| t > p.t_more).count() < p.n_more {
            return None;
        }

        let near_peak: SmallVec<[usize; 32]> = (0..shifted.len())
            .filter(|&k| shifted[k] > p.t_less && shifted[k] < p.t_more)
            .collect();

        let mut deepest: BTreeMap<Filter, f64> = BTreeMap::new();
        for &k in &near_peak {
            let depth = deepest
                .entry(filters[left + k])
                .or_insert(f64::NEG_INFINITY);
            *depth = depth.max(depths[left + k]);
        }
        let bright_enough = deepest
            .values()
            .filter(|&&d| d > p.single_depth_limit)
            .count();
        if bright_enough < p.n_filt || near_peak.len() < 2 {
            return None;
        }

        let max_gap = near_peak
            .windows(2)
            .map(|w| shifted[w[1]] - shifted[w[0]])
            .fold(f64::NEG_INFINITY, f64::max);
        (max_gap < p.peak_gap).then_some(max_gap)
    }
}

impl Metric for SupernovaMetric {
    fn name(&self) -> String {
        "Supernova".into()
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        let p = &self.params;
        let visits: Vec<_> = sorted_by_time(&slice.visits)
            .into_iter()
            .filter(|v| self.kept_filter(v.filter))
            .collect();
        let Some(first) = visits.first() else {
            return Ok(None);
        };

        let t0 = first.time;
        let times: Vec<f64> = visits
            .iter()
            .map(|v| (v.time - t0) / (1.0 + p.redshift))
            .collect();
        let filters: Vec<Filter> = visits.iter().map(|v| v.filter).collect();
        let depths: Vec<f64> = visits.iter().map(|v| v.five_sigma_depth).collect();

        let span = times[times.len() - 1].ceil();
        let length = p.t_max - p.t_min;

        let mut max_gaps = Vec::new();
        let mut n_obs = Vec::new();
        let mut used_until = f64::NEG_INFINITY;

        let mut k = 0usize;
        loop {
            let origin = k as f64 * p.resolution;
            if origin >= span {
                break;
            }
            k += 1;
            if p.unique_blocks && origin <= used_until {
                continue;
            }

            let left = times.partition_point(|&t| t < origin);
            let right = times.partition_point(|&t| t <= origin + length);
            if let Some(gap) = self.evaluate_window(&times, &filters, &depths, left, right, origin)
            {
                max_gaps.push(gap);
                n_obs.push((right - left) as f64);
                if p.unique_blocks {
                    used_until = times[right - 1];
                }
            }
        }

        Ok(Some(MetricValue::Compound(BTreeMap::from([
            (Self::N_SEQUENCES.to_string(), Some(max_gaps.len() as f64)),
            (Self::MEDIAN_MAX_GAP.to_string(), median(&max_gaps)),
            (Self::MEDIAN_N_OBS.to_string(), median(&n_obs)),
        ]))))
    }

    fn reducers(&self) -> Vec<NamedReducer> {
        vec![
            NamedReducer::field("NSequences", Self::N_SEQUENCES),
            NamedReducer::field("MedianMaxGap", Self::MEDIAN_MAX_GAP),
            NamedReducer::field("MedianNObs", Self::MEDIAN_N_OBS),
        ]
    }
}

// -------------------------------------------------------------------------------------------------
// Uniformity
// -------------------------------------------------------------------------------------------------

/// How uniformly the visits are spread over the survey.
///
/// Dates are mapped to `x = (t − t_first) / survey_length` and compared to the uniform
/// cumulative distribution: `D = max_i |(i + 1)/n − x_i|`. Perfectly uniform sampling over the
/// whole survey scores ≈ 0, a single visit scores 1.
#[derive(Debug, Clone)]
pub struct UniformityMetric {
    survey_length: Days,
}

impl UniformityMetric {
    /// `survey_length_years` must be > 0.
    pub fn new(survey_length_years: f64) -> Result<Self, SkysliceError> {
        if !(survey_length_years > 0.0) || !survey_length_years.is_finite() {
            return Err(SkysliceError::InvalidMetricParameter(format!(
                "survey length must be > 0 (got {survey_length_years})"
            )));
        }
        Ok(UniformityMetric {
            survey_length: survey_length_years * DAYS_PER_YEAR,
        })
    }
}

impl Default for UniformityMetric {
    fn default() -> Self {
        UniformityMetric {
            survey_length: 10.0 * DAYS_PER_YEAR,
        }
    }
}

impl Metric for UniformityMetric {
    fn name(&self) -> String {
        "Uniformity".into()
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        match slice.len() {
            0 => return Ok(None),
            1 => return Ok(Some(MetricValue::Scalar(1.0))),
            _ => {}
        }
        let times = sorted_times(&slice.visits);
        let n = times.len() as f64;
        let d_max = times
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let x = (t - times[0]) / self.survey_length;
                ((i + 1) as f64 / n - x).abs()
            })
            .fold(0.0, f64::max);
        Ok(Some(MetricValue::Scalar(d_max)))
    }
}

// -------------------------------------------------------------------------------------------------
// Template availability
// -------------------------------------------------------------------------------------------------

/// Fraction of visits for which an earlier visit of equal or better seeing exists.
///
/// The first visit never has a template; the fraction is taken over the `n − 1` later visits,
/// so a single visit scores 0. Every visit of the slice must carry a seeing value.
#[derive(Debug, Clone, Default)]
pub struct TemplateExistsMetric;

impl Metric for TemplateExistsMetric {
    fn name(&self) -> String {
        "TemplateExists".into()
    }

    fn units(&self) -> &str {
        "fraction"
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        if slice.is_empty() {
            return Ok(None);
        }
        let visits = sorted_by_time(&slice.visits);
        let seeing = visits
            .iter()
            .map(|v| {
                v.seeing.ok_or_else(|| {
                    SkysliceError::MetricEvaluation(format!(
                        "visit at MJD {} has no seeing value",
                        v.time
                    ))
                })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        if seeing.len() == 1 {
            return Ok(Some(MetricValue::Scalar(0.0)));
        }

        let mut best = seeing[0];
        let mut with_template = 0usize;
        for &s in &seeing[1..] {
            if s <= best {
                with_template += 1;
            }
            best = best.min(s);
        }
        Ok(Some(MetricValue::Scalar(
            with_template as f64 / (seeing.len() - 1) as f64,
        )))
    }
}

#[cfg(test)]
mod cadence_test {
    use super::*;
    use crate::{observations::Visit, slicers::SlicePoint};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn slice_of(visits: Vec<Visit>) -> Slice {
        Slice {
            index: 0,
            point: SlicePoint::HBin { h_index: 0, h: 0.0 },
            visits,
        }
    }

    fn scalar(metric: &dyn Metric, visits: Vec<Visit>) -> Option<f64> {
        metric
            .run(&slice_of(visits))
            .unwrap()
            .and_then(|v| v.as_scalar())
    }

    #[test]
    fn uniformity_single_visit() {
        let m = UniformityMetric::default();
        assert_eq!(scalar(&m, vec![Visit::new(60000.0, 0, Filter::R, 24.0)]), Some(1.0));
        assert_eq!(scalar(&m, vec![]), None);
    }

    #[test]
    fn uniformity_even_spacing() {
        let m = UniformityMetric::new(10.0).unwrap();
        let n = 1000;
        let length = 10.0 * DAYS_PER_YEAR;
        let visits = (0..n)
            .map(|i| {
                let t = 60000.0 + length * i as f64 / (n - 1) as f64;
                Visit::new(t, (t - 60000.0) as i32, Filter::R, 24.0)
            })
            .collect();
        let d = scalar(&m, visits).unwrap();
        assert!(d < 2.0 / n as f64, "d = {d}");
    }

    #[test]
    fn uniformity_clumped() {
        let m = UniformityMetric::new(10.0).unwrap();
        let visits = (0..10)
            .map(|i| Visit::new(60000.0 + i as f64 * 0.01, 0, Filter::R, 24.0))
            .collect();
        assert_relative_eq!(scalar(&m, visits).unwrap(), 1.0, epsilon = 1e-4);
    }

    fn with_seeing(seeing: &[f64]) -> Vec<Visit> {
        seeing
            .iter()
            .enumerate()
            .map(|(i, &s)| Visit::new(60000.0 + i as f64, i as i32, Filter::R, 24.0).with_seeing(s))
            .collect()
    }

    #[test]
    fn template_exists_ordering() {
        let m = TemplateExistsMetric;
        assert_eq!(scalar(&m, with_seeing(&[2.0, 1.5, 1.0, 0.5])), Some(1.0));
        assert_eq!(scalar(&m, with_seeing(&[0.5, 1.0, 1.5, 2.0])), Some(0.0));
        assert_eq!(scalar(&m, with_seeing(&[1.0, 1.0])), Some(1.0));
        assert_abs_diff_eq!(
            scalar(&m, with_seeing(&[1.0, 2.0, 0.8, 0.9, 0.7])).unwrap(),
            0.5,
            epsilon = 1e-12
        );
        assert_eq!(scalar(&m, with_seeing(&[1.0])), Some(0.0));
        assert_eq!(scalar(&m, vec![]), None);
    }

    #[test]
    fn template_exists_sorts_a_local_copy() {
        let mut visits = with_seeing(&[2.0, 1.5, 1.0, 0.5]);
        visits.reverse();
        let slice = slice_of(visits.clone());
        let value = TemplateExistsMetric.run(&slice).unwrap();
        assert_eq!(value, Some(MetricValue::Scalar(1.0)));
        assert_eq!(slice.visits, visits);
    }

    #[test]
    fn template_exists_requires_seeing() {
        let visits = vec![Visit::new(60000.0, 0, Filter::R, 24.0)];
        assert!(matches!(
            TemplateExistsMetric.run(&slice_of(visits)),
            Err(SkysliceError::MetricEvaluation(_))
        ));
    }

    /// A light curve sampled every 3 days in alternating r/i for 100 days.
    fn supernova_visits(depth: f64) -> Vec<Visit> {
        (0..34)
            .map(|k| {
                let filter = if k % 2 == 0 { Filter::R } else { Filter::I };
                Visit::new(60000.0 + 3.0 * k as f64, 3 * k, filter, depth)
            })
            .collect()
    }

    #[test]
    fn supernova_counts_sequences() {
        let m = SupernovaMetric::default();
        let value = m.run(&slice_of(supernova_visits(24.0))).unwrap().unwrap();

        // times span 99 days: origins 0, 5, ..., 95. A visit after t_more needs
        // time > origin + 50, so origins 0..=45 qualify.
        let n = value.field(SupernovaMetric::N_SEQUENCES).unwrap();
        assert_eq!(n, 10.0);
        assert_eq!(value.field(SupernovaMetric::MEDIAN_MAX_GAP), Some(3.0));
        assert!(value.field(SupernovaMetric::MEDIAN_N_OBS).unwrap() >= 7.0);

        let unique = SupernovaMetric::new(
            SupernovaParams::builder().unique_blocks(true).build().unwrap(),
        );
        let value = unique.run(&slice_of(supernova_visits(24.0))).unwrap().unwrap();
        assert_eq!(value.field(SupernovaMetric::N_SEQUENCES), Some(1.0));
    }

    #[test]
    fn supernova_shallow_visits_never_qualify() {
        let m = SupernovaMetric::default();
        let value = m.run(&slice_of(supernova_visits(22.0))).unwrap().unwrap();
        assert_eq!(value.field(SupernovaMetric::N_SEQUENCES), Some(0.0));
        assert_eq!(value.field(SupernovaMetric::MEDIAN_MAX_GAP), None);
        assert_eq!(value.field(SupernovaMetric::MEDIAN_N_OBS), None);

        let reduced: Vec<_> = m.reducers().iter().map(|r| r.apply(&value)).collect();
        assert_eq!(reduced, vec![Some(0.0), None, None]);
    }

    #[test]
    fn supernova_drops_out_of_band_filters() {
        // at z = 0.5, y (980 / 1.5 = 653 nm) is kept and u (375 / 1.5 = 250 nm) is dropped
        let m = SupernovaMetric::new(SupernovaParams::builder().redshift(0.5).build().unwrap());
        assert!(m.kept_filter(Filter::Y));
        assert!(!m.kept_filter(Filter::U));
        let only_u = (0..5)
            .map(|k| Visit::new(60000.0 + k as f64, k, Filter::U, 24.0))
            .collect();
        assert_eq!(m.run(&slice_of(only_u)).unwrap(), None);
    }

    #[test]
    fn supernova_parameter_validation() {
        assert!(SupernovaParams::builder().resolution(0.0).build().is_err());
        assert!(SupernovaParams::builder().t_max(-30.0).build().is_err());
        assert!(SupernovaParams::builder().redshift(f64::NAN).build().is_err());
    }
}
