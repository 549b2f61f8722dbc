//! # Simple metrics
//!
//! Per-slice counts and aggregates that need no time windowing. All of them return
//! insufficient data (`None`) on an empty slice.
use std::collections::BTreeMap;

use crate::{
    constants::FastHashMap,
    observations::{
        columns::{ColumnNames, Field},
        Filter,
    },
    skyslice_errors::SkysliceError,
    slicers::Slice,
};

use super::{Metric, MetricValue, NamedReducer};

/// Number of visits in the slice.
#[derive(Debug, Clone, Default)]
pub struct NObsMetric;

impl Metric for NObsMetric {
    fn name(&self) -> String {
        "NObs".into()
    }

    fn units(&self) -> &str {
        "#"
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        if slice.is_empty() {
            return Ok(None);
        }
        Ok(Some(MetricValue::Scalar(slice.len() as f64)))
    }
}

/// Mean of a numeric column over the visits that carry it.
#[derive(Debug, Clone)]
pub struct MeanMetric {
    field: Field,
}

impl MeanMetric {
    /// Resolve `column` through `columns`.
    ///
    /// Return
    /// ----------
    /// * [`SkysliceError::UnknownColumn`] for an unknown name,
    ///   [`SkysliceError::InvalidMetricParameter`] for the non-numeric filter column.
    pub fn new(column: &str, columns: &ColumnNames) -> Result<Self, SkysliceError> {
        let field = columns.resolve(column)?;
        if !field.is_numeric() {
            return Err(SkysliceError::InvalidMetricParameter(format!(
                "column `{column}` is not numeric"
            )));
        }
        Ok(MeanMetric { field })
    }
}

impl Metric for MeanMetric {
    fn name(&self) -> String {
        format!("Mean {}", self.field)
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        let (sum, n) = slice
            .visits
            .iter()
            .filter_map(|v| v.numeric_value(self.field))
            .fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
        Ok((n > 0).then(|| MetricValue::Scalar(sum / n as f64)))
    }
}

/// Coadded five-sigma depth, `1.25 · log10 Σ 10^{0.8 · m5}`.
#[derive(Debug, Clone, Default)]
pub struct CoaddM5Metric;

impl Metric for CoaddM5Metric {
    fn name(&self) -> String {
        "CoaddM5".into()
    }

    fn units(&self) -> &str {
        "mag"
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        if slice.is_empty() {
            return Ok(None);
        }
        let flux: f64 = slice
            .visits
            .iter()
            .map(|v| 10f64.powf(0.8 * v.five_sigma_depth))
            .sum();
        Ok(Some(MetricValue::Scalar(1.25 * flux.log10())))
    }
}

/// Number of nights holding at least `n_visits_in_night` visits.
#[derive(Debug, Clone)]
pub struct QuickRevisitMetric {
    n_visits_in_night: usize,
}

impl QuickRevisitMetric {
    pub fn new(n_visits_in_night: usize) -> Result<Self, SkysliceError> {
        if n_visits_in_night == 0 {
            return Err(SkysliceError::InvalidMetricParameter(
                "n_visits_in_night must be >= 1".into(),
            ));
        }
        Ok(QuickRevisitMetric { n_visits_in_night })
    }
}

impl Default for QuickRevisitMetric {
    fn default() -> Self {
        QuickRevisitMetric {
            n_visits_in_night: 6,
        }
    }
}

impl Metric for QuickRevisitMetric {
    fn name(&self) -> String {
        "QuickRevisit".into()
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        if slice.is_empty() {
            return Ok(None);
        }
        let mut per_night: FastHashMap<i32, usize> = FastHashMap::default();
        for v in &slice.visits {
            *per_night.entry(v.night).or_default() += 1;
        }
        let nights = per_night
            .values()
            .filter(|&&n| n >= self.n_visits_in_night)
            .count();
        Ok(Some(MetricValue::Scalar(nights as f64)))
    }
}

/// Fraction of the requested visits obtained in every band, plus the joint (minimum)
/// completeness across the requested bands.
///
/// Only bands with a non-zero request are evaluated; the compound result holds one entry per
/// requested band (named after the band) and a [`FilterCompletenessMetric::JOINT`] entry.
#[derive(Debug, Clone)]
pub struct FilterCompletenessMetric {
    requested: Vec<(Filter, usize)>,
}

impl FilterCompletenessMetric {
    pub const JOINT: &'static str = "Joint";

    /// Return
    /// ----------
    /// * [`SkysliceError::InvalidMetricParameter`] unless at least one band has a non-zero
    ///   request.
    pub fn new(requested: &[(Filter, usize)]) -> Result<Self, SkysliceError> {
        let mut requested: Vec<(Filter, usize)> =
            requested.iter().copied().filter(|&(_, n)| n > 0).collect();
        if requested.is_empty() {
            return Err(SkysliceError::InvalidMetricParameter(
                "request a number of visits for at least one filter".into(),
            ));
        }
        requested.sort_by_key(|&(f, _)| f);
        requested.dedup_by_key(|&mut (f, _)| f);
        Ok(FilterCompletenessMetric { requested })
    }
}

impl Metric for FilterCompletenessMetric {
    fn name(&self) -> String {
        "FilterCompleteness".into()
    }

    fn units(&self) -> &str {
        "fraction"
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        if slice.is_empty() {
            return Ok(None);
        }
        let mut result = BTreeMap::new();
        let mut joint = f64::INFINITY;
        for &(filter, n_requested) in &self.requested {
            let n = slice.visits.iter().filter(|v| v.filter == filter).count();
            let completeness = n as f64 / n_requested as f64;
            joint = joint.min(completeness);
            result.insert(filter.to_string(), Some(completeness));
        }
        result.insert(Self::JOINT.to_string(), Some(joint));
        Ok(Some(MetricValue::Compound(result)))
    }

    fn reducers(&self) -> Vec<NamedReducer> {
        self.requested
            .iter()
            .map(|(f, _)| NamedReducer::field(f.to_string(), f.to_string()))
            .chain(std::iter::once(NamedReducer::field(Self::JOINT, Self::JOINT)))
            .collect()
    }
}

#[cfg(test)]
mod simple_metrics_test {
    use super::*;
    use crate::{observations::Visit, slicers::SlicePoint};
    use approx::assert_relative_eq;

    fn slice_of(visits: Vec<Visit>) -> Slice {
        Slice {
            index: 3,
            point: SlicePoint::HBin { h_index: 0, h: 0.0 },
            visits,
        }
    }

    fn visits() -> Vec<Visit> {
        vec![
            Visit::new(60000.0, 0, Filter::R, 24.0).with_seeing(0.8),
            Visit::new(60000.1, 0, Filter::R, 24.0),
            Visit::new(60000.2, 0, Filter::G, 23.0).with_seeing(1.2),
            Visit::new(60003.0, 3, Filter::G, 23.0),
        ]
    }

    #[test]
    fn test_nobs() {
        assert_eq!(
            NObsMetric.run(&slice_of(visits())).unwrap(),
            Some(MetricValue::Scalar(4.0))
        );
        assert_eq!(NObsMetric.run(&slice_of(vec![])).unwrap(), None);
    }

    #[test]
    fn test_mean_skips_missing_values() {
        let m = MeanMetric::new("finSeeing", &ColumnNames::default()).unwrap();
        assert_eq!(m.name(), "Mean seeing");
        let v = m.run(&slice_of(visits())).unwrap().unwrap();
        assert_relative_eq!(v.as_scalar().unwrap(), 1.0, epsilon = 1e-12);
        assert!(MeanMetric::new("filter", &ColumnNames::default()).is_err());
    }

    #[test]
    fn test_coadd_depth() {
        // n identical visits gain 1.25 log10(n) magnitudes
        let same: Vec<Visit> = (0..4)
            .map(|i| Visit::new(60000.0 + i as f64, i, Filter::R, 24.0))
            .collect();
        let v = CoaddM5Metric.run(&slice_of(same)).unwrap().unwrap();
        assert_relative_eq!(v.as_scalar().unwrap(), 24.0 + 1.25 * 4f64.log10(), epsilon = 1e-9);
    }

    #[test]
    fn test_quick_revisit() {
        let m = QuickRevisitMetric::new(3).unwrap();
        assert_eq!(
            m.run(&slice_of(visits())).unwrap(),
            Some(MetricValue::Scalar(1.0))
        );
        assert!(QuickRevisitMetric::new(0).is_err());
    }

    #[test]
    fn test_filter_completeness() {
        let m = FilterCompletenessMetric::new(&[(Filter::R, 4), (Filter::G, 1), (Filter::U, 0)])
            .unwrap();
        let value = m.run(&slice_of(visits())).unwrap().unwrap();
        assert_eq!(value.field("r"), Some(0.5));
        assert_eq!(value.field("g"), Some(2.0));
        assert_eq!(value.field("u"), None);
        assert_eq!(value.field("Joint"), Some(0.5));

        let names: Vec<_> = m.reducers().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["g", "r", "Joint"]);

        assert!(FilterCompletenessMetric::new(&[(Filter::U, 0)]).is_err());
    }
}
