//! # Metrics
//!
//! A [`Metric`] turns the visits of one [`Slice`] into a [`MetricValue`]. Metrics are pure:
//! they never mutate the slice, and any reordering happens on a local copy.
//!
//! Outcomes of [`Metric::run`]
//! -----------------
//! * `Ok(Some(value))` – the metric could be evaluated.
//! * `Ok(None)` – insufficient data (e.g. an empty slice); stored as a masked cell.
//! * `Err(e)` – the evaluation failed; the execution layer masks the cell and records a warning.
//!
//! Families
//! -----------------
//! * [`discovery`] – discovery chances of moving objects.
//! * [`cadence`] – supernova cadence, temporal uniformity, template availability.
//! * [`simple`] – counts, means, coadded depth, revisits, per-filter completeness.
//! * [`moving`] – observation arc and activity coverage of moving objects.
//!
//! Compound results are turned into scalars by [`NamedReducer`]s, registered by the metric
//! (defaults) or by the bundle.
pub mod cadence;
pub mod discovery;
pub mod moving;
pub mod simple;

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{constants::MJD, observations::Visit, skyslice_errors::SkysliceError, slicers::Slice};

/// Result of a metric on one slice. A given metric always returns the same variant.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Scalar(f64),
    Vector(Vec<f64>),
    /// Named sub-results; `None` marks a sub-result that could not be computed.
    Compound(BTreeMap<String, Option<f64>>),
}

impl MetricValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, MetricValue::Scalar(_))
    }

    /// Named entry of a compound value.
    pub fn field(&self, name: &str) -> Option<f64> {
        match self {
            MetricValue::Compound(map) => map.get(name).copied().flatten(),
            _ => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Scalar(v)
    }
}

type ReduceFn = Arc<dyn Fn(&MetricValue) -> Option<f64> + Send + Sync>;

/// Named pure function mapping a metric value to a scalar.
#[derive(Clone)]
pub struct NamedReducer {
    name: String,
    func: ReduceFn,
}

impl NamedReducer {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&MetricValue) -> Option<f64> + Send + Sync + 'static,
    {
        NamedReducer {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Reducer extracting the compound entry `key`, named `name`.
    pub fn field(name: impl Into<String>, key: impl Into<String>) -> Self {
        let key = key.into();
        NamedReducer::new(name, move |value| value.field(&key))
    }

    /// Reducer extracting element `index` of a vector value.
    pub fn element(name: impl Into<String>, index: usize) -> Self {
        NamedReducer::new(name, move |value| match value {
            MetricValue::Vector(v) => v.get(index).copied(),
            _ => None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply the reducer; a NaN output is treated as missing.
    pub fn apply(&self, value: &MetricValue) -> Option<f64> {
        (self.func)(value).filter(|v| !v.is_nan())
    }
}

impl fmt::Debug for NamedReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedReducer")
            .field("name", &self.name)
            .finish()
    }
}

pub trait Metric: Send + Sync {
    /// Name used to label result grids.
    fn name(&self) -> String;

    fn units(&self) -> &str {
        ""
    }

    /// Evaluate the metric on one slice.
    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError>;

    /// Reducers registered by default on every bundle running this metric.
    fn reducers(&self) -> Vec<NamedReducer> {
        Vec::new()
    }
}

// -------------------------------------------------------------------------------------------------
// Shared helpers
// -------------------------------------------------------------------------------------------------

/// Visit times sorted ascending (local copy).
pub(crate) fn sorted_times(visits: &[Visit]) -> Vec<MJD> {
    let mut times: Vec<MJD> = visits.iter().map(|v| v.time).collect();
    times.sort_unstable_by(f64::total_cmp);
    times
}

/// Local copy of the visits sorted by time.
pub(crate) fn sorted_by_time(visits: &[Visit]) -> Vec<Visit> {
    let mut sorted = visits.to_vec();
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));
    sorted
}

/// Median of a non-empty sample (mean of the two central values for even sizes).
pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let n = sorted.len();
    Some(if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    })
}

/// Number of elements of the ascending slice `sorted` lying in `[lo, hi]`.
#[inline]
pub(crate) fn count_in_closed(sorted: &[f64], lo: f64, hi: f64) -> usize {
    let start = sorted.partition_point(|&t| t < lo);
    let end = sorted.partition_point(|&t| t <= hi);
    end.saturating_sub(start)
}

#[cfg(test)]
mod metric_value_test {
    use super::*;

    #[test]
    fn test_named_reducers() {
        let compound = MetricValue::Compound(BTreeMap::from([
            ("a".to_string(), Some(1.5)),
            ("b".to_string(), None),
        ]));
        assert_eq!(NamedReducer::field("A", "a").apply(&compound), Some(1.5));
        assert_eq!(NamedReducer::field("B", "b").apply(&compound), None);
        assert_eq!(NamedReducer::field("C", "c").apply(&compound), None);

        let vector = MetricValue::Vector(vec![3.0, f64::NAN]);
        assert_eq!(NamedReducer::element("first", 0).apply(&vector), Some(3.0));
        assert_eq!(NamedReducer::element("second", 1).apply(&vector), None);
        assert_eq!(NamedReducer::element("third", 2).apply(&vector), None);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }

    #[test]
    fn test_count_in_closed() {
        let t = [1.0, 2.0, 2.0, 3.0, 5.0];
        assert_eq!(count_in_closed(&t, 2.0, 3.0), 3);
        assert_eq!(count_in_closed(&t, 3.5, 4.5), 0);
        assert_eq!(count_in_closed(&t, 0.0, 10.0), 5);
    }
}
