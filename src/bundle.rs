//! # Metric bundles
//!
//! A [`Bundle`] ties together everything needed to produce one result grid:
//!
//! * a [`Metric`],
//! * a shared [`Slicer`] handle,
//! * an optional row [`Constraint`],
//! * a run name and free-text metadata,
//! * the [`NamedReducer`]s deriving scalar grids from compound results (by default the
//!   metric's own reducers),
//! * the [`SummaryReducer`]s applied once the grid is complete.
//!
//! Running a bundle yields a [`BundleResult`]. To share partitions between bundles, run them
//! together through an [`ExecutionGroup`](crate::execution::ExecutionGroup);
//! [`Bundle::run`] is a one-bundle group.
//!
//! Summaries
//! -----------------
//! Summaries are applied to the main grid when it holds scalars, and to every reduced grid
//! otherwise. Summary values on a reduced grid are keyed `"{reducer} {summary}"`.
use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{
    constants::BADVAL,
    execution::ExecutionGroup,
    metrics::{Metric, NamedReducer},
    observations::{constraint::Constraint, ObservationTable},
    results::{export::SummaryRecord, ResultGrid},
    skyslice_errors::SkysliceError,
    slicers::{SlicePoint, Slicer},
    summary::{SummaryReducer, SummaryValue},
};

#[derive(Clone)]
pub struct Bundle {
    metric: Arc<dyn Metric>,
    slicer: Arc<dyn Slicer>,
    constraint: Option<Constraint>,
    run_name: String,
    metadata: String,
    reducers: Vec<NamedReducer>,
    summaries: Vec<Arc<dyn SummaryReducer>>,
}

impl Bundle {
    pub fn new(metric: Arc<dyn Metric>, slicer: Arc<dyn Slicer>) -> Self {
        let reducers = metric.reducers();
        Bundle {
            metric,
            slicer,
            constraint: None,
            run_name: String::new(),
            metadata: String::new(),
            reducers,
            summaries: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn with_run_name(mut self, run_name: impl Into<String>) -> Self {
        self.run_name = run_name.into();
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Register an extra reducer, on top of the metric's defaults.
    pub fn with_reducer(mut self, reducer: NamedReducer) -> Self {
        self.reducers.push(reducer);
        self
    }

    pub fn with_summary(mut self, summary: Arc<dyn SummaryReducer>) -> Self {
        self.summaries.push(summary);
        self
    }

    /// Label of the bundle: the metric name, prefixed by the run name and followed by the
    /// constraint key when they are set.
    pub fn name(&self) -> String {
        let mut name = self.metric.name();
        if !self.run_name.is_empty() {
            name = format!("{} {name}", self.run_name);
        }
        if let Some(c) = &self.constraint {
            name = format!("{name} [{}]", c.key());
        }
        name
    }

    pub fn metric(&self) -> &Arc<dyn Metric> {
        &self.metric
    }

    pub fn slicer(&self) -> &Arc<dyn Slicer> {
        &self.slicer
    }

    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn reducers(&self) -> &[NamedReducer] {
        &self.reducers
    }

    pub fn summaries(&self) -> &[Arc<dyn SummaryReducer>] {
        &self.summaries
    }

    /// Run this bundle alone.
    pub fn run(&self, table: &ObservationTable) -> Result<BundleResult, SkysliceError> {
        let mut report = ExecutionGroup::new().with_bundle(self.clone()).run(table)?;
        report
            .results
            .pop()
            .ok_or_else(|| SkysliceError::MetricEvaluation(format!("{} produced no result", self.name())))
    }

    /// Check every summary reducer against the slice points of the bundle's slicer.
    ///
    /// Return
    /// ----------
    /// * The first configuration error raised by a summary reducer, e.g.
    ///   [`SkysliceError::NotAnObjectGrid`] for a completeness summary on a sky slicer.
    pub fn validate(&self, points: &[SlicePoint]) -> Result<(), SkysliceError> {
        let grid = self.metric.name();
        self.summaries
            .iter()
            .try_for_each(|summary| summary.validate(&grid, points))
    }

    /// Derive reduced grids and summary values from a completed grid.
    pub(crate) fn finish(&self, grid: ResultGrid) -> Result<BundleResult, SkysliceError> {
        let reduced: BTreeMap<String, ResultGrid> = self
            .reducers
            .iter()
            .map(|r| (r.name().to_string(), grid.reduce(r)))
            .collect();

        let on_main = self.reducers.is_empty() || (grid.n_valid() > 0 && grid.is_scalar());
        let mut summaries = BTreeMap::new();
        for summary in &self.summaries {
            if on_main {
                summaries.insert(summary.name(), summary.reduce(&grid)?);
            } else {
                for (reducer, rgrid) in &reduced {
                    summaries.insert(format!("{reducer} {}", summary.name()), summary.reduce(rgrid)?);
                }
            }
        }

        Ok(BundleResult {
            name: self.name(),
            units: self.metric.units().to_string(),
            run_name: self.run_name.clone(),
            metadata: self.metadata.clone(),
            grid,
            reduced,
            summaries,
        })
    }
}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("metric", &self.metric.name())
            .field("slicer", &self.slicer.name())
            .field("constraint", &self.constraint)
            .field("run_name", &self.run_name)
            .field("reducers", &self.reducers)
            .finish()
    }
}

/// Output of one bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleResult {
    pub name: String,
    pub units: String,
    pub run_name: String,
    pub metadata: String,
    /// Main grid, one cell per slice.
    pub grid: ResultGrid,
    /// Scalar grids keyed by reducer name.
    pub reduced: BTreeMap<String, ResultGrid>,
    pub summaries: BTreeMap<String, SummaryValue>,
}

impl BundleResult {
    pub fn summary(&self, name: &str) -> Option<&SummaryValue> {
        self.summaries.get(name)
    }

    /// Flat summary records, ready for
    /// [`write_summary_csv`](crate::results::export::write_summary_csv).
    ///
    /// A masked scalar is written as [`BADVAL`]. A completeness curve is written as two
    /// records per H value, `"{summary} differential H={h}"` and
    /// `"{summary} cumulative H={h}"`.
    pub fn summary_records(&self) -> Vec<SummaryRecord> {
        let record = |summary: String, value: f64| SummaryRecord {
            bundle: self.name.clone(),
            summary,
            value,
        };
        let mut records = Vec::new();
        for (key, value) in &self.summaries {
            match value {
                SummaryValue::Scalar(v) => records.push(record(key.clone(), v.unwrap_or(BADVAL))),
                SummaryValue::Curve(curve) => {
                    for (j, h) in curve.h.iter().enumerate() {
                        records.push(record(format!("{key} differential H={h}"), curve.differential[j]));
                        records.push(record(format!("{key} cumulative H={h}"), curve.cumulative[j]));
                    }
                }
            }
        }
        records
    }
}

#[cfg(test)]
mod bundle_test {
    use super::*;
    use crate::{
        metrics::{cadence::SupernovaMetric, simple::NObsMetric},
        observations::{columns::ColumnNames, Filter, Visit},
        slicers::healpix_slicer::HealpixSlicer,
        summary::SummaryStat,
    };

    fn table() -> ObservationTable {
        (0..6)
            .map(|i| {
                Visit::new(60000.0 + i as f64, i, Filter::R, 24.0).with_pointing(0.1, 0.2)
            })
            .collect()
    }

    #[test]
    fn bundle_name() {
        let slicer: Arc<dyn Slicer> = Arc::new(HealpixSlicer::new(1).unwrap());
        let bundle = Bundle::new(Arc::new(NObsMetric), slicer.clone());
        assert_eq!(bundle.name(), "NObs");
        let c = Constraint::parse("night < 3", &ColumnNames::default()).unwrap();
        let bundle = Bundle::new(Arc::new(NObsMetric), slicer)
            .with_run_name("baseline")
            .with_constraint(c);
        assert_eq!(bundle.name(), "baseline NObs [night < 3]");
    }

    #[test]
    fn metric_reducers_are_registered_by_default() {
        let slicer: Arc<dyn Slicer> = Arc::new(HealpixSlicer::new(1).unwrap());
        let bundle = Bundle::new(Arc::new(SupernovaMetric::default()), slicer);
        assert_eq!(bundle.reducers().len(), 3);
    }

    #[test]
    fn single_bundle_run_with_summaries() {
        let slicer: Arc<dyn Slicer> = Arc::new(HealpixSlicer::new(1).unwrap());
        let result = Bundle::new(Arc::new(NObsMetric), slicer)
            .with_summary(Arc::new(SummaryStat::Max))
            .with_summary(Arc::new(SummaryStat::Count))
            .run(&table())
            .unwrap();
        assert_eq!(result.grid.len(), 12);
        assert_eq!(result.summary("Max").and_then(SummaryValue::as_scalar), Some(6.0));

        let records = result.summary_records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.bundle == "NObs"));
    }

    #[test]
    fn masked_summaries_are_written_as_badval() {
        let slicer: Arc<dyn Slicer> = Arc::new(HealpixSlicer::new(1).unwrap());
        let nothing = Constraint::parse("night > 100", &ColumnNames::default()).unwrap();
        let result = Bundle::new(Arc::new(NObsMetric), slicer)
            .with_constraint(nothing)
            .with_summary(Arc::new(SummaryStat::Mean))
            .run(&table())
            .unwrap();
        assert_eq!(result.grid.n_valid(), 0);
        assert_eq!(result.summary("Mean"), Some(&SummaryValue::Scalar(None)));
        let records = result.summary_records();
        assert_eq!(records[0].value, BADVAL);
    }

    #[test]
    fn validation_uses_the_metric_name() {
        use crate::summary::completeness::Completeness;

        let slicer: Arc<dyn Slicer> = Arc::new(HealpixSlicer::new(1).unwrap());
        let points = slicer.slice_points();
        let bundle = Bundle::new(Arc::new(NObsMetric), slicer)
            .with_summary(Arc::new(SummaryStat::Median));
        assert!(bundle.validate(&points).is_ok());
        let bundle = bundle.with_summary(Arc::new(Completeness::default()));
        assert_eq!(
            bundle.validate(&points).unwrap_err(),
            SkysliceError::NotAnObjectGrid("NObs".into())
        );
    }
}
