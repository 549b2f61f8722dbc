//! # Execution groups
//!
//! An [`ExecutionGroup`] runs many bundles against one [`ObservationTable`] while partitioning
//! the table as few times as possible.
//!
//! Bundles are grouped by *(slicer instance, constraint key)*: two bundles share a group when
//! they hold the same `Arc` slicer handle and constraints with equal
//! [`group_key`](Constraint::group_key)s. Groups keep the insertion order of their first bundle.
//!
//! Run phases
//! -----------------
//! 1. **Validate** the summary reducers of every bundle against the slice points of its slicer,
//!    then **partition** every group once. Any error here is a configuration error and aborts
//!    the run before a single slice is evaluated.
//! 2. **Evaluate**: for every slice of a group, run the metric of every member bundle
//!    (interleaved). A metric error masks that one cell, emits a `tracing` warning and is
//!    recorded as an [`EvaluationWarning`]; the run continues.
//! 3. **Finish**: every bundle derives its reduced grids and summary values.
//!
//! Features
//! -----------------
//! * `parallel` – slices of a group are evaluated on the `rayon` pool; cells are written
//!   afterwards on the calling thread, so each cell keeps a single writer.
//! * `progress` – an `indicatif` progress bar per group.
#[cfg(feature = "progress")]
pub mod progress_bar;

use std::{fmt, sync::Arc};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    bundle::{Bundle, BundleResult},
    constants::FastHashMap,
    metrics::MetricValue,
    observations::{constraint::Constraint, ObservationTable},
    results::{export::SummaryRecord, ResultGrid},
    skyslice_errors::SkysliceError,
    slicers::{Slice, SlicePoint, Slicer},
};

#[cfg(feature = "progress")]
use self::progress_bar::GroupProgress;

/// A recovered metric failure on one slice.
#[derive(Debug)]
pub struct EvaluationWarning {
    pub bundle: String,
    pub slice: usize,
    pub error: SkysliceError,
}

impl fmt::Display for EvaluationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (slice {}): {}", self.bundle, self.slice, self.error)
    }
}

/// Distribution of the number of visits per slice of a partition.
///
/// Quantiles use the nearest rank on `[0, n − 1]`.
///
/// Display
/// -----------------
/// Compact by default (`min=0, p25=1, median=4, p95=12, max=20, empty=3/12`), multi-line with
/// the alternate flag (`{:#}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceOccupancyStats {
    pub min: usize,
    pub p25: usize,
    pub median: usize,
    pub p95: usize,
    pub max: usize,
    pub empty: usize,
    pub n_slices: usize,
}

impl SliceOccupancyStats {
    /// Statistics of the slice sizes; `None` for a partition without slices.
    pub fn from_slices(slices: &[Slice]) -> Option<Self> {
        let mut counts: Vec<usize> = slices.iter().map(Slice::len).collect();
        if counts.is_empty() {
            return None;
        }
        counts.sort_unstable();

        #[inline]
        fn q_index(n: usize, q: f64) -> usize {
            let pos = q * (n as f64 - 1.0);
            let idx = pos.round() as isize;
            idx.clamp(0, (n as isize) - 1) as usize
        }

        let n = counts.len();
        Some(SliceOccupancyStats {
            min: counts[0],
            p25: counts[q_index(n, 0.25)],
            median: counts[q_index(n, 0.50)],
            p95: counts[q_index(n, 0.95)],
            max: counts[n - 1],
            empty: counts.iter().take_while(|&&c| c == 0).count(),
            n_slices: n,
        })
    }
}

impl fmt::Display for SliceOccupancyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Visits per slice - summary")?;
            writeln!(f, "--------------------------")?;
            writeln!(f, "min    : {}", self.min)?;
            writeln!(f, "p25    : {}", self.p25)?;
            writeln!(f, "median : {}", self.median)?;
            writeln!(f, "p95    : {}", self.p95)?;
            writeln!(f, "max    : {}", self.max)?;
            write!(f, "empty  : {}/{}", self.empty, self.n_slices)
        } else {
            write!(
                f,
                "min={}, p25={}, median={}, p95={}, max={}, empty={}/{}",
                self.min, self.p25, self.median, self.p95, self.max, self.empty, self.n_slices
            )
        }
    }
}

/// What happened to one (slicer, constraint) group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupReport {
    pub slicer: String,
    pub constraint: Option<String>,
    pub bundles: Vec<String>,
    pub n_slices: usize,
    pub occupancy: Option<SliceOccupancyStats>,
}

/// Output of [`ExecutionGroup::run`].
#[derive(Debug)]
pub struct RunReport {
    /// One result per bundle, in insertion order.
    pub results: Vec<BundleResult>,
    pub warnings: Vec<EvaluationWarning>,
    /// Number of `Slicer::partition` calls made.
    pub partitions: usize,
    pub groups: Vec<GroupReport>,
}

impl RunReport {
    /// First result whose bundle name is `name`.
    pub fn result(&self, name: &str) -> Option<&BundleResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn summary_records(&self) -> Vec<SummaryRecord> {
        self.results
            .iter()
            .flat_map(BundleResult::summary_records)
            .collect()
    }
}

/// Bundles sharing a slicer instance and a constraint key.
struct Group {
    slicer: Arc<dyn Slicer>,
    constraint: Option<Constraint>,
    members: Vec<usize>,
}

impl Group {
    fn label(&self) -> String {
        match &self.constraint {
            Some(c) => format!("{} [{}]", self.slicer.name(), c.key()),
            None => self.slicer.name(),
        }
    }
}

type GroupKey = (usize, Option<String>);

#[derive(Debug, Clone, Default)]
pub struct ExecutionGroup {
    bundles: Vec<Bundle>,
}

impl ExecutionGroup {
    pub fn new() -> Self {
        ExecutionGroup::default()
    }

    pub fn with_bundle(mut self, bundle: Bundle) -> Self {
        self.bundles.push(bundle);
        self
    }

    pub fn push(&mut self, bundle: Bundle) {
        self.bundles.push(bundle);
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    /// Number of distinct (slicer, constraint) groups.
    pub fn n_groups(&self) -> usize {
        self.groups().len()
    }

    fn groups(&self) -> Vec<Group> {
        let mut index: FastHashMap<GroupKey, usize> = FastHashMap::default();
        let mut groups: Vec<Group> = Vec::new();
        for (b, bundle) in self.bundles.iter().enumerate() {
            let key = (
                Arc::as_ptr(bundle.slicer()) as *const () as usize,
                bundle.constraint().map(Constraint::group_key),
            );
            let g = *index.entry(key).or_insert_with(|| {
                groups.push(Group {
                    slicer: bundle.slicer().clone(),
                    constraint: bundle.constraint().cloned(),
                    members: Vec::new(),
                });
                groups.len() - 1
            });
            groups[g].members.push(b);
        }
        groups
    }

    /// Run every bundle against `table`.
    ///
    /// Return
    /// ----------
    /// * A [`RunReport`] holding one [`BundleResult`] per bundle, in insertion order.
    /// * A configuration error from summary validation or partitioning, raised before any
    ///   slice is evaluated.
    pub fn run(&self, table: &ObservationTable) -> Result<RunReport, SkysliceError> {
        let groups = self.groups();
        info!(
            bundles = self.bundles.len(),
            groups = groups.len(),
            visits = table.len(),
            "starting run"
        );

        for group in &groups {
            let members: Vec<&Bundle> = group.members.iter().map(|&b| &self.bundles[b]).collect();
            if members.iter().all(|b| b.summaries().is_empty()) {
                continue;
            }
            let points = group.slicer.slice_points();
            for bundle in members {
                bundle.validate(&points)?;
            }
        }

        let mut partitions = Vec::with_capacity(groups.len());
        for group in &groups {
            let slices = group
                .slicer
                .partition(table, group.constraint.as_ref())?;
            debug!(
                group = %group.label(),
                members = group.members.len(),
                slices = slices.len(),
                "partitioned"
            );
            partitions.push(slices);
        }

        let mut grids: Vec<Option<ResultGrid>> = vec![None; self.bundles.len()];
        let mut warnings = Vec::new();
        let mut reports = Vec::with_capacity(groups.len());

        for (group, slices) in groups.iter().zip(&partitions) {
            let points: Arc<[SlicePoint]> = slices.iter().map(|s| s.point.clone()).collect();
            let mut group_grids: Vec<ResultGrid> = group
                .members
                .iter()
                .map(|&b| ResultGrid::new(self.bundles[b].metric().name(), points.clone()))
                .collect();

            for (slice, outcomes) in self.evaluate(group, slices) {
                for ((&b, grid), outcome) in group.members.iter().zip(&mut group_grids).zip(outcomes) {
                    match outcome {
                        Ok(value) => grid.set(slice, value)?,
                        Err(error) => {
                            let bundle = self.bundles[b].name();
                            warn!(bundle = %bundle, slice, error = %error, "metric evaluation failed");
                            grid.set(slice, None)?;
                            warnings.push(EvaluationWarning { bundle, slice, error });
                        }
                    }
                }
            }

            reports.push(GroupReport {
                slicer: group.slicer.name(),
                constraint: group.constraint.as_ref().map(|c| c.key().to_string()),
                bundles: group.members.iter().map(|&b| self.bundles[b].name()).collect(),
                n_slices: slices.len(),
                occupancy: SliceOccupancyStats::from_slices(slices),
            });
            for (&b, grid) in group.members.iter().zip(group_grids) {
                grids[b] = Some(grid);
            }
        }

        let results = self
            .bundles
            .iter()
            .zip(grids)
            .filter_map(|(bundle, grid)| grid.map(|g| bundle.finish(g)))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            partitions = partitions.len(),
            warnings = warnings.len(),
            "run complete"
        );
        Ok(RunReport {
            results,
            warnings,
            partitions: partitions.len(),
            groups: reports,
        })
    }

    /// Metric outcomes of every member, for every slice of a group.
    fn evaluate_slice(
        &self,
        group: &Group,
        slice: &Slice,
    ) -> Vec<Result<Option<MetricValue>, SkysliceError>> {
        group
            .members
            .iter()
            .map(|&b| self.bundles[b].metric().run(slice))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate(&self, group: &Group, slices: &[Slice]) -> Vec<(usize, Vec<SliceOutcome>)> {
        #[cfg(feature = "progress")]
        let mut progress = GroupProgress::new(slices.len(), &group.label());

        let outcomes = slices
            .iter()
            .map(|slice| {
                let out = (slice.index, self.evaluate_slice(group, slice));
                #[cfg(feature = "progress")]
                progress.tick();
                out
            })
            .collect();

        #[cfg(feature = "progress")]
        progress.finish();
        outcomes
    }

    #[cfg(feature = "parallel")]
    fn evaluate(&self, group: &Group, slices: &[Slice]) -> Vec<(usize, Vec<SliceOutcome>)> {
        #[cfg(feature = "progress")]
        let progress = GroupProgress::new(slices.len(), &group.label());

        let outcomes = slices
            .par_iter()
            .map(|slice| {
                let out = (slice.index, self.evaluate_slice(group, slice));
                #[cfg(feature = "progress")]
                progress.inc();
                out
            })
            .collect();

        #[cfg(feature = "progress")]
        progress.finish();
        outcomes
    }
}

type SliceOutcome = Result<Option<MetricValue>, SkysliceError>;
