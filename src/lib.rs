//! # skyslice
//!
//! Slicing, execution and aggregation engine for survey cadence metrics.
//!
//! An [`ObservationTable`](observations::ObservationTable) of visits is partitioned by a
//! [`Slicer`](slicers::Slicer) (sky cells or object × H), every slice is fed to the
//! [`Metric`](metrics::Metric)s of the [`Bundle`](bundle::Bundle)s sharing that partition, and
//! the per-slice results land in masked [`ResultGrid`](results::ResultGrid)s that
//! [`SummaryReducer`](summary::SummaryReducer)s turn into scalars or completeness curves.
//!
//! Cargo features
//! -----------------
//! * `parallel` – evaluate the slices of a group on the `rayon` pool.
//! * `progress` – `indicatif` progress bars during evaluation.
pub mod bundle;
pub mod constants;
pub mod execution;
pub mod healpix;
pub mod maps;
pub mod metrics;
pub mod observations;
pub mod orbits;
pub mod results;
pub mod skyslice_errors;
pub mod slicers;
pub mod stackers;
pub mod summary;
