//! # Slicers
//!
//! A [`Slicer`] partitions an [`ObservationTable`] into independent [`Slice`]s, one per point of
//! its tessellation. Every slice carries:
//!
//! * its index in `0..n_slices()` (also its cell in the result grid),
//! * a [`SlicePoint`] describing where (or what) it is,
//! * its own copy of the visits relevant to it.
//!
//! Two slicers are provided:
//!
//! * [`HealpixSlicer`](healpix_slicer::HealpixSlicer) – one slice per HEALPix pixel, holding the
//!   visits whose pointing falls in that pixel.
//! * [`MovingObjectSlicer`](mo_slicer::MovingObjectSlicer) – one slice per (object, H value),
//!   holding the detectable observations of that object once scaled to H.
//!
//! Invariants
//! -----------------
//! * `partition(table, c).len() == n_slices()`, whatever the constraint.
//! * `partition(..)[i].index == i`.
//! * Partitioning is deterministic and never mutates the table.
pub mod healpix_slicer;
pub mod mo_slicer;

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    constants::{Magnitude, ObjectId, Radian},
    observations::{constraint::Constraint, ObservationTable, Visit},
    orbits::Orbit,
    skyslice_errors::SkysliceError,
};

/// Identity and metadata of one slice.
#[derive(Debug, Clone, PartialEq)]
pub enum SlicePoint {
    /// A HEALPix cell; `maps` holds the value of every attached sky map at the cell center.
    Sky {
        pixel: usize,
        ra: Radian,
        dec: Radian,
        maps: BTreeMap<String, f64>,
    },
    /// One object of the orbit catalog evaluated at one H value.
    Object {
        object: ObjectId,
        object_index: usize,
        h: Magnitude,
        h_index: usize,
        orbit: Arc<Orbit>,
    },
    /// One H value of a completeness curve turned back into a grid.
    HBin { h_index: usize, h: Magnitude },
}

impl SlicePoint {
    pub fn h(&self) -> Option<Magnitude> {
        match self {
            SlicePoint::Object { h, .. } | SlicePoint::HBin { h, .. } => Some(*h),
            SlicePoint::Sky { .. } => None,
        }
    }

    pub fn map_value(&self, key: &str) -> Option<f64> {
        match self {
            SlicePoint::Sky { maps, .. } => maps.get(key).copied(),
            _ => None,
        }
    }
}

/// One partition of the observation table.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub index: usize,
    pub point: SlicePoint,
    pub visits: Vec<Visit>,
}

impl Slice {
    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }
}

pub trait Slicer: Send + Sync {
    /// Short name used in logs and grid names.
    fn name(&self) -> String;

    /// Number of slices of every partition produced by this slicer.
    fn n_slices(&self) -> usize;

    /// Identity of every slice, in index order, without touching any observation.
    fn slice_points(&self) -> Vec<SlicePoint>;

    /// Partition the rows of `table` that satisfy `constraint`.
    ///
    /// Return
    /// ----------
    /// * Exactly [`Slicer::n_slices`] slices, in index order.
    /// * A configuration error when the table lacks a column the slicer needs.
    fn partition(
        &self,
        table: &ObservationTable,
        constraint: Option<&Constraint>,
    ) -> Result<Vec<Slice>, SkysliceError>;
}
