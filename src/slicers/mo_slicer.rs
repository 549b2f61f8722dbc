//! # Moving-object slicer
//!
//! Slices a table of moving-object detections by **(object, H value)**. The observation table
//! stores, for every visit where a synthetic object fell in the field, the object's apparent
//! magnitude computed at the orbit's reference absolute magnitude `H_ref`. Evaluating the same
//! orbit at another `H` only shifts that magnitude:
//!
//! ```text
//! mag(H) = mag(H_ref) + (H − H_ref)
//! ```
//!
//! after which a [`Detection`] predicate decides whether each visit still detects the object.
//!
//! Slice layout
//! -----------------
//! Slice `object_index · n_h + h_index` holds the detections of catalog object `object_index`
//! at `h_range[h_index]`, in table order. Objects of the table that are absent from the catalog
//! are ignored.
use crate::{
    constants::{FastHashMap, Magnitude, ObjectId},
    observations::{constraint::Constraint, ObservationTable, Visit},
    orbits::{HRange, OrbitCatalog},
    skyslice_errors::SkysliceError,
};

use super::{Slice, SlicePoint, Slicer};

/// Detectability predicate applied to H-scaled magnitudes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detection {
    /// Detected when `mag ≤ m5`.
    SingleVisitDepth,
    /// Detected when the signal-to-noise ratio `5 · 10^{-0.4 (mag − m5)}` reaches the limit.
    Snr(f64),
}

/// Signal-to-noise ratio of a source of `magnitude` in a visit of depth `five_sigma_depth`.
#[inline]
pub fn signal_to_noise(magnitude: Magnitude, five_sigma_depth: Magnitude) -> f64 {
    5.0 * 10f64.powf(-0.4 * (magnitude - five_sigma_depth))
}

impl Detection {
    pub fn is_detected(&self, magnitude: Magnitude, five_sigma_depth: Magnitude) -> bool {
        match self {
            Detection::SingleVisitDepth => magnitude <= five_sigma_depth,
            Detection::Snr(limit) => signal_to_noise(magnitude, five_sigma_depth) >= *limit,
        }
    }
}

impl Default for Detection {
    fn default() -> Self {
        Detection::SingleVisitDepth
    }
}

#[derive(Debug, Clone)]
pub struct MovingObjectSlicer {
    orbits: OrbitCatalog,
    h_range: HRange,
    detection: Detection,
}

impl MovingObjectSlicer {
    /// Build the slicer and check it against the observation table it will partition.
    ///
    /// Arguments
    /// -----------------
    /// * `orbits`: catalog of synthetic objects (non-empty by construction).
    /// * `h_range`: ascending H grid (non-empty by construction).
    /// * `detection`: detectability predicate on H-scaled magnitudes.
    /// * `table`: observation table the slicer is built for.
    ///
    /// Return
    /// ----------
    /// * [`SkysliceError::NoMatchingObjects`] when no object identifier of `table` belongs to
    ///   the catalog.
    pub fn new(
        orbits: OrbitCatalog,
        h_range: HRange,
        detection: Detection,
        table: &ObservationTable,
    ) -> Result<Self, SkysliceError> {
        if !table
            .object_ids()
            .iter()
            .any(|id| orbits.position(*id).is_some())
        {
            return Err(SkysliceError::NoMatchingObjects);
        }
        Ok(MovingObjectSlicer {
            orbits,
            h_range,
            detection,
        })
    }

    pub fn orbits(&self) -> &OrbitCatalog {
        &self.orbits
    }

    pub fn h_range(&self) -> &HRange {
        &self.h_range
    }

    pub fn n_objects(&self) -> usize {
        self.orbits.len()
    }

    pub fn n_h(&self) -> usize {
        self.h_range.len()
    }

    /// Grid index of `(object_index, h_index)`.
    #[inline]
    pub fn slice_index(&self, object_index: usize, h_index: usize) -> usize {
        object_index * self.n_h() + h_index
    }

    /// Catalog object ids in slice order, one per object block.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.orbits.orbits().iter().map(|o| o.id).collect()
    }
}

impl Slicer for MovingObjectSlicer {
    fn name(&self) -> String {
        format!(
            "MovingObjectSlicer({} objects x {} H)",
            self.n_objects(),
            self.n_h()
        )
    }

    fn n_slices(&self) -> usize {
        self.n_objects() * self.n_h()
    }

    fn slice_points(&self) -> Vec<SlicePoint> {
        self.orbits
            .orbits()
            .iter()
            .enumerate()
            .flat_map(|(object_index, orbit)| {
                self.h_range
                    .values()
                    .iter()
                    .enumerate()
                    .map(move |(h_index, &h)| SlicePoint::Object {
                        object: orbit.id,
                        object_index,
                        h,
                        h_index,
                        orbit: orbit.clone(),
                    })
            })
            .collect()
    }

    fn partition(
        &self,
        table: &ObservationTable,
        constraint: Option<&Constraint>,
    ) -> Result<Vec<Slice>, SkysliceError> {
        // rows of each catalog object, in table order
        let mut rows_by_object: FastHashMap<usize, Vec<&Visit>> = FastHashMap::default();
        for row in table.select(constraint) {
            let visit = &table.visits()[row];
            let Some(object_index) = visit.object.and_then(|id| self.orbits.position(id)) else {
                continue;
            };
            if visit.magnitude.is_none() {
                return Err(SkysliceError::MissingField {
                    field: "magnitude",
                    row,
                });
            }
            rows_by_object.entry(object_index).or_default().push(visit);
        }

        let empty: Vec<&Visit> = Vec::new();
        Ok(self
            .slice_points()
            .into_iter()
            .enumerate()
            .map(|(index, point)| {
                let visits = match &point {
                    SlicePoint::Object {
                        object_index,
                        h,
                        orbit,
                        ..
                    } => {
                        let dmag = h - orbit.h;
                        rows_by_object
                            .get(object_index)
                            .unwrap_or(&empty)
                            .iter()
                            .filter_map(|v| {
                                let magnitude = v.magnitude? + dmag;
                                self.detection
                                    .is_detected(magnitude, v.five_sigma_depth)
                                    .then_some(Visit {
                                        magnitude: Some(magnitude),
                                        ..**v
                                    })
                            })
                            .collect()
                    }
                    _ => Vec::new(),
                };
                Slice {
                    index,
                    point,
                    visits,
                }
            })
            .collect())
    }
}
