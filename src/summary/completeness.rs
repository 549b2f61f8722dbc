//! # H-magnitude completeness
//!
//! Turns an object × H grid of per-slice scores (typically discovery chances) into a
//! [`CompletenessCurve`].
//!
//! For every `H_j` of the grid's H axis:
//!
//! * **differential** completeness: objects with a score ≥ `threshold` at `H_j`, divided by
//!   the objects with an unmasked score at `H_j` (0 when there are none);
//! * **cumulative** completeness: objects whose first detection happens at some `H ≤ H_j`,
//!   divided by the total object population. It is non-decreasing by construction and its
//!   last entry is the union of all detections.
//!
//! As a [`SummaryReducer`], a grid whose cells are all masked summarizes to a masked value
//! (`SummaryValue::Scalar(None)`), not to a zero curve.
//!
//! Errors
//! -----------------
//! * [`SkysliceError::NotAnObjectGrid`] – the grid was not produced by a moving-object slicer.
//! * [`SkysliceError::EmptyPopulation`] – the grid has no slice at all.
//! * [`SkysliceError::NonScalarGrid`] – scores must be scalars (reduce compound grids first).
use std::sync::Arc;

use crate::{
    constants::Magnitude,
    metrics::MetricValue,
    results::ResultGrid,
    skyslice_errors::SkysliceError,
    slicers::SlicePoint,
};

use super::{SummaryReducer, SummaryValue};

/// Which completeness series to turn into a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletenessKind {
    Differential,
    Cumulative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessCurve {
    pub h: Vec<Magnitude>,
    pub differential: Vec<f64>,
    pub cumulative: Vec<f64>,
}

impl CompletenessCurve {
    pub fn len(&self) -> usize {
        self.h.len()
    }

    pub fn is_empty(&self) -> bool {
        self.h.is_empty()
    }

    /// Scalar grid over the H axis holding one of the two series, with no masked cell.
    pub fn to_grid(
        &self,
        name: impl Into<String>,
        kind: CompletenessKind,
    ) -> Result<ResultGrid, SkysliceError> {
        let points: Arc<[SlicePoint]> = self
            .h
            .iter()
            .enumerate()
            .map(|(h_index, &h)| SlicePoint::HBin { h_index, h })
            .collect();
        let series = match kind {
            CompletenessKind::Differential => &self.differential,
            CompletenessKind::Cumulative => &self.cumulative,
        };
        let values = series.iter().map(|&v| Some(MetricValue::Scalar(v))).collect();
        ResultGrid::from_values(name, points, values)
    }
}

/// Completeness summary of an object × H grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completeness {
    pub threshold: f64,
}

impl Default for Completeness {
    fn default() -> Self {
        Completeness { threshold: 1.0 }
    }
}

impl Completeness {
    pub fn new(threshold: f64) -> Self {
        Completeness { threshold }
    }

    /// Compute the completeness curve of `grid`. A fully masked grid gives a zero curve.
    pub fn curve(&self, grid: &ResultGrid) -> Result<CompletenessCurve, SkysliceError> {
        if grid.is_empty() {
            return Err(SkysliceError::EmptyPopulation);
        }

        let mut cells = Vec::with_capacity(grid.len());
        let mut n_objects = 0;
        let mut h_axis: Vec<Option<Magnitude>> = Vec::new();
        for (point, value) in grid.iter() {
            let SlicePoint::Object {
                object_index,
                h_index,
                h,
                ..
            } = point
            else {
                return Err(SkysliceError::NotAnObjectGrid(grid.name().to_string()));
            };
            let score = match value {
                None => None,
                Some(MetricValue::Scalar(v)) => Some(*v),
                Some(_) => return Err(SkysliceError::NonScalarGrid(grid.name().to_string())),
            };
            n_objects = n_objects.max(object_index + 1);
            if h_axis.len() <= *h_index {
                h_axis.resize(h_index + 1, None);
            }
            h_axis[*h_index] = Some(*h);
            cells.push((*object_index, *h_index, score));
        }

        let n_h = h_axis.len();
        let mut observed = vec![0usize; n_h];
        let mut detected = vec![0usize; n_h];
        let mut first_detection: Vec<Option<usize>> = vec![None; n_objects];

        for (object_index, h_index, score) in cells {
            let Some(score) = score else { continue };
            observed[h_index] += 1;
            if score >= self.threshold {
                detected[h_index] += 1;
                let first = &mut first_detection[object_index];
                *first = Some(first.map_or(h_index, |f| f.min(h_index)));
            }
        }

        let differential = observed
            .iter()
            .zip(&detected)
            .map(|(&o, &d)| if o == 0 { 0.0 } else { d as f64 / o as f64 })
            .collect();

        let mut found_at = vec![0usize; n_h];
        for j in first_detection.into_iter().flatten() {
            found_at[j] += 1;
        }
        let cumulative = found_at
            .iter()
            .scan(0usize, |acc, &n| {
                *acc += n;
                Some(*acc as f64 / n_objects as f64)
            })
            .collect();

        Ok(CompletenessCurve {
            h: h_axis.into_iter().map(|h| h.unwrap_or(f64::NAN)).collect(),
            differential,
            cumulative,
        })
    }
}

impl SummaryReducer for Completeness {
    fn name(&self) -> String {
        "Completeness".into()
    }

    fn validate(&self, grid: &str, points: &[SlicePoint]) -> Result<(), SkysliceError> {
        if points.is_empty() {
            return Err(SkysliceError::EmptyPopulation);
        }
        if !points.iter().all(|p| matches!(p, SlicePoint::Object { .. })) {
            return Err(SkysliceError::NotAnObjectGrid(grid.to_string()));
        }
        Ok(())
    }

    fn reduce(&self, grid: &ResultGrid) -> Result<SummaryValue, SkysliceError> {
        let curve = self.curve(grid)?;
        if grid.n_valid() == 0 {
            return Ok(SummaryValue::Scalar(None));
        }
        Ok(SummaryValue::Curve(curve))
    }
}
