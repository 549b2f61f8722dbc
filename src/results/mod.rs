//! # Result grids
//!
//! A [`ResultGrid`] holds exactly one cell per slice of the slicer that produced it. A cell is
//! either a [`MetricValue`] or masked (`None`), never both and never absent. Masked cells mark
//! slices where the metric had insufficient data or failed; statistics skip them.
//!
//! Inside the engine masked cells are plain `None`s. The numeric fill value
//! [`BADVAL`](crate::constants::BADVAL) only appears in flat exports ([`export`]), always
//! together with an explicit mask.
pub mod export;

use std::sync::Arc;

use crate::{
    metrics::{MetricValue, NamedReducer},
    skyslice_errors::SkysliceError,
    slicers::SlicePoint,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ResultGrid {
    name: String,
    points: Arc<[SlicePoint]>,
    values: Vec<Option<MetricValue>>,
}

impl ResultGrid {
    /// Fully masked grid over `points`.
    pub fn new(name: impl Into<String>, points: Arc<[SlicePoint]>) -> Self {
        let values = vec![None; points.len()];
        ResultGrid {
            name: name.into(),
            points,
            values,
        }
    }

    /// Grid from one value per point.
    ///
    /// Return
    /// ----------
    /// * [`SkysliceError::SliceIndexOutOfRange`] when the lengths differ.
    pub fn from_values(
        name: impl Into<String>,
        points: Arc<[SlicePoint]>,
        values: Vec<Option<MetricValue>>,
    ) -> Result<Self, SkysliceError> {
        if values.len() != points.len() {
            return Err(SkysliceError::SliceIndexOutOfRange {
                index: values.len(),
                len: points.len(),
            });
        }
        let mut grid = ResultGrid::new(name, points);
        for (index, value) in values.into_iter().enumerate() {
            grid.set(index, value)?;
        }
        Ok(grid)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn points(&self) -> &Arc<[SlicePoint]> {
        &self.points
    }

    pub fn values(&self) -> &[Option<MetricValue>] {
        &self.values
    }

    /// Write one cell, replacing its previous content. A NaN scalar is stored as masked.
    pub fn set(&mut self, index: usize, value: Option<MetricValue>) -> Result<(), SkysliceError> {
        let len = self.values.len();
        let cell = self
            .values
            .get_mut(index)
            .ok_or(SkysliceError::SliceIndexOutOfRange { index, len })?;
        *cell = value.filter(|v| !matches!(v, MetricValue::Scalar(x) if x.is_nan()));
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&MetricValue> {
        self.values.get(index).and_then(Option::as_ref)
    }

    pub fn scalar_at(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(MetricValue::as_scalar)
    }

    pub fn is_masked(&self, index: usize) -> bool {
        self.get(index).is_none()
    }

    /// `true` for every masked cell.
    pub fn mask(&self) -> Vec<bool> {
        self.values.iter().map(Option::is_none).collect()
    }

    pub fn n_valid(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Whether every unmasked cell is a scalar.
    pub fn is_scalar(&self) -> bool {
        self.values.iter().flatten().all(MetricValue::is_scalar)
    }

    /// Unmasked scalar values, in slice order.
    ///
    /// Return
    /// ----------
    /// * [`SkysliceError::NonScalarGrid`] when an unmasked cell is not a scalar.
    pub fn scalar_values(&self) -> Result<Vec<f64>, SkysliceError> {
        self.values
            .iter()
            .flatten()
            .map(|v| {
                v.as_scalar()
                    .ok_or_else(|| SkysliceError::NonScalarGrid(self.name.clone()))
            })
            .collect()
    }

    /// Scalar grid obtained by applying `reducer` to every unmasked cell, named
    /// `"{grid} {reducer}"`. Cells the reducer cannot map stay masked.
    pub fn reduce(&self, reducer: &NamedReducer) -> ResultGrid {
        let values = self
            .values
            .iter()
            .map(|v| {
                v.as_ref()
                    .and_then(|v| reducer.apply(v))
                    .map(MetricValue::Scalar)
            })
            .collect();
        ResultGrid {
            name: format!("{} {}", self.name, reducer.name()),
            points: self.points.clone(),
            values,
        }
    }

    /// Iterate over `(point, cell)` pairs in slice order.
    pub fn iter(&self) -> impl Iterator<Item = (&SlicePoint, Option<&MetricValue>)> {
        self.points
            .iter()
            .zip(self.values.iter().map(Option::as_ref))
    }
}
