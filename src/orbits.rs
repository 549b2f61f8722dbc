//! # Orbit catalog and absolute-magnitude grid
//!
//! Moving-object runs evaluate every synthetic object of an orbit catalog at every value of an
//! ascending grid of absolute magnitudes H. This module holds both inputs:
//!
//! * [`OrbitalElements`] – Keplerian elements, used by period-aware metrics.
//! * [`Orbit`] / [`OrbitCatalog`] – object identity, reference H and optional elements.
//! * [`HRange`] – validated, strictly ascending H grid.
use std::sync::Arc;

use crate::{
    constants::{FastHashMap, Magnitude, ObjectId, DPI, GAUSS_GRAV, MJD},
    skyslice_errors::SkysliceError,
};

/// Reduce an angle to the principal interval `[0, 2π)`.
#[inline]
pub fn principal_angle(a: f64) -> f64 {
    a.rem_euclid(DPI)
}

/// Keplerian orbital elements
/// Units:
/// * `reference_epoch`: MJD (Modified Julian Date)
/// * `semi_major_axis`: AU (Astronomical Units)
/// * `eccentricity`: unitless
/// * `inclination`: radians
/// * `ascending_node_longitude`: radians
/// * `periapsis_argument`: radians
/// * `mean_anomaly`: radians
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitalElements {
    pub reference_epoch: MJD,
    pub semi_major_axis: f64,
    pub eccentricity: f64,
    pub inclination: f64,
    pub ascending_node_longitude: f64,
    pub periapsis_argument: f64,
    pub mean_anomaly: f64,
}

impl OrbitalElements {
    /// Orbital period in days, `P = 2π a^{3/2} / k`.
    pub fn period(&self) -> f64 {
        DPI / GAUSS_GRAV * self.semi_major_axis.powf(1.5)
    }

    /// Mean motion in radians per day.
    pub fn mean_motion(&self) -> f64 {
        DPI / self.period()
    }

    /// Mean anomaly propagated linearly to `time`, reduced to `[0, 2π)`.
    pub fn mean_anomaly_at(&self, time: MJD) -> f64 {
        principal_angle(self.mean_anomaly + self.mean_motion() * (time - self.reference_epoch))
    }
}

/// One synthetic object of the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Orbit {
    pub id: ObjectId,
    /// Absolute magnitude at which the apparent magnitudes of the observation table were
    /// computed.
    pub h: Magnitude,
    pub elements: Option<OrbitalElements>,
}

impl Orbit {
    pub fn new(id: ObjectId, h: Magnitude) -> Self {
        Orbit {
            id,
            h,
            elements: None,
        }
    }

    pub fn with_elements(mut self, elements: OrbitalElements) -> Self {
        self.elements = Some(elements);
        self
    }
}

/// Non-empty catalog of orbits with unique identifiers, in insertion order.
#[derive(Debug, Clone)]
pub struct OrbitCatalog {
    orbits: Vec<Arc<Orbit>>,
    index: FastHashMap<ObjectId, usize>,
}

impl OrbitCatalog {
    /// Build a catalog.
    ///
    /// Return
    /// ----------
    /// * [`SkysliceError::EmptyOrbitCatalog`] when `orbits` is empty.
    /// * [`SkysliceError::DuplicateObject`] when an identifier appears twice.
    pub fn new(orbits: Vec<Orbit>) -> Result<Self, SkysliceError> {
        if orbits.is_empty() {
            return Err(SkysliceError::EmptyOrbitCatalog);
        }

        let mut index = FastHashMap::default();
        for (i, orbit) in orbits.iter().enumerate() {
            if index.insert(orbit.id, i).is_some() {
                return Err(SkysliceError::DuplicateObject(orbit.id));
            }
        }

        Ok(OrbitCatalog {
            orbits: orbits.into_iter().map(Arc::new).collect(),
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.orbits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orbits.is_empty()
    }

    pub fn orbits(&self) -> &[Arc<Orbit>] {
        &self.orbits
    }

    /// Position of an object in the catalog.
    pub fn position(&self, id: ObjectId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn get(&self, id: ObjectId) -> Option<&Arc<Orbit>> {
        self.position(id).map(|i| &self.orbits[i])
    }
}

/// Strictly ascending, finite, non-empty grid of absolute magnitudes.
#[derive(Debug, Clone, PartialEq)]
pub struct HRange {
    values: Vec<Magnitude>,
}

impl HRange {
    pub fn new(values: Vec<Magnitude>) -> Result<Self, SkysliceError> {
        if values.is_empty() {
            return Err(SkysliceError::EmptyHRange);
        }
        if let Some(bad) = values.iter().find(|h| !h.is_finite()) {
            return Err(SkysliceError::UnsortedHRange(format!(
                "non-finite value {bad}"
            )));
        }
        if let Some(w) = values.windows(2).find(|w| w[1] <= w[0]) {
            return Err(SkysliceError::UnsortedHRange(format!(
                "{} is not greater than {}",
                w[1], w[0]
            )));
        }
        Ok(HRange { values })
    }

    /// Half-open grid `[min, max)` with spacing `step`.
    pub fn arange(min: Magnitude, max: Magnitude, step: f64) -> Result<Self, SkysliceError> {
        if !(step > 0.0) || !min.is_finite() || !max.is_finite() {
            return Err(SkysliceError::UnsortedHRange(format!(
                "cannot build a grid from {min} to {max} by {step}"
            )));
        }
        let n = ((max - min) / step).ceil().max(0.0) as usize;
        HRange::new((0..n).map(|i| min + i as f64 * step).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Magnitude] {
        &self.values
    }
}
