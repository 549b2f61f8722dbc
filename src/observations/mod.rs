//! # Observation table
//!
//! In-memory representation of a survey visit log, shared read-only by every slicer and metric
//! of a run.
//!
//! ## Overview
//!
//! - [`Filter`] – photometric band of a visit, with its effective wavelength.
//! - [`Visit`] – one record of the log (time, night, band, depth, and the optional pointing,
//!   seeing and moving-object detection columns).
//! - [`ObservationTable`] – immutable, cheaply clonable (`Arc`) ordered collection of visits.
//!
//! Column naming lives in [`columns`], row predicates in [`constraint`].
//!
//! Units
//! -----------------
//! * `time`: MJD (days)
//! * `ra`, `dec`: radians
//! * `seeing`: arcseconds (FWHM)
//! * `five_sigma_depth`, `magnitude`: magnitudes
pub mod columns;
pub mod constraint;

use std::{fmt, str::FromStr, sync::Arc};

use crate::{
    constants::{ArcSec, FastHashSet, Magnitude, ObjectId, Radian, MJD},
    skyslice_errors::SkysliceError,
};

use self::constraint::Constraint;

/// Photometric band of a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Filter {
    U,
    G,
    R,
    I,
    Z,
    Y,
}

impl Filter {
    pub const ALL: [Filter; 6] = [
        Filter::U,
        Filter::G,
        Filter::R,
        Filter::I,
        Filter::Z,
        Filter::Y,
    ];

    /// Effective wavelength of the band, in nanometers.
    pub fn effective_wavelength(&self) -> f64 {
        match self {
            Filter::U => 375.0,
            Filter::G => 476.0,
            Filter::R => 621.0,
            Filter::I => 754.0,
            Filter::Z => 870.0,
            Filter::Y => 980.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Filter::U => "u",
            Filter::G => "g",
            Filter::R => "r",
            Filter::I => "i",
            Filter::Z => "z",
            Filter::Y => "y",
        }
    }
}

impl FromStr for Filter {
    type Err = SkysliceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "u" => Ok(Filter::U),
            "g" => Ok(Filter::G),
            "r" => Ok(Filter::R),
            "i" => Ok(Filter::I),
            "z" => Ok(Filter::Z),
            "y" => Ok(Filter::Y),
            _ => Err(SkysliceError::UnknownFilter(s.to_string())),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record of the observation log.
///
/// The mandatory columns are the visit time, the night counter, the band and the five-sigma
/// limiting depth. Spatial runs additionally need the pointing (`ra`, `dec`); moving-object runs
/// need the object identifier and the apparent magnitude of the object at its reference H.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visit {
    pub time: MJD,
    pub night: i32,
    pub filter: Filter,
    pub five_sigma_depth: Magnitude,
    pub seeing: Option<ArcSec>,
    pub ra: Option<Radian>,
    pub dec: Option<Radian>,
    pub object: Option<ObjectId>,
    pub magnitude: Option<Magnitude>,
}

impl Visit {
    pub fn new(time: MJD, night: i32, filter: Filter, five_sigma_depth: Magnitude) -> Self {
        Visit {
            time,
            night,
            filter,
            five_sigma_depth,
            seeing: None,
            ra: None,
            dec: None,
            object: None,
            magnitude: None,
        }
    }

    pub fn with_seeing(mut self, seeing: ArcSec) -> Self {
        self.seeing = Some(seeing);
        self
    }

    /// Attach a pointing, angles in radians.
    pub fn with_pointing(mut self, ra: Radian, dec: Radian) -> Self {
        self.ra = Some(ra);
        self.dec = Some(dec);
        self
    }

    /// Attach a moving-object detection: the object id and its apparent magnitude computed at
    /// the orbit's reference H.
    pub fn with_detection(mut self, object: ObjectId, magnitude: Magnitude) -> Self {
        self.object = Some(object);
        self.magnitude = Some(magnitude);
        self
    }
}

/// Immutable, ordered visit log.
///
/// Cloning is cheap: the rows live behind an `Arc` and are never mutated once the table is
/// built. Derived tables (e.g. after a stacker) are new tables.
#[derive(Debug, Clone)]
pub struct ObservationTable {
    visits: Arc<[Visit]>,
}

impl ObservationTable {
    pub fn new(visits: Vec<Visit>) -> Self {
        ObservationTable {
            visits: visits.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    pub fn visits(&self) -> &[Visit] {
        &self.visits
    }

    pub fn get(&self, row: usize) -> Option<&Visit> {
        self.visits.get(row)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Visit> {
        self.visits.iter()
    }

    /// Row indices satisfying the constraint, in table order (all rows when `None`).
    pub fn select(&self, constraint: Option<&Constraint>) -> Vec<usize> {
        match constraint {
            None => (0..self.visits.len()).collect(),
            Some(c) => self
                .visits
                .iter()
                .enumerate()
                .filter(|(_, v)| c.matches(v))
                .map(|(i, _)| i)
                .collect(),
        }
    }

    /// Distinct object identifiers present in the table.
    pub fn object_ids(&self) -> FastHashSet<ObjectId> {
        self.visits.iter().filter_map(|v| v.object).collect()
    }
}

impl From<Vec<Visit>> for ObservationTable {
    fn from(visits: Vec<Visit>) -> Self {
        ObservationTable::new(visits)
    }
}

impl FromIterator<Visit> for ObservationTable {
    fn from_iter<T: IntoIterator<Item = Visit>>(iter: T) -> Self {
        ObservationTable::new(iter.into_iter().collect())
    }
}
