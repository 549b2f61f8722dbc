//! # Constants and type definitions for skyslice
//!
//! This module centralizes the **numeric constants**, **conversion factors**, and **common type
//! aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - The missing-data sentinel used when result grids are exported
//! - Unit conversions (degrees ↔ radians, years ↔ days)
//! - Orbital constants needed to turn semi-major axes into periods
//! - Core type aliases for times, magnitudes and identifiers

// -------------------------------------------------------------------------------------------------
// Sentinel
// -------------------------------------------------------------------------------------------------

/// Fill value written in place of masked cells when a grid is exported to flat arrays.
///
/// Inside the engine a missing result is always `None`; this value only appears at the
/// export boundary, together with an explicit mask.
pub const BADVAL: f64 = -666.0;

// -------------------------------------------------------------------------------------------------
// Unit conversions and physical constants
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// π/2
pub const HALF_PI: f64 = std::f64::consts::FRAC_PI_2;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Number of days in a Julian year
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Gaussian gravitational constant k (AU^{3/2} / day)
pub const GAUSS_GRAV: f64 = 0.01720209895;

/// Lower bound (nm) of the rest-frame wavelength range kept by the supernova cadence metric
pub const REST_FRAME_MIN_WAVELENGTH: f64 = 300.0;

/// Upper bound (nm) of the rest-frame wavelength range kept by the supernova cadence metric
pub const REST_FRAME_MAX_WAVELENGTH: f64 = 900.0;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Seeing FWHM in arcseconds
pub type ArcSec = f64;
/// Apparent or absolute magnitude
pub type Magnitude = f64;
/// Modified Julian Date (days)
pub type MJD = f64;
/// Time span in days
pub type Days = f64;
/// Identifier of a synthetic moving object in the orbit catalog
pub type ObjectId = u64;

/// Hash map with the `ahash` hasher, used for lookups keyed by small integers or names
pub type FastHashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

/// Hash set with the `ahash` hasher
pub type FastHashSet<K> = std::collections::HashSet<K, ahash::RandomState>;
