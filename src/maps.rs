//! # Sky maps
//!
//! A [`SkyMap`] is a full-sky HEALPix (RING) map of one quantity, for example the stellar
//! density used by crowding-aware metrics. Maps are loaded by the caller and handed to a
//! [`HealpixSlicer`](crate::slicers::healpix_slicer::HealpixSlicer) as explicit
//! `Arc<SkyMap>` handles; every sky slice then carries the map value at its center.
//!
//! The map keeps its own resolution. Lookups at another resolution take the value of the
//! map pixel containing the requested position (nearest pixel, no interpolation).
use crate::{
    constants::Radian,
    healpix::{nside_from_npix, pix_to_radec, radec_to_pix},
    skyslice_errors::SkysliceError,
};

#[derive(Debug, Clone, PartialEq)]
pub struct SkyMap {
    key: String,
    nside: u32,
    values: Vec<f64>,
}

impl SkyMap {
    /// Wrap full-sky values under `key`.
    ///
    /// Return
    /// ----------
    /// * [`SkysliceError::InvalidSkyMap`] when `values.len()` is not `12·nside²` for a valid
    ///   `nside`.
    pub fn new(key: impl Into<String>, values: Vec<f64>) -> Result<Self, SkysliceError> {
        let nside = nside_from_npix(values.len())?;
        Ok(SkyMap {
            key: key.into(),
            nside,
            values,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn nside(&self) -> u32 {
        self.nside
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of the map pixel containing `(ra, dec)`.
    pub fn value_at(&self, ra: Radian, dec: Radian) -> f64 {
        self.values[radec_to_pix(self.nside, ra, dec)]
    }

    /// Value at the center of pixel `pix` of a tessellation of resolution `nside`.
    pub fn value_for_pixel(&self, nside: u32, pix: usize) -> f64 {
        if nside == self.nside {
            return self.values[pix];
        }
        let (ra, dec) = pix_to_radec(nside, pix);
        self.value_at(ra, dec)
    }
}
