//! # HEALPix RING tessellation
//!
//! Minimal HEALPix support for the spatial slicer and sky maps: resolution checks and the
//! RING-scheme conversions between pixel indices and sky positions.
//!
//! Conventions
//! -----------------
//! * `theta` is the colatitude in `[0, π]`, `phi` the longitude in `[0, 2π)`.
//! * Equatorial helpers take `ra`/`dec` in radians with `theta = π/2 − dec`, `phi = ra`.
//! * A resolution `nside` is a power of two between 1 and 8192 and yields `12·nside²` pixels.
use crate::{
    constants::{Radian, DPI, HALF_PI},
    skyslice_errors::SkysliceError,
};

/// Largest supported resolution (order 13).
pub const MAX_NSIDE: u32 = 8192;

pub fn is_valid_nside(nside: u32) -> bool {
    nside.is_power_of_two() && nside <= MAX_NSIDE
}

pub fn validate_nside(nside: u32) -> Result<(), SkysliceError> {
    if is_valid_nside(nside) {
        Ok(())
    } else {
        Err(SkysliceError::InvalidNside(nside))
    }
}

/// Number of pixels at resolution `nside`.
#[inline]
pub fn npix(nside: u32) -> usize {
    12 * (nside as usize) * (nside as usize)
}

/// Resolution of a full-sky map with `npix` pixels.
pub fn nside_from_npix(npix: usize) -> Result<u32, SkysliceError> {
    if npix == 0 || npix % 12 != 0 {
        return Err(SkysliceError::InvalidSkyMap(npix));
    }
    let nside = isqrt((npix / 12) as u64);
    if nside * nside * 12 != npix as u64 || !is_valid_nside(nside as u32) {
        return Err(SkysliceError::InvalidSkyMap(npix));
    }
    Ok(nside as u32)
}

#[inline]
fn isqrt(x: u64) -> u64 {
    let mut r = (x as f64).sqrt() as u64;
    while r * r > x {
        r -= 1;
    }
    while (r + 1) * (r + 1) <= x {
        r += 1;
    }
    r
}

/// RING pixel containing the direction `(theta, phi)`.
pub fn ang2pix_ring(nside: u32, theta: Radian, phi: Radian) -> usize {
    let n = nside as i64;
    let npix = 12 * n * n;
    let ncap = 2 * n * (n - 1);

    let z = theta.cos();
    let za = z.abs();
    // longitude in units of quarter turns, in [0, 4]
    let tt = phi.rem_euclid(DPI) / HALF_PI;

    let pix = if za <= 2.0 / 3.0 {
        let temp1 = n as f64 * (0.5 + tt);
        let temp2 = n as f64 * z * 0.75;
        let jp = (temp1 - temp2) as i64;
        let jm = (temp1 + temp2) as i64;
        let ir = n + 1 + jp - jm;
        let kshift = 1 - (ir & 1);
        let ip = ((jp + jm - n + kshift + 1) / 2).rem_euclid(4 * n);
        ncap + (ir - 1) * 4 * n + ip
    } else {
        let tp = tt - tt.floor();
        let tmp = n as f64 * (3.0 * (1.0 - za)).sqrt();
        let jp = (tp * tmp) as i64;
        let jm = ((1.0 - tp) * tmp) as i64;
        let ir = jp + jm + 1;
        let ip = ((tt * ir as f64) as i64).rem_euclid(4 * ir);
        if z > 0.0 {
            2 * ir * (ir - 1) + ip
        } else {
            npix - 2 * ir * (ir + 1) + ip
        }
    };

    pix as usize
}

/// Center `(theta, phi)` of a RING pixel.
pub fn pix2ang_ring(nside: u32, pix: usize) -> (Radian, Radian) {
    let n = nside as i64;
    let npix = 12 * n * n;
    let ncap = 2 * n * (n - 1);
    let pix = pix as i64;
    let fact2 = 4.0 / npix as f64;

    let (z, phi) = if pix < ncap {
        let iring = (1 + isqrt((1 + 2 * pix) as u64) as i64) >> 1;
        let iphi = pix + 1 - 2 * iring * (iring - 1);
        let z = 1.0 - (iring * iring) as f64 * fact2;
        (z, (iphi as f64 - 0.5) * HALF_PI / iring as f64)
    } else if pix < npix - ncap {
        let ip = pix - ncap;
        let tmp = ip / (4 * n);
        let iring = tmp + n;
        let iphi = ip - tmp * 4 * n + 1;
        let fodd = if (iring + n) & 1 == 1 { 1.0 } else { 0.5 };
        let z = (2 * n - iring) as f64 * 2.0 / (3.0 * n as f64);
        (z, (iphi as f64 - fodd) * HALF_PI / n as f64)
    } else {
        let ip = npix - pix;
        let iring = (1 + isqrt((2 * ip - 1) as u64) as i64) >> 1;
        let iphi = 4 * iring + 1 - (ip - 2 * iring * (iring - 1));
        let z = -1.0 + (iring * iring) as f64 * fact2;
        (z, (iphi as f64 - 0.5) * HALF_PI / iring as f64)
    };

    (z.clamp(-1.0, 1.0).acos(), phi)
}

/// RING pixel containing the equatorial position `(ra, dec)`.
#[inline]
pub fn radec_to_pix(nside: u32, ra: Radian, dec: Radian) -> usize {
    ang2pix_ring(nside, HALF_PI - dec, ra)
}

/// Equatorial position `(ra, dec)` of a RING pixel center.
#[inline]
pub fn pix_to_radec(nside: u32, pix: usize) -> (Radian, Radian) {
    let (theta, phi) = pix2ang_ring(nside, pix);
    (phi, HALF_PI - theta)
}

#[cfg(test)]
mod healpix_test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_nside_validation() {
        assert!(is_valid_nside(1));
        assert!(is_valid_nside(64));
        assert!(!is_valid_nside(0));
        assert!(!is_valid_nside(48));
        assert!(!is_valid_nside(16384));
        assert_eq!(validate_nside(3), Err(SkysliceError::InvalidNside(3)));
    }

    #[test]
    fn test_npix_roundtrip() {
        for nside in [1, 2, 4, 8, 64, 1024] {
            assert_eq!(nside_from_npix(npix(nside)).unwrap(), nside);
        }
        assert_eq!(nside_from_npix(100), Err(SkysliceError::InvalidSkyMap(100)));
        assert_eq!(nside_from_npix(108), Err(SkysliceError::InvalidSkyMap(108)));
    }

    #[test]
    fn test_poles_and_equator() {
        assert_eq!(ang2pix_ring(1, 0.0, 0.0), 0);
        assert_eq!(ang2pix_ring(1, std::f64::consts::PI, 0.0), 8);
        assert_eq!(ang2pix_ring(1, HALF_PI, 0.0), 4);

        let (theta, phi) = pix2ang_ring(1, 4);
        assert_abs_diff_eq!(theta, HALF_PI, epsilon = 1e-12);
        assert_abs_diff_eq!(phi, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pixel_centers_roundtrip() {
        for nside in [1, 2, 4, 16, 32] {
            for pix in 0..npix(nside) {
                let (theta, phi) = pix2ang_ring(nside, pix);
                assert_eq!(ang2pix_ring(nside, theta, phi), pix, "nside={nside} pix={pix}");
                let (ra, dec) = pix_to_radec(nside, pix);
                assert_eq!(radec_to_pix(nside, ra, dec), pix);
            }
        }
    }

    #[test]
    fn test_longitude_wraps() {
        let nside = 8;
        let a = radec_to_pix(nside, 0.3, -0.2);
        let b = radec_to_pix(nside, 0.3 + DPI, -0.2);
        let c = radec_to_pix(nside, 0.3 - DPI, -0.2);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }
}
