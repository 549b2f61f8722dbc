//! # Stackers
//!
//! A [`Stacker`] derives a new [`ObservationTable`] from an existing one, for example by
//! replacing the pointing of every visit with a dithered pointing. The source table is never
//! modified.
//!
//! Dither stackers move every pointing by an offset `(x, y)` in radians, with the RA offset
//! scaled by `1/cos(dec)`, then wrap the result:
//!
//! * [`RandomDitherPerVisitStacker`] – a random offset per visit.
//! * [`RandomDitherPerNightStacker`] – a random offset per night.
//! * [`SpiralDitherPerNightStacker`] – sequential points of an Archimedean spiral, one per night.
//! * [`HexDitherPerNightStacker`] – sequential vertices of a hexagonal grid, one per night.
//!
//! Helpers
//! -----------------
//! * [`wrap_ra_dec`] / [`wrap_ra`] – fold positions back into `ra ∈ [0, 2π)`, `dec ∈ [-π/2, π/2]`.
//! * [`in_hexagon`] – test an offset against the hexagon inscribed in the dither circle.
//! * [`polygon_coords`] – vertices of a regular polygon, handy to visualize dither patterns.
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    constants::{Degree, FastHashMap, Radian, DPI, HALF_PI, RADEG},
    observations::{ObservationTable, Visit},
    skyslice_errors::SkysliceError,
};

/// Number of sampling rounds before offset generation gives up.
const MAX_TRIES: usize = 100;

pub trait Stacker {
    fn name(&self) -> &str;

    /// Produce the derived table.
    fn run(&self, table: &ObservationTable) -> Result<ObservationTable, SkysliceError>;
}

/// Wrap RA into `[0, 2π)` and Dec into `[-π/2, π/2]`.
///
/// A declination past a pole is reflected back and the RA moves by π.
pub fn wrap_ra_dec(ra: Radian, dec: Radian) -> (Radian, Radian) {
    let (ra, dec) = if dec < -HALF_PI {
        (ra - std::f64::consts::PI, -(std::f64::consts::PI + dec))
    } else if dec > HALF_PI {
        (ra - std::f64::consts::PI, std::f64::consts::PI - dec)
    } else {
        (ra, dec)
    };
    (wrap_ra(ra), dec)
}

/// Wrap RA into `[0, 2π)`.
#[inline]
pub fn wrap_ra(ra: Radian) -> Radian {
    ra.rem_euclid(DPI)
}

/// Whether `(x, y)` lies strictly inside the hexagon inscribed in the circle of radius
/// `max_dither` (flat top and bottom).
pub fn in_hexagon(x: f64, y: f64, max_dither: f64) -> bool {
    let m = 3f64.sqrt();
    let b = m * max_dither;
    let h = m / 2.0 * max_dither;
    y < m * x + b && y > m * x - b && y < -m * x + b && y > -m * x - b && y < h && y > -h
}

/// Vertices of a regular polygon with `n_sides` sides inscribed in a circle of `radius`,
/// rotated by `rotation` radians.
pub fn polygon_coords(n_sides: usize, radius: f64, rotation: Radian) -> Vec<(f64, f64)> {
    let each_angle = DPI / n_sides as f64;
    (0..n_sides)
        .map(|i| {
            let angle = each_angle * i as f64 + rotation;
            (angle.sin() * radius, angle.cos() * radius)
        })
        .collect()
}

/// Validate a dither radius given in degrees and convert it to radians.
fn dither_radius(max_dither: Degree) -> Result<Radian, SkysliceError> {
    if !(max_dither > 0.0) || !max_dither.is_finite() {
        return Err(SkysliceError::InvalidMetricParameter(format!(
            "max_dither must be > 0 (got {max_dither})"
        )));
    }
    Ok(max_dither * RADEG)
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// Draw `n` offsets `(x, y)` uniformly within the `max_dither` circle, or within its inscribed
/// hexagon when `in_hex` is set.
fn random_offsets(
    rng: &mut StdRng,
    n: usize,
    max_dither: Radian,
    in_hex: bool,
) -> Result<Vec<(f64, f64)>, SkysliceError> {
    let mut offsets = Vec::with_capacity(n);
    let mut tries = 0;
    while offsets.len() < n && tries < MAX_TRIES {
        for _ in 0..2 * n {
            let r = rng.random::<f64>().sqrt() * max_dither;
            let theta = rng.random::<f64>() * DPI;
            let (x, y) = (r * theta.cos(), r * theta.sin());
            if !in_hex || in_hexagon(x, y, max_dither) {
                offsets.push((x, y));
            }
        }
        tries += 1;
    }
    if offsets.len() < n {
        return Err(SkysliceError::DitherGeneration(n));
    }
    offsets.truncate(n);
    Ok(offsets)
}

/// Distinct nights of the table, ascending.
fn sorted_nights(table: &ObservationTable) -> Vec<i32> {
    let mut nights: Vec<i32> = table.iter().map(|v| v.night).collect();
    nights.sort_unstable();
    nights.dedup();
    nights
}

/// Move every visit by `offset(row, visit)` and wrap the result.
///
/// Return
/// ----------
/// * The dithered table, in the row order of `table`.
/// * [`SkysliceError::MissingField`] on the first visit without a pointing.
fn apply_offsets<F>(table: &ObservationTable, offset: F) -> Result<ObservationTable, SkysliceError>
where
    F: Fn(usize, &Visit) -> (f64, f64),
{
    table
        .iter()
        .enumerate()
        .map(|(row, visit)| {
            let (ra, dec) = match (visit.ra, visit.dec) {
                (Some(ra), Some(dec)) => (ra, dec),
                (None, _) => return Err(SkysliceError::MissingField { field: "ra", row }),
                (_, None) => return Err(SkysliceError::MissingField { field: "dec", row }),
            };
            let (x, y) = offset(row, visit);
            let (ra, dec) = wrap_ra_dec(ra + x / dec.cos(), dec + y);
            Ok(Visit {
                ra: Some(ra),
                dec: Some(dec),
                ..*visit
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(ObservationTable::new)
}

/// Walk a fixed offset sequence, moving to the next offset on every new night (in ascending
/// night order) and starting over when the sequence is exhausted.
fn sequential_per_night(
    table: &ObservationTable,
    offsets: &[(f64, f64)],
) -> Result<ObservationTable, SkysliceError> {
    let rank: FastHashMap<i32, usize> = sorted_nights(table)
        .into_iter()
        .enumerate()
        .map(|(i, night)| (night, i))
        .collect();
    apply_offsets(table, |_, visit| offsets[rank[&visit.night] % offsets.len()])
}

/// Random dither, one offset per visit, drawn uniformly within the `max_dither` circle (or its
/// inscribed hexagon).
#[derive(Debug, Clone)]
pub struct RandomDitherPerVisitStacker {
    max_dither: Radian,
    in_hex: bool,
    seed: Option<u64>,
}

impl RandomDitherPerVisitStacker {
    /// Same arguments as [`RandomDitherPerNightStacker::new`].
    pub fn new(max_dither: Degree, in_hex: bool, seed: Option<u64>) -> Result<Self, SkysliceError> {
        Ok(RandomDitherPerVisitStacker {
            max_dither: dither_radius(max_dither)?,
            in_hex,
            seed,
        })
    }
}

impl Stacker for RandomDitherPerVisitStacker {
    fn name(&self) -> &str {
        "RandomDitherPerVisit"
    }

    fn run(&self, table: &ObservationTable) -> Result<ObservationTable, SkysliceError> {
        let mut rng = seeded_rng(self.seed);
        let offsets = random_offsets(&mut rng, table.len(), self.max_dither, self.in_hex)?;
        apply_offsets(table, |row, _| offsets[row])
    }
}

/// Random dither, one offset per night: every visit of a given night is moved by the same
/// offset, drawn uniformly within the `max_dither` circle (or its inscribed hexagon).
#[derive(Debug, Clone)]
pub struct RandomDitherPerNightStacker {
    max_dither: Radian,
    in_hex: bool,
    seed: Option<u64>,
}

impl RandomDitherPerNightStacker {
    /// Arguments
    /// -----------------
    /// * `max_dither`: radius of the largest offset, in **degrees** (1.75 is the field radius
    ///   of the default survey camera).
    /// * `in_hex`: keep offsets inside the hexagon inscribed in the dither circle.
    /// * `seed`: seed of the offset generator; `None` draws one from the OS.
    pub fn new(max_dither: Degree, in_hex: bool, seed: Option<u64>) -> Result<Self, SkysliceError> {
        Ok(RandomDitherPerNightStacker {
            max_dither: dither_radius(max_dither)?,
            in_hex,
            seed,
        })
    }
}

impl Default for RandomDitherPerNightStacker {
    fn default() -> Self {
        RandomDitherPerNightStacker {
            max_dither: 1.75 * RADEG,
            in_hex: true,
            seed: None,
        }
    }
}

impl Stacker for RandomDitherPerNightStacker {
    fn name(&self) -> &str {
        "RandomDitherPerNight"
    }

    fn run(&self, table: &ObservationTable) -> Result<ObservationTable, SkysliceError> {
        let mut rng = seeded_rng(self.seed);
        let nights = sorted_nights(table);
        let offsets = random_offsets(&mut rng, nights.len(), self.max_dither, self.in_hex)?;
        let per_night: FastHashMap<i32, (f64, f64)> = nights.into_iter().zip(offsets).collect();
        apply_offsets(table, |_, visit| per_night[&visit.night])
    }
}

/// Equidistant points along an Archimedean spiral `r = a·θ` reaching `max_dither` after
/// `n_coils` turns; one point per night, in night order.
///
/// With `in_hex` the spiral is shrunk to 85% of `max_dither`, which keeps it inside the
/// inscribed hexagon.
#[derive(Debug, Clone)]
pub struct SpiralDitherPerNightStacker {
    max_dither: Radian,
    n_points: usize,
    n_coils: usize,
    in_hex: bool,
}

impl SpiralDitherPerNightStacker {
    /// Sampling step of the spiral angle, in radians.
    const THETA_STEP: f64 = 1e-3;

    pub fn new(
        max_dither: Degree,
        n_points: usize,
        n_coils: usize,
        in_hex: bool,
    ) -> Result<Self, SkysliceError> {
        if n_points == 0 || n_coils == 0 {
            return Err(SkysliceError::InvalidMetricParameter(format!(
                "n_points ({n_points}) and n_coils ({n_coils}) must be > 0"
            )));
        }
        Ok(SpiralDitherPerNightStacker {
            max_dither: dither_radius(max_dither)?,
            n_points,
            n_coils,
            in_hex,
        })
    }

    /// The `n_points` offsets `(x, y)` of the spiral, from the center outwards.
    pub fn offsets(&self) -> Vec<(f64, f64)> {
        let theta_max = self.n_coils as f64 * DPI;
        let n = (theta_max / Self::THETA_STEP).ceil() as usize;
        let theta: Vec<f64> = (0..n).map(|i| 1e-4 + i as f64 * Self::THETA_STEP).collect();
        let last = theta[n - 1];

        let mut a = self.max_dither / last;
        if self.in_hex {
            a *= 0.85;
        }
        // arc length of r = a·θ from the origin, increasing with θ
        let arc: Vec<f64> = theta
            .iter()
            .map(|&t| {
                let s = (1.0 + t * t).sqrt();
                a / 2.0 * (t * s + (t + s).ln())
            })
            .collect();
        let step = arc[n - 1] / self.n_points as f64;

        (0..self.n_points)
            .map(|i| {
                let target = i as f64 * step;
                let hi = arc.partition_point(|&s| s < target).min(n - 1);
                let k = if hi > 0 && target - arc[hi - 1] <= arc[hi] - target {
                    hi - 1
                } else {
                    hi
                };
                let r = a * theta[k];
                (r * theta[k].cos(), r * theta[k].sin())
            })
            .collect()
    }
}

impl Default for SpiralDitherPerNightStacker {
    /// 60 points over 5 coils within 1.75°, inside the hexagon.
    fn default() -> Self {
        SpiralDitherPerNightStacker {
            max_dither: 1.75 * RADEG,
            n_points: 60,
            n_coils: 5,
            in_hex: true,
        }
    }
}

impl Stacker for SpiralDitherPerNightStacker {
    fn name(&self) -> &str {
        "SpiralDitherPerNight"
    }

    fn run(&self, table: &ObservationTable) -> Result<ObservationTable, SkysliceError> {
        sequential_per_night(table, &self.offsets())
    }
}

/// Vertices of a hexagonal grid of 17 rows filling the hexagon inscribed in the `max_dither`
/// circle (217 vertices), visited row by row; one vertex per night, in night order.
///
/// With `in_hex` the grid is shrunk to 95% so that every vertex lies strictly inside the
/// hexagon.
#[derive(Debug, Clone)]
pub struct HexDitherPerNightStacker {
    max_dither: Radian,
    in_hex: bool,
}

impl HexDitherPerNightStacker {
    /// Rows of the grid on each side of the central row.
    const HALF_ROWS: i32 = 8;

    pub fn new(max_dither: Degree, in_hex: bool) -> Result<Self, SkysliceError> {
        Ok(HexDitherPerNightStacker {
            max_dither: dither_radius(max_dither)?,
            in_hex,
        })
    }

    /// Grid vertices `(x, y)`, bottom row first.
    pub fn offsets(&self) -> Vec<(f64, f64)> {
        let n_rows = 2.0 * Self::HALF_ROWS as f64;
        let shrink = if self.in_hex { 0.95 } else { 1.0 };
        let dx = shrink * 2.0 * self.max_dither / n_rows;
        let dy = shrink * 3f64.sqrt() * self.max_dither / n_rows;

        (-Self::HALF_ROWS..=Self::HALF_ROWS)
            .flat_map(|row| {
                let n_vertices = 2 * Self::HALF_ROWS + 1 - row.abs();
                let center = (n_vertices - 1) as f64 / 2.0;
                (0..n_vertices).map(move |j| (dx * (j as f64 - center), dy * row as f64))
            })
            .collect()
    }
}

impl Default for HexDitherPerNightStacker {
    fn default() -> Self {
        HexDitherPerNightStacker {
            max_dither: 1.75 * RADEG,
            in_hex: true,
        }
    }
}

impl Stacker for HexDitherPerNightStacker {
    fn name(&self) -> &str {
        "HexDitherPerNight"
    }

    fn run(&self, table: &ObservationTable) -> Result<ObservationTable, SkysliceError> {
        sequential_per_night(table, &self.offsets())
    }
}

#[cfg(test)]
mod stackers_test {
    use super::*;
    use crate::observations::Filter;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_wrap_ra_dec() {
        let (ra, dec) = wrap_ra_dec(-0.1, 0.2);
        assert_abs_diff_eq!(ra, DPI - 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(dec, 0.2, epsilon = 1e-12);

        let (ra, dec) = wrap_ra_dec(1.0, HALF_PI + 0.1);
        assert_abs_diff_eq!(dec, HALF_PI - 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(ra, 1.0 + std::f64::consts::PI, epsilon = 1e-12);

        let (ra, dec) = wrap_ra_dec(4.0, -HALF_PI - 0.2);
        assert_abs_diff_eq!(dec, -HALF_PI + 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(ra, 4.0 - std::f64::consts::PI, epsilon = 1e-12);
    }

    #[test]
    fn test_in_hexagon() {
        assert!(in_hexagon(0.0, 0.0, 1.0));
        assert!(in_hexagon(0.9, 0.0, 1.0));
        // top edge of the hexagon is at sqrt(3)/2
        assert!(!in_hexagon(0.0, 0.9, 1.0));
        assert!(!in_hexagon(1.1, 0.0, 1.0));
    }

    #[test]
    fn test_polygon_coords() {
        let square = polygon_coords(4, 2.0, 0.0);
        assert_eq!(square.len(), 4);
        assert_abs_diff_eq!(square[0].0, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(square[0].1, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(square[1].0, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(square[1].1, 0.0, epsilon = 1e-12);
    }

    fn pointed_table() -> ObservationTable {
        (0..30)
            .map(|i| {
                Visit::new(60000.0 + i as f64 / 3.0, i / 3, Filter::R, 24.0)
                    .with_pointing(1.0, -0.5)
            })
            .collect()
    }

    #[test]
    fn test_one_offset_per_night() {
        let table = pointed_table();
        let stacker = RandomDitherPerNightStacker::new(1.75, true, Some(42)).unwrap();
        let dithered = stacker.run(&table).unwrap();

        assert_eq!(dithered.len(), table.len());
        for night in dithered.visits().chunks(3) {
            assert!(night.iter().all(|v| v.ra == night[0].ra && v.dec == night[0].dec));
        }

        let max = 1.75 * RADEG;
        for v in dithered.iter() {
            let dec = v.dec.unwrap();
            assert!((dec - (-0.5)).abs() <= max);
            let ra = v.ra.unwrap();
            assert!((0.0..DPI).contains(&ra));
        }
        // the source table is untouched
        assert!(table.iter().all(|v| v.ra == Some(1.0)));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let table = pointed_table();
        let stacker = RandomDitherPerNightStacker::new(1.0, false, Some(7)).unwrap();
        assert_eq!(
            stacker.run(&table).unwrap().visits(),
            stacker.run(&table).unwrap().visits()
        );
    }

    #[test]
    fn test_missing_pointing() {
        let table = ObservationTable::new(vec![Visit::new(0.0, 0, Filter::G, 23.0)]);
        let stacker = RandomDitherPerNightStacker::default();
        assert_eq!(
            stacker.run(&table).unwrap_err(),
            SkysliceError::MissingField { field: "ra", row: 0 }
        );
    }

    #[test]
    fn test_one_offset_per_visit() {
        let table = pointed_table();
        let stacker = RandomDitherPerVisitStacker::new(1.75, true, Some(3)).unwrap();
        let dithered = stacker.run(&table).unwrap();
        assert_eq!(dithered.len(), table.len());
        // offsets are drawn per visit, so visits of one night spread out
        let first_night = &dithered.visits()[..3];
        assert!(first_night.iter().any(|v| v.dec != first_night[0].dec));
        assert_eq!(stacker.run(&table).unwrap().visits(), dithered.visits());
    }

    #[test]
    fn test_spiral_offsets() {
        let stacker = SpiralDitherPerNightStacker::default();
        let offsets = stacker.offsets();
        assert_eq!(offsets.len(), 60);

        let max = 1.75 * RADEG;
        let radii: Vec<f64> = offsets.iter().map(|(x, y)| x.hypot(*y)).collect();
        assert!(radii[0] < 1e-3 * max);
        assert!(radii.windows(2).all(|w| w[0] <= w[1]));
        assert!(radii.iter().all(|&r| r <= 0.85 * max + 1e-12));
        assert!(offsets.iter().all(|&(x, y)| in_hexagon(x, y, max)));

        // consecutive points are evenly spaced along the spiral, never on top of each other
        assert!(offsets
            .windows(2)
            .all(|w| (w[1].0 - w[0].0).hypot(w[1].1 - w[0].1) > 0.0));

        assert!(SpiralDitherPerNightStacker::new(1.75, 0, 5, true).is_err());
    }

    #[test]
    fn test_hex_offsets() {
        let max = 1.75 * RADEG;
        let offsets = HexDitherPerNightStacker::default().offsets();
        assert_eq!(offsets.len(), 217);
        assert!(offsets.iter().all(|&(x, y)| in_hexagon(x, y, max)));
        // the central row holds 17 vertices spanning 95% of the radius
        let central: Vec<f64> = offsets.iter().filter(|o| o.1 == 0.0).map(|o| o.0).collect();
        assert_eq!(central.len(), 17);
        assert_abs_diff_eq!(central[16], 0.95 * max, epsilon = 1e-12);
        assert_abs_diff_eq!(central[0], -0.95 * max, epsilon = 1e-12);
        assert_abs_diff_eq!(offsets[0].1, -0.95 * 3f64.sqrt() / 2.0 * max, epsilon = 1e-12);
    }

    #[test]
    fn test_sequential_offsets_follow_nights() {
        let table = pointed_table();
        let stacker = HexDitherPerNightStacker::new(1.0, true).unwrap();
        let offsets = stacker.offsets();
        let dithered = stacker.run(&table).unwrap();
        for (before, after) in table.iter().zip(dithered.iter()) {
            let (_, y) = offsets[before.night as usize];
            assert_abs_diff_eq!(after.dec.unwrap() - before.dec.unwrap(), y, epsilon = 1e-12);
        }

        // ten nights wrap around a three-point spiral
        let spiral = SpiralDitherPerNightStacker::new(1.0, 3, 1, false).unwrap();
        let points = spiral.offsets();
        let dithered = spiral.run(&table).unwrap();
        for (before, after) in table.iter().zip(dithered.iter()) {
            let (_, y) = points[before.night as usize % 3];
            assert_abs_diff_eq!(after.dec.unwrap() - before.dec.unwrap(), y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_invalid_radius() {
        assert!(HexDitherPerNightStacker::new(-1.0, true).is_err());
        assert!(RandomDitherPerNightStacker::new(0.0, true, None).is_err());
        assert!(RandomDitherPerNightStacker::new(f64::NAN, true, None).is_err());
    }
}
