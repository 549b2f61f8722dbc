#![allow(dead_code)]

use std::{
    f64::consts::{FRAC_PI_2, TAU},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use skyslice::{
    constants::ObjectId,
    metrics::{Metric, MetricValue},
    observations::{constraint::Constraint, Filter, ObservationTable, Visit},
    skyslice_errors::SkysliceError,
    slicers::{Slice, SlicePoint, Slicer},
};

pub const START_MJD: f64 = 60000.0;

/// Seeded generator shared by the integration tests.
pub fn rng() -> StdRng {
    StdRng::seed_from_u64(0xC0FFEE)
}

/// `n` visits scattered uniformly over the sphere and over `nights` nights, with a seeing.
pub fn random_sky_table(rng: &mut StdRng, n: usize, nights: i32) -> ObservationTable {
    (0..n)
        .map(|_| {
            let night = rng.random_range(0..nights);
            let time = START_MJD + night as f64 + rng.random_range(0.0..0.3);
            let filter = Filter::ALL[rng.random_range(0..Filter::ALL.len())];
            let m5 = rng.random_range(22.5..25.0);
            let ra = rng.random::<f64>() * TAU;
            let dec = (rng.random_range(-1.0f64..1.0)).asin();
            Visit::new(time, night, filter, m5)
                .with_seeing(rng.random_range(0.5..1.5))
                .with_pointing(ra, dec.clamp(-FRAC_PI_2, FRAC_PI_2))
        })
        .collect()
}

/// Visits of one object: two visits 30 minutes apart on each of `nights`, at `magnitude`.
pub fn paired_detections(
    object: ObjectId,
    nights: &[i32],
    magnitude: f64,
    five_sigma_depth: f64,
) -> Vec<Visit> {
    nights
        .iter()
        .flat_map(|&night| {
            let t = START_MJD + night as f64;
            [
                Visit::new(t, night, Filter::R, five_sigma_depth).with_detection(object, magnitude),
                Visit::new(t + 0.5 / 24.0, night, Filter::R, five_sigma_depth)
                    .with_detection(object, magnitude),
            ]
        })
        .collect()
}

/// Slicer wrapper counting its partition calls.
pub struct CountingSlicer<S> {
    inner: S,
    calls: AtomicUsize,
}

impl<S: Slicer> CountingSlicer<S> {
    pub fn new(inner: S) -> Self {
        CountingSlicer {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<S: Slicer> Slicer for CountingSlicer<S> {
    fn name(&self) -> String {
        format!("Counting({})", self.inner.name())
    }

    fn n_slices(&self) -> usize {
        self.inner.n_slices()
    }

    fn slice_points(&self) -> Vec<SlicePoint> {
        self.inner.slice_points()
    }

    fn partition(
        &self,
        table: &ObservationTable,
        constraint: Option<&Constraint>,
    ) -> Result<Vec<Slice>, SkysliceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.partition(table, constraint)
    }
}

/// Metric failing on every slice holding more than `limit` visits, counting its calls.
pub struct FragileMetric {
    pub limit: usize,
    pub calls: Arc<AtomicUsize>,
}

impl Metric for FragileMetric {
    fn name(&self) -> String {
        "Fragile".into()
    }

    fn run(&self, slice: &Slice) -> Result<Option<MetricValue>, SkysliceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if slice.len() > self.limit {
            return Err(SkysliceError::MetricEvaluation(format!(
                "{} visits is too many",
                slice.len()
            )));
        }
        Ok((!slice.is_empty()).then(|| MetricValue::Scalar(slice.len() as f64)))
    }
}
