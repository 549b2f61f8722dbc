mod common;

use std::sync::Arc;

use approx::assert_relative_eq;
use common::paired_detections;

use skyslice::{
    bundle::Bundle,
    execution::ExecutionGroup,
    metrics::{discovery::DiscoveryChancesMetric, moving::ObsArcMetric},
    observations::{ObservationTable, Visit},
    orbits::{HRange, Orbit, OrbitCatalog},
    skyslice_errors::SkysliceError,
    slicers::{
        mo_slicer::{Detection, MovingObjectSlicer},
        Slicer,
    },
    summary::{
        completeness::{Completeness, CompletenessKind},
        SummaryStat,
    },
};

/// Three catalog objects observed with m5 = 24 at H_ref = 15:
/// * 1: discoverable (3 paired nights in 10 days) at magnitude 20,
/// * 2: discoverable at magnitude 22,
/// * 3: a single paired night at magnitude 20, never discoverable.
///
/// Object 99 is not in the catalog.
fn table() -> ObservationTable {
    let mut visits: Vec<Visit> = Vec::new();
    visits.extend(paired_detections(1, &[0, 5, 10], 20.0, 24.0));
    visits.extend(paired_detections(2, &[30, 33, 36], 22.0, 24.0));
    visits.extend(paired_detections(3, &[50], 20.0, 24.0));
    visits.extend(paired_detections(99, &[1, 2, 3], 18.0, 24.0));
    ObservationTable::new(visits)
}

fn catalog() -> OrbitCatalog {
    OrbitCatalog::new(vec![
        Orbit::new(1, 15.0),
        Orbit::new(2, 15.0),
        Orbit::new(3, 15.0),
    ])
    .unwrap()
}

#[test]
fn object_slices_follow_h_offsets() {
    let table = table();
    let h_range = HRange::arange(15.0, 21.0, 1.0).unwrap();
    let slicer =
        MovingObjectSlicer::new(catalog(), h_range, Detection::SingleVisitDepth, &table).unwrap();
    assert_eq!(slicer.n_slices(), 3 * 6);

    let slices = slicer.partition(&table, None).unwrap();
    assert_eq!(slices.len(), slicer.n_slices());
    // object 2 at H = 17 is at magnitude 24, still detected; at H = 18 it is lost
    assert_eq!(slices[slicer.slice_index(1, 2)].len(), 6);
    assert_eq!(slices[slicer.slice_index(1, 3)].len(), 0);
    assert_eq!(
        slices[slicer.slice_index(1, 2)].visits[0].magnitude,
        Some(24.0)
    );
}

#[test]
fn discovery_completeness_curve() {
    let table = table();
    let h_range = HRange::arange(15.0, 21.0, 1.0).unwrap();
    let slicer: Arc<dyn Slicer> = Arc::new(
        MovingObjectSlicer::new(catalog(), h_range, Detection::SingleVisitDepth, &table).unwrap(),
    );

    let report = ExecutionGroup::new()
        .with_bundle(
            Bundle::new(Arc::new(DiscoveryChancesMetric::default()), slicer.clone())
                .with_summary(Arc::new(Completeness::default()))
                .with_summary(Arc::new(SummaryStat::Count)),
        )
        .with_bundle(Bundle::new(Arc::new(ObsArcMetric), slicer))
        .run(&table)
        .unwrap();
    assert_eq!(report.partitions, 1);

    let chances = &report.results[0];
    assert_eq!(chances.grid.len(), 18);
    let curve = chances
        .summary("Completeness")
        .and_then(|s| s.as_curve())
        .unwrap();
    assert_eq!(curve.h, vec![15.0, 16.0, 17.0, 18.0, 19.0, 20.0]);

    // H = 15..17: all three objects observed, two discovered
    for j in 0..3 {
        assert_relative_eq!(curve.differential[j], 2.0 / 3.0);
    }
    // H = 18, 19: object 2 is lost, 1 of the 2 remaining is discovered
    assert_relative_eq!(curve.differential[3], 0.5);
    assert_relative_eq!(curve.differential[4], 0.5);
    // H = 20: every object is fainter than the depth, nothing is observed
    assert_relative_eq!(curve.differential[5], 0.0);

    assert!(curve.cumulative.iter().all(|c| (0.0..=1.0).contains(c)));
    assert!(curve.cumulative.windows(2).all(|w| w[0] <= w[1]));
    assert_relative_eq!(curve.cumulative[5], 2.0 / 3.0);

    let grid = curve
        .to_grid("DiscoveryChances Completeness", CompletenessKind::Differential)
        .unwrap();
    assert_eq!(grid.n_valid(), 6);

    let arcs = &report.results[1].grid;
    assert_relative_eq!(arcs.scalar_at(0).unwrap(), 10.0 + 0.5 / 24.0, epsilon = 1e-9);
}

#[test]
fn moving_object_configuration_errors() {
    let table = table();
    assert_eq!(HRange::new(vec![]).unwrap_err(), SkysliceError::EmptyHRange);
    assert_eq!(
        OrbitCatalog::new(vec![]).unwrap_err(),
        SkysliceError::EmptyOrbitCatalog
    );

    let strangers = OrbitCatalog::new(vec![Orbit::new(1234, 15.0)]).unwrap();
    let h_range = HRange::new(vec![15.0]).unwrap();
    assert_eq!(
        MovingObjectSlicer::new(strangers, h_range, Detection::SingleVisitDepth, &table)
            .unwrap_err(),
        SkysliceError::NoMatchingObjects
    );
}

#[test]
fn completeness_needs_an_object_grid() {
    let table = ObservationTable::new(
        paired_detections(1, &[0], 20.0, 24.0)
            .into_iter()
            .map(|v| v.with_pointing(0.5, 0.5))
            .collect(),
    );
    let slicer: Arc<dyn Slicer> =
        Arc::new(skyslice::slicers::healpix_slicer::HealpixSlicer::new(1).unwrap());
    let err = Bundle::new(Arc::new(DiscoveryChancesMetric::default()), slicer)
        .with_summary(Arc::new(Completeness::default()))
        .run(&table)
        .unwrap_err();
    assert_eq!(
        err,
        SkysliceError::NotAnObjectGrid("DiscoveryChances".into())
    );
}
