use std::{collections::BTreeMap, sync::Arc};

use crate::{
    healpix::{npix, pix_to_radec, radec_to_pix, validate_nside},
    maps::SkyMap,
    observations::{constraint::Constraint, ObservationTable, Visit},
    skyslice_errors::SkysliceError,
};

use super::{Slice, SlicePoint, Slicer};

/// Spatial slicer over a HEALPix RING tessellation.
///
/// Each visit is assigned to the pixel containing its pointing, so a slice holds every visit
/// whose field center falls in that cell. Attached [`SkyMap`]s are sampled at every cell
/// center and exposed through [`SlicePoint::Sky::maps`](SlicePoint::Sky).
#[derive(Debug, Clone)]
pub struct HealpixSlicer {
    nside: u32,
    maps: Vec<Arc<SkyMap>>,
}

impl HealpixSlicer {
    /// Return
    /// ----------
    /// * [`SkysliceError::InvalidNside`] unless `nside` is a power of two in `1..=8192`.
    pub fn new(nside: u32) -> Result<Self, SkysliceError> {
        validate_nside(nside)?;
        Ok(HealpixSlicer {
            nside,
            maps: Vec::new(),
        })
    }

    pub fn with_map(mut self, map: Arc<SkyMap>) -> Self {
        self.maps.push(map);
        self
    }

    pub fn nside(&self) -> u32 {
        self.nside
    }
}

impl Slicer for HealpixSlicer {
    fn name(&self) -> String {
        format!("HealpixSlicer(nside={})", self.nside)
    }

    fn n_slices(&self) -> usize {
        npix(self.nside)
    }

    fn slice_points(&self) -> Vec<SlicePoint> {
        (0..self.n_slices())
            .map(|pixel| {
                let (ra, dec) = pix_to_radec(self.nside, pixel);
                let maps: BTreeMap<String, f64> = self
                    .maps
                    .iter()
                    .map(|m| (m.key().to_string(), m.value_for_pixel(self.nside, pixel)))
                    .collect();
                SlicePoint::Sky {
                    pixel,
                    ra,
                    dec,
                    maps,
                }
            })
            .collect()
    }

    fn partition(
        &self,
        table: &ObservationTable,
        constraint: Option<&Constraint>,
    ) -> Result<Vec<Slice>, SkysliceError> {
        let mut buckets: Vec<Vec<Visit>> = vec![Vec::new(); self.n_slices()];

        for row in table.select(constraint) {
            let visit = &table.visits()[row];
            let ra = visit
                .ra
                .ok_or(SkysliceError::MissingField { field: "ra", row })?;
            let dec = visit
                .dec
                .ok_or(SkysliceError::MissingField { field: "dec", row })?;
            buckets[radec_to_pix(self.nside, ra, dec)].push(*visit);
        }

        Ok(self
            .slice_points()
            .into_iter()
            .zip(buckets)
            .enumerate()
            .map(|(index, (point, visits))| Slice {
                index,
                point,
                visits,
            })
            .collect())
    }
}

#[cfg(test)]
mod healpix_slicer_test {
    use super::*;
    use crate::observations::{columns::ColumnNames, Filter};

    fn table() -> ObservationTable {
        let mut visits = Vec::new();
        for night in 0..10 {
            visits.push(
                Visit::new(60000.0 + night as f64, night, Filter::R, 24.0).with_pointing(0.1, 0.1),
            );
            visits.push(
                Visit::new(60000.1 + night as f64, night, Filter::G, 23.0).with_pointing(3.0, -1.0),
            );
        }
        visits.into()
    }

    #[test]
    fn slice_count_is_fixed() {
        let slicer = HealpixSlicer::new(4).unwrap();
        let names = ColumnNames::default();
        let c = Constraint::parse("filter = 'r'", &names).unwrap();
        assert_eq!(slicer.partition(&table(), None).unwrap().len(), 192);
        assert_eq!(slicer.partition(&table(), Some(&c)).unwrap().len(), 192);
    }

    #[test]
    fn visits_land_in_their_pixel() {
        let slicer = HealpixSlicer::new(4).unwrap();
        let slices = slicer.partition(&table(), None).unwrap();
        let a = radec_to_pix(4, 0.1, 0.1);
        let b = radec_to_pix(4, 3.0, -1.0);
        assert_ne!(a, b);
        assert_eq!(slices[a].len(), 10);
        assert_eq!(slices[b].len(), 10);
        assert_eq!(slices.iter().map(|s| s.len()).sum::<usize>(), 20);
        assert!(slices.iter().enumerate().all(|(i, s)| s.index == i));
    }

    #[test]
    fn missing_pointing_is_fatal() {
        let table: ObservationTable = vec![Visit::new(0.0, 0, Filter::R, 24.0)].into();
        let slicer = HealpixSlicer::new(1).unwrap();
        assert_eq!(
            slicer.partition(&table, None).unwrap_err(),
            SkysliceError::MissingField { field: "ra", row: 0 }
        );
    }

    #[test]
    fn maps_are_attached_to_points() {
        let density = SkyMap::new("starDensity", (0..12).map(|p| p as f64).collect()).unwrap();
        let slicer = HealpixSlicer::new(2).unwrap().with_map(Arc::new(density));
        let points = slicer.slice_points();
        assert_eq!(points.len(), 48);
        assert!(points
            .iter()
            .all(|p| p.map_value("starDensity").is_some_and(|v| (0.0..12.0).contains(&v))));
    }

    #[test]
    fn invalid_nside() {
        assert_eq!(
            HealpixSlicer::new(12).unwrap_err(),
            SkysliceError::InvalidNside(12)
        );
    }
}
