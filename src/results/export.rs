//! # Flat exports
//!
//! Converts a [`ResultGrid`] into flat numeric columns aligned with slice identities, for
//! persistence or plotting by external tools. Masked cells (and missing compound entries) are
//! filled with [`BADVAL`] and flagged in an explicit mask.
//!
//! Column layout
//! -----------------
//! * scalar grids: `value`
//! * vector grids: `value_0`, `value_1`, ... up to the longest vector
//! * compound grids: one column per entry name, sorted
use std::{collections::BTreeSet, io::Write};

use serde::Serialize;

use crate::{
    constants::{Magnitude, ObjectId, Radian, BADVAL},
    metrics::MetricValue,
    skyslice_errors::SkysliceError,
    slicers::SlicePoint,
};

use super::ResultGrid;

/// Identity columns of one exported slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceIdentity {
    pub slice: usize,
    pub pixel: Option<usize>,
    pub ra: Option<Radian>,
    pub dec: Option<Radian>,
    pub object: Option<ObjectId>,
    pub h: Option<Magnitude>,
}

impl SliceIdentity {
    fn new(slice: usize, point: &SlicePoint) -> Self {
        let mut id = SliceIdentity {
            slice,
            pixel: None,
            ra: None,
            dec: None,
            object: None,
            h: None,
        };
        match point {
            SlicePoint::Sky { pixel, ra, dec, .. } => {
                id.pixel = Some(*pixel);
                id.ra = Some(*ra);
                id.dec = Some(*dec);
            }
            SlicePoint::Object { object, h, .. } => {
                id.object = Some(*object);
                id.h = Some(*h);
            }
            SlicePoint::HBin { h, .. } => id.h = Some(*h),
        }
        id
    }
}

/// Flat, column-major view of a grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridExport {
    pub name: String,
    pub identities: Vec<SliceIdentity>,
    pub columns: Vec<String>,
    /// `data[c][i]` is column `c` of slice `i`.
    pub data: Vec<Vec<f64>>,
    /// `true` where the whole cell is masked.
    pub mask: Vec<bool>,
}

enum Layout {
    Scalar,
    Vector(usize),
    Compound(Vec<String>),
}

fn layout(grid: &ResultGrid) -> Layout {
    let mut width = None;
    let mut keys: Option<BTreeSet<String>> = None;
    for value in grid.values().iter().flatten() {
        match value {
            MetricValue::Scalar(_) => {}
            MetricValue::Vector(v) => width = Some(width.unwrap_or(0).max(v.len())),
            MetricValue::Compound(map) => keys
                .get_or_insert_with(BTreeSet::new)
                .extend(map.keys().cloned()),
        }
    }
    match (width, keys) {
        (_, Some(keys)) => Layout::Compound(keys.into_iter().collect()),
        (Some(width), None) => Layout::Vector(width),
        (None, None) => Layout::Scalar,
    }
}

impl ResultGrid {
    /// Flatten the grid into columns, a mask and slice identities.
    pub fn export(&self) -> GridExport {
        let layout = layout(self);
        let columns: Vec<String> = match &layout {
            Layout::Scalar => vec!["value".to_string()],
            Layout::Vector(width) => (0..*width).map(|k| format!("value_{k}")).collect(),
            Layout::Compound(keys) => keys.clone(),
        };

        let mut data = vec![Vec::with_capacity(self.len()); columns.len()];
        for cell in self.values() {
            for (c, column) in data.iter_mut().enumerate() {
                let v = match (cell, &layout) {
                    (Some(MetricValue::Scalar(x)), Layout::Scalar) => Some(*x),
                    (Some(MetricValue::Vector(v)), Layout::Vector(_)) => v.get(c).copied(),
                    (Some(MetricValue::Compound(map)), Layout::Compound(keys)) => {
                        map.get(&keys[c]).copied().flatten()
                    }
                    _ => None,
                };
                column.push(v.unwrap_or(BADVAL));
            }
        }

        GridExport {
            name: self.name().to_string(),
            identities: self
                .points()
                .iter()
                .enumerate()
                .map(|(i, p)| SliceIdentity::new(i, p))
                .collect(),
            columns,
            data,
            mask: self.mask(),
        }
    }

    /// Write the grid as CSV: identity columns, a `masked` flag, then the value columns.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), SkysliceError> {
        let export = self.export();
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header: Vec<String> = ["slice", "pixel", "ra", "dec", "object", "h", "masked"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        header.extend(export.columns.iter().cloned());
        wtr.write_record(&header)?;

        fn opt<T: ToString>(v: &Option<T>) -> String {
            v.as_ref().map(T::to_string).unwrap_or_default()
        }

        for (i, id) in export.identities.iter().enumerate() {
            let mut record = vec![
                id.slice.to_string(),
                opt(&id.pixel),
                opt(&id.ra),
                opt(&id.dec),
                opt(&id.object),
                opt(&id.h),
                export.mask[i].to_string(),
            ];
            record.extend(export.data.iter().map(|column| column[i].to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// One named summary value of a bundle, as written by [`write_summary_csv`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    pub bundle: String,
    pub summary: String,
    /// [`BADVAL`] when the summary is masked.
    pub value: f64,
}

/// Write summary records as CSV with a `bundle,summary,value` header.
pub fn write_summary_csv<W: Write>(
    records: &[SummaryRecord],
    writer: W,
) -> Result<(), SkysliceError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod export_test {
    use super::*;
    use std::{collections::BTreeMap, sync::Arc};

    fn hbins(n: usize) -> Arc<[SlicePoint]> {
        (0..n)
            .map(|i| SlicePoint::HBin {
                h_index: i,
                h: 15.0 + i as f64,
            })
            .collect()
    }

    #[test]
    fn scalar_export_fills_masked_cells() {
        let grid = ResultGrid::from_values(
            "NObs",
            hbins(3),
            vec![Some(MetricValue::Scalar(4.0)), None, Some(MetricValue::Scalar(1.0))],
        )
        .unwrap();
        let export = grid.export();
        assert_eq!(export.columns, vec!["value"]);
        assert_eq!(export.data[0], vec![4.0, BADVAL, 1.0]);
        assert_eq!(export.mask, vec![false, true, false]);
        assert_eq!(export.identities[2].h, Some(17.0));
    }

    #[test]
    fn compound_export_uses_sorted_keys() {
        let cell = |a: Option<f64>, b: f64| {
            Some(MetricValue::Compound(BTreeMap::from([
                ("b".to_string(), Some(b)),
                ("a".to_string(), a),
            ])))
        };
        let grid =
            ResultGrid::from_values("C", hbins(2), vec![cell(Some(1.0), 2.0), cell(None, 3.0)])
                .unwrap();
        let export = grid.export();
        assert_eq!(export.columns, vec!["a", "b"]);
        assert_eq!(export.data[0], vec![1.0, BADVAL]);
        assert_eq!(export.data[1], vec![2.0, 3.0]);
        assert_eq!(export.mask, vec![false, false]);
    }

    #[test]
    fn vector_export_pads_short_vectors() {
        let grid = ResultGrid::from_values(
            "V",
            hbins(2),
            vec![
                Some(MetricValue::Vector(vec![1.0, 2.0])),
                Some(MetricValue::Vector(vec![3.0])),
            ],
        )
        .unwrap();
        let export = grid.export();
        assert_eq!(export.columns, vec!["value_0", "value_1"]);
        assert_eq!(export.data[1], vec![2.0, BADVAL]);
    }

    #[test]
    fn csv_output() {
        let grid = ResultGrid::from_values(
            "NObs",
            hbins(2),
            vec![Some(MetricValue::Scalar(4.0)), None],
        )
        .unwrap();
        let mut out = Vec::new();
        grid.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "slice,pixel,ra,dec,object,h,masked,value");
        assert_eq!(lines[1], "0,,,,,15,false,4");
        assert_eq!(lines[2], "1,,,,,16,true,-666");
    }

    #[test]
    fn summary_csv_output() {
        let records = vec![SummaryRecord {
            bundle: "NObs".into(),
            summary: "Mean".into(),
            value: 2.5,
        }];
        let mut out = Vec::new();
        write_summary_csv(&records, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "bundle,summary,value\nNObs,Mean,2.5\n");
    }
}
