use thiserror::Error;

use crate::constants::ObjectId;

#[derive(Error, Debug)]
pub enum SkysliceError {
    #[error("Empty H range: at least one H value is required")]
    EmptyHRange,

    #[error("H range must be finite and strictly ascending: {0}")]
    UnsortedHRange(String),

    #[error("Orbit catalog is empty")]
    EmptyOrbitCatalog,

    #[error("Object {0} appears more than once in the orbit catalog")]
    DuplicateObject(ObjectId),

    #[error("No object identifier of the observation table matches the orbit catalog")]
    NoMatchingObjects,

    #[error("Invalid HEALPix nside {0}: must be a power of two between 1 and 8192")]
    InvalidNside(u32),

    #[error("Sky map of {0} pixels does not match any HEALPix resolution")]
    InvalidSkyMap(usize),

    #[error("Visit {row} has no `{field}` value")]
    MissingField { field: &'static str, row: usize },

    #[error("Completeness requires a non-empty object population")]
    EmptyPopulation,

    #[error("Grid `{0}` is not indexed by object and H value")]
    NotAnObjectGrid(String),

    #[error("Grid `{0}` holds non-scalar values; register a reducer first")]
    NonScalarGrid(String),

    #[error("Invalid metric parameter: {0}")]
    InvalidMetricParameter(String),

    #[error("Invalid constraint `{expr}`: {reason}")]
    InvalidConstraint { expr: String, reason: String },

    #[error("Unknown column name: {0}")]
    UnknownColumn(String),

    #[error("Unknown filter band: {0}")]
    UnknownFilter(String),

    #[error("Slice index {index} out of range for a grid of {len} slices")]
    SliceIndexOutOfRange { index: usize, len: usize },

    #[error("Could not draw {0} dither offsets inside the hexagon")]
    DitherGeneration(usize),

    #[error("Metric evaluation failed: {0}")]
    MetricEvaluation(String),

    #[error("Object {0} has no orbital elements")]
    MissingOrbitElements(ObjectId),

    #[error("CSV export error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),
}

impl SkysliceError {
    /// Whether the error belongs to the fatal configuration family.
    ///
    /// Configuration errors abort a run before any slice is evaluated. Everything else is
    /// either recovered per slice (metric evaluation) or an I/O failure at the export boundary.
    pub fn is_configuration(&self) -> bool {
        use SkysliceError::*;
        matches!(
            self,
            EmptyHRange
                | UnsortedHRange(_)
                | EmptyOrbitCatalog
                | DuplicateObject(_)
                | NoMatchingObjects
                | InvalidNside(_)
                | InvalidSkyMap(_)
                | MissingField { .. }
                | EmptyPopulation
                | NotAnObjectGrid(_)
                | NonScalarGrid(_)
                | InvalidMetricParameter(_)
                | InvalidConstraint { .. }
                | UnknownColumn(_)
                | UnknownFilter(_)
                | DitherGeneration(_)
        )
    }
}

impl PartialEq for SkysliceError {
    fn eq(&self, other: &Self) -> bool {
        use SkysliceError::*;
        match (self, other) {
            (EmptyHRange, EmptyHRange) => true,
            (UnsortedHRange(a), UnsortedHRange(b)) => a == b,
            (EmptyOrbitCatalog, EmptyOrbitCatalog) => true,
            (DuplicateObject(a), DuplicateObject(b)) => a == b,
            (NoMatchingObjects, NoMatchingObjects) => true,
            (InvalidNside(a), InvalidNside(b)) => a == b,
            (InvalidSkyMap(a), InvalidSkyMap(b)) => a == b,
            (
                MissingField { field: f1, row: r1 },
                MissingField { field: f2, row: r2 },
            ) => f1 == f2 && r1 == r2,
            (EmptyPopulation, EmptyPopulation) => true,
            (NotAnObjectGrid(a), NotAnObjectGrid(b)) => a == b,
            (NonScalarGrid(a), NonScalarGrid(b)) => a == b,
            (InvalidMetricParameter(a), InvalidMetricParameter(b)) => a == b,
            (
                InvalidConstraint { expr: e1, reason: r1 },
                InvalidConstraint { expr: e2, reason: r2 },
            ) => e1 == e2 && r1 == r2,
            (UnknownColumn(a), UnknownColumn(b)) => a == b,
            (UnknownFilter(a), UnknownFilter(b)) => a == b,
            (
                SliceIndexOutOfRange { index: i1, len: l1 },
                SliceIndexOutOfRange { index: i2, len: l2 },
            ) => i1 == i2 && l1 == l2,
            (DitherGeneration(a), DitherGeneration(b)) => a == b,
            (MetricEvaluation(a), MetricEvaluation(b)) => a == b,
            (MissingOrbitElements(a), MissingOrbitElements(b)) => a == b,

            // Not comparable: equal when the variant matches
            (CsvError(_), CsvError(_)) => true,
            (IoError(_), IoError(_)) => true,

            _ => false,
        }
    }
}

#[cfg(test)]
mod skyslice_errors_test {
    use super::*;

    #[test]
    fn configuration_family() {
        assert!(SkysliceError::EmptyHRange.is_configuration());
        assert!(SkysliceError::EmptyPopulation.is_configuration());
        assert!(!SkysliceError::MetricEvaluation("boom".into()).is_configuration());
        assert!(!SkysliceError::MissingOrbitElements(3).is_configuration());
    }

    #[test]
    fn payload_equality() {
        assert_eq!(
            SkysliceError::MissingField { field: "seeing", row: 2 },
            SkysliceError::MissingField { field: "seeing", row: 2 }
        );
        assert_ne!(
            SkysliceError::InvalidNside(3),
            SkysliceError::InvalidNside(5)
        );
    }
}
