//! # Column naming
//!
//! Survey databases name the same quantity differently from one release to the next
//! (`expMJD` vs `observationStartMJD`, `finSeeing` vs `seeingFwhmEff`, ...). Constraint strings
//! and field-driven metrics therefore resolve names through a [`ColumnNames`] registry instead
//! of hardcoding them.
//!
//! See also
//! ------------
//! * [`Constraint::parse`](crate::observations::constraint::Constraint::parse) – Resolves the
//!   identifiers of a predicate string through this registry.
//! * [`MeanMetric`](crate::metrics::simple::MeanMetric) – Averages a named numeric column.
use std::fmt;

use crate::{constants::FastHashMap, skyslice_errors::SkysliceError};

use super::Visit;

/// Typed column of a [`Visit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Time,
    Night,
    Filter,
    FiveSigmaDepth,
    Seeing,
    Ra,
    Dec,
    Object,
    Magnitude,
}

impl Field {
    /// Canonical name, used to build constraint keys.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Field::Time => "time",
            Field::Night => "night",
            Field::Filter => "filter",
            Field::FiveSigmaDepth => "fiveSigmaDepth",
            Field::Seeing => "seeing",
            Field::Ra => "ra",
            Field::Dec => "dec",
            Field::Object => "objId",
            Field::Magnitude => "magnitude",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Field::Filter)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl Visit {
    /// Numeric value of a column, `None` when the column is absent on this visit or is not
    /// numeric (the filter band).
    pub fn numeric_value(&self, field: Field) -> Option<f64> {
        match field {
            Field::Time => Some(self.time),
            Field::Night => Some(self.night as f64),
            Field::Filter => None,
            Field::FiveSigmaDepth => Some(self.five_sigma_depth),
            Field::Seeing => self.seeing,
            Field::Ra => self.ra,
            Field::Dec => self.dec,
            Field::Object => self.object.map(|id| id as f64),
            Field::Magnitude => self.magnitude,
        }
    }
}

/// Registry mapping column names (and their aliases) to typed [`Field`]s.
///
/// The default registry knows the names of the common survey simulation schemas; extra aliases
/// can be registered with [`ColumnNames::with_alias`].
#[derive(Debug, Clone)]
pub struct ColumnNames {
    aliases: FastHashMap<String, Field>,
}

impl ColumnNames {
    /// Registry with canonical names only.
    pub fn empty() -> Self {
        let mut names = ColumnNames {
            aliases: FastHashMap::default(),
        };
        for field in [
            Field::Time,
            Field::Night,
            Field::Filter,
            Field::FiveSigmaDepth,
            Field::Seeing,
            Field::Ra,
            Field::Dec,
            Field::Object,
            Field::Magnitude,
        ] {
            names.aliases.insert(field.canonical_name().to_string(), field);
        }
        names
    }

    pub fn with_alias(mut self, alias: impl Into<String>, field: Field) -> Self {
        self.aliases.insert(alias.into(), field);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Field, SkysliceError> {
        self.aliases
            .get(name)
            .copied()
            .ok_or_else(|| SkysliceError::UnknownColumn(name.to_string()))
    }
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames::empty()
            .with_alias("expMJD", Field::Time)
            .with_alias("observationStartMJD", Field::Time)
            .with_alias("mjd", Field::Time)
            .with_alias("fiveSigmaDepth", Field::FiveSigmaDepth)
            .with_alias("m5", Field::FiveSigmaDepth)
            .with_alias("finSeeing", Field::Seeing)
            .with_alias("seeingFwhmEff", Field::Seeing)
            .with_alias("fieldRA", Field::Ra)
            .with_alias("fieldDec", Field::Dec)
            .with_alias("objId", Field::Object)
            .with_alias("magV", Field::Magnitude)
            .with_alias("mag", Field::Magnitude)
    }
}
