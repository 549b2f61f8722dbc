//! # Summary reducers
//!
//! A [`SummaryReducer`] collapses a finished [`ResultGrid`] into a single named value:
//!
//! * [`SummaryStat`] – scalar statistics over the unmasked cells of a scalar grid.
//! * [`Completeness`](completeness::Completeness) – H-magnitude completeness curve of an
//!   object × H grid.
//!
//! Any summary of a grid without any unmasked cell is itself masked
//! (`SummaryValue::Scalar(None)`), including `Count` and `Completeness`.
//!
//! [`SummaryReducer::validate`] checks a reducer against the slice points of its bundle before
//! a run evaluates anything, so a mismatched summary is a configuration error.
pub mod completeness;

use std::fmt;

use crate::{
    metrics::median, results::ResultGrid, skyslice_errors::SkysliceError, slicers::SlicePoint,
};

use self::completeness::CompletenessCurve;

/// Output of a summary reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryValue {
    Scalar(Option<f64>),
    Curve(CompletenessCurve),
}

impl SummaryValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            SummaryValue::Scalar(v) => *v,
            SummaryValue::Curve(_) => None,
        }
    }

    pub fn as_curve(&self) -> Option<&CompletenessCurve> {
        match self {
            SummaryValue::Curve(c) => Some(c),
            SummaryValue::Scalar(_) => None,
        }
    }
}

pub trait SummaryReducer: Send + Sync {
    fn name(&self) -> String;

    /// Check that the reducer can summarize a grid named `grid` laid over `points`.
    fn validate(&self, _grid: &str, _points: &[SlicePoint]) -> Result<(), SkysliceError> {
        Ok(())
    }

    fn reduce(&self, grid: &ResultGrid) -> Result<SummaryValue, SkysliceError>;
}

/// Scalar statistics over the unmasked cells of a scalar grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SummaryStat {
    Mean,
    Median,
    Count,
    Min,
    Max,
    /// Population standard deviation.
    Rms,
    /// Interquartile range scaled to a Gaussian sigma, `(p75 − p25) / 1.349`.
    RobustRms,
    /// Percentile in `[0, 100]`, linearly interpolated between order statistics.
    Percentile(f64),
}

/// Linearly interpolated percentile of an ascending, non-empty sample.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let pos = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl SummaryStat {
    /// Apply the statistic to a sample; `None` on an empty sample.
    pub fn compute(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let sorted = || {
            let mut s = values.to_vec();
            s.sort_unstable_by(f64::total_cmp);
            s
        };
        Some(match self {
            SummaryStat::Mean => mean,
            SummaryStat::Median => median(values)?,
            SummaryStat::Count => n,
            SummaryStat::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            SummaryStat::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            SummaryStat::Rms => {
                (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt()
            }
            SummaryStat::RobustRms => {
                let s = sorted();
                (percentile(&s, 75.0) - percentile(&s, 25.0)) / 1.349
            }
            SummaryStat::Percentile(p) => percentile(&sorted(), *p),
        })
    }
}

impl fmt::Display for SummaryStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryStat::Mean => write!(f, "Mean"),
            SummaryStat::Median => write!(f, "Median"),
            SummaryStat::Count => write!(f, "Count"),
            SummaryStat::Min => write!(f, "Min"),
            SummaryStat::Max => write!(f, "Max"),
            SummaryStat::Rms => write!(f, "Rms"),
            SummaryStat::RobustRms => write!(f, "RobustRms"),
            SummaryStat::Percentile(p) => write!(f, "{p}th%ile"),
        }
    }
}

impl SummaryReducer for SummaryStat {
    fn name(&self) -> String {
        self.to_string()
    }

    fn validate(&self, _grid: &str, _points: &[SlicePoint]) -> Result<(), SkysliceError> {
        match self {
            SummaryStat::Percentile(p) if !(0.0..=100.0).contains(p) => {
                Err(SkysliceError::InvalidMetricParameter(format!(
                    "percentile must be in [0, 100] (got {p})"
                )))
            }
            _ => Ok(()),
        }
    }

    fn reduce(&self, grid: &ResultGrid) -> Result<SummaryValue, SkysliceError> {
        self.validate(grid.name(), grid.points())?;
        let values = grid.scalar_values()?;
        Ok(SummaryValue::Scalar(self.compute(&values)))
    }
}
