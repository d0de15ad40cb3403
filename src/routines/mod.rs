//! Evaluation routines: run a model over loaders and fold the outputs into
//! the uncertainty metrics.

pub mod classification;
pub mod regression;

pub use classification::{ClassificationRoutine, OodCriterion};
pub use regression::RegressionRoutine;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Named scalar results of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricReport {
    pub values: BTreeMap<String, f64>,
}

impl MetricReport {
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn log(&self, prefix: &str) {
        for (name, value) in &self.values {
            tracing::info!(metric = %format!("{prefix}/{name}"), value, "evaluation");
        }
    }
}

impl fmt::Display for MetricReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.values {
            writeln!(f, "{name:<20} {value:.6}")?;
        }
        Ok(())
    }
}
