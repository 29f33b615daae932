//! Metric samples.
//!
//! A [`MetricSample`] is one named, dimensioned observation. Samples are
//! independent: the same name and dimension set may appear many times in one
//! batch and the backend aggregates them.
//!
//! The unit is inferred from the name. Names ending in `Duration`,
//! `ProcessingTime` or `Latency` are milliseconds; everything else is a count.
//! Renaming a metric can therefore change its unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MILLISECOND_SUFFIXES: [&str; 3] = ["Duration", "ProcessingTime", "Latency"];

/// Unit attached to a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricUnit {
    /// Elapsed time in milliseconds.
    Milliseconds,
    /// Plain count.
    Count,
}

impl MetricUnit {
    /// Infers the unit from a metric name.
    ///
    /// # Example
    ///
    /// ```
    /// use nimbus_telemetry::MetricUnit;
    ///
    /// assert_eq!(MetricUnit::infer("ProcessingTime"), MetricUnit::Milliseconds);
    /// assert_eq!(MetricUnit::infer("AverageItemProcessingTime"), MetricUnit::Milliseconds);
    /// assert_eq!(MetricUnit::infer("Errors"), MetricUnit::Count);
    /// ```
    #[must_use]
    pub fn infer(name: &str) -> Self {
        if MILLISECOND_SUFFIXES
            .iter()
            .any(|suffix| name.ends_with(suffix))
        {
            Self::Milliseconds
        } else {
            Self::Count
        }
    }

    /// Returns the unit label used by sinks.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Milliseconds => "Milliseconds",
            Self::Count => "Count",
        }
    }
}

/// One `(key, value)` pair attached to a sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    /// Dimension key, e.g. `Service`.
    pub name: String,
    /// Dimension value.
    pub value: String,
}

impl Dimension {
    /// Creates a dimension.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A single observation owned by the buffer until it is flushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Metric name.
    pub name: String,
    /// Observed value.
    pub value: f64,
    /// Unit inferred from `name`.
    pub unit: MetricUnit,
    /// Dimensions in insertion order; duplicates are kept.
    pub dimensions: Vec<Dimension>,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    /// Creates a sample stamped with the current time.
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64, dimensions: Vec<Dimension>) -> Self {
        let name = name.into();
        Self {
            unit: MetricUnit::infer(&name),
            name,
            value,
            dimensions,
            timestamp: Utc::now(),
        }
    }

    /// Returns the value of the first dimension called `name`.
    #[must_use]
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }
}
