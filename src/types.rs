//! Core types for the extraction pipeline
//!
//! This module defines the values that flow between the task parsers, the
//! participant resolver and the aggregation stage.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Participant identifier as read from the summary table
pub type ParticipantId = String;

/// Experiment instance name, e.g. `flanker_arrows_1` or `nback2`
pub type TaskName = String;

/// A single derived metric value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Counts and lengths
    Integer(i64),
    /// Ratios and reaction-time means
    Number(f64),
    /// Metric undefined for this participant (empty partition, skipped task)
    Missing,
}

impl MetricValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, MetricValue::Missing)
    }

    /// Numeric view of the value, `None` when missing
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Integer(v) => Some(*v as f64),
            MetricValue::Number(v) => Some(*v),
            MetricValue::Missing => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetricValue::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::Integer(v as i64)
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Integer(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(v: Option<f64>) -> Self {
        v.map(MetricValue::Number).unwrap_or(MetricValue::Missing)
    }
}

/// Renders the value as a CSV cell: integral floats keep a trailing `.0`,
/// missing values are empty.
impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(v) => write!(f, "{}", v),
            MetricValue::Number(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            MetricValue::Number(v) => write!(f, "{}", v),
            MetricValue::Missing => Ok(()),
        }
    }
}

/// Flat summary of one participant's run of one task.
///
/// Metric order is the order the parser inserted them in, which is the
/// column order of the aggregated table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRecord {
    entries: Vec<(String, MetricValue)>,
}

impl MetricRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a metric
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<MetricValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for MetricRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
