//! Exchange records: outward measurements and inward actions
//!
//! A measurement carries one or more named numeric metrics for a
//! (group, subject, timestamp) triple. An action addresses a
//! (group, subject) pair with a single optional value; an absent value
//! means "no action this step" and is a normal outcome, not an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One outward measurement record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Scenario group tag, e.g. `"TsRateControl"`
    pub group: String,
    /// Subject the metrics describe (a node, link or aggregate id)
    pub subject_id: u32,
    /// Simulated timestamp the metrics were gathered at
    pub timestamp_ms: u64,
    /// Named metrics; names are dotted scenario identifiers like
    /// `"meas::succ"`
    pub metrics: BTreeMap<String, f64>,
}

impl Measurement {
    /// Start an empty record for a (group, subject, timestamp) triple
    pub fn new(group: impl Into<String>, subject_id: u32, timestamp_ms: u64) -> Self {
        Self { group: group.into(), subject_id, timestamp_ms, metrics: BTreeMap::new() }
    }

    /// Append a named metric; several metrics may share one record
    pub fn append(&mut self, name: impl Into<String>, value: f64) -> &mut Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// Value carried by an inward action
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionValue {
    /// Integer payload (mode index, threshold step, ...)
    Int(i64),
    /// Floating-point payload
    Float(f64),
}

impl ActionValue {
    /// Integer view of the value, truncating floats
    pub fn as_i64(&self) -> i64 {
        match self {
            ActionValue::Int(v) => *v,
            ActionValue::Float(v) => *v as i64,
        }
    }

    /// Floating-point view of the value
    pub fn as_f64(&self) -> f64 {
        match self {
            ActionValue::Int(v) => *v as f64,
            ActionValue::Float(v) => *v,
        }
    }
}

/// One inward action record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Scenario group tag the action addresses
    pub group: String,
    /// Subject the action addresses
    pub subject_id: u32,
    /// The dictated value; `None` means no action this step
    pub value: Option<ActionValue>,
}

impl Action {
    /// An action carrying a value
    pub fn new(group: impl Into<String>, subject_id: u32, value: ActionValue) -> Self {
        Self { group: group.into(), subject_id, value: Some(value) }
    }

    /// An explicit "no action this step"
    pub fn none(group: impl Into<String>, subject_id: u32) -> Self {
        Self { group: group.into(), subject_id, value: None }
    }
}
