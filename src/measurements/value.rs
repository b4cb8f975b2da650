//! Numeric values accepted from trend samples.

use serde::Deserialize;
use serde_json::Value;

/// Every numeric representation a trend sample may carry.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumericValue {
    Int(i64),
    Float(f64),
}

impl NumericValue {
    /// Decodes a JSON value. Strings, booleans, null, arrays and objects yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }

    /// Integer measurement value.
    /// Floats are truncated toward zero and saturate at the `i64` bounds.
    pub fn to_measurement_value(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::Float(v) => v.trunc() as i64,
        }
    }
}
