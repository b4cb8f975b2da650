//! Turns trend samples into outbound measurements and computes the next cursor.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::value::NumericValue;

/// One sample returned by the platform's data-trend query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSample {
    #[serde(default)]
    pub asset_id: Option<i32>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// `null` decodes as an empty map
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Finest timestamp precision every supported store keeps (Postgres `timestamptz`).
const CURSOR_PRECISION_DIGITS: u16 = 6;

/// One entry of a bulk-create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    /// RFC 3339 timestamp with millisecond precision in UTC
    pub read_at: String,
    pub value: Option<i64>,
}

impl Measurement {
    pub fn new(read_at: DateTime<Utc>, value: Option<i64>) -> Self {
        Self {
            read_at: read_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    /// Measurements in the order the samples arrived
    pub measurements: Vec<Measurement>,
    /// Newest timestamp seen, never older than the previous cursor
    pub cursor: DateTime<Utc>,
}

impl Conversion {
    pub fn advanced_from(&self, previous: DateTime<Utc>) -> bool {
        self.cursor > previous
    }
}

/// Keeps samples strictly newer than `cursor` and extracts `attribute_name` from them.
///
/// Samples without a timestamp are ignored. Samples without a numeric value still
/// move the cursor but produce no measurement. Timestamps are truncated to microseconds.
pub fn convert(
    samples: &[TrendSample],
    attribute_name: &str,
    cursor: DateTime<Utc>,
) -> Conversion {
    let mut measurements = Vec::new();
    let mut latest = cursor;

    for sample in samples {
        let Some(timestamp) = sample.timestamp else {
            continue;
        };
        // Compare at stored precision, otherwise a truncated cursor re-admits the same sample.
        let timestamp = timestamp.trunc_subsecs(CURSOR_PRECISION_DIGITS);
        if timestamp <= cursor {
            continue;
        }
        latest = latest.max(timestamp);

        if let Some(value) = sample.data.get(attribute_name).and_then(NumericValue::from_json) {
            measurements.push(Measurement::new(
                timestamp,
                Some(value.to_measurement_value()),
            ));
        }
    }

    Conversion {
        measurements,
        cursor: latest,
    }
}
