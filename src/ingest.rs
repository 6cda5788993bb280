//! Ingestion boundary: turns caller input into a `CanonicalSeries`.
//!
//! The shape of the input (plain numbers vs. records) is resolved exactly once,
//! here, into `RawInput`; nothing downstream branches on it again.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProcessingError, Result};
use crate::types::CanonicalSeries;

/// Structured record carrying at least one position field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default)]
    pub position_raw: Option<f64>,
}

impl PositionRecord {
    pub fn position(value: f64) -> Self {
        Self { position: Some(value), position_raw: None }
    }

    pub fn raw(value: f64) -> Self {
        Self { position: None, position_raw: Some(value) }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RawInput {
    Numeric(Vec<f64>),
    Records(Vec<PositionRecord>),
}

impl RawInput {
    /// Resolve a JSON document (array of numbers or array of objects).
    /// An empty array is an empty numeric series.
    pub fn from_json(value: &Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| ProcessingError::InvalidInput("expected a JSON array".into()))?;

        if items.iter().all(Value::is_number) {
            let values = items.iter().filter_map(Value::as_f64).collect();
            return Ok(RawInput::Numeric(values));
        }

        if items.iter().all(Value::is_object) {
            let records = items
                .iter()
                .map(|item| serde_json::from_value::<PositionRecord>(item.clone()))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            return Ok(RawInput::Records(records));
        }

        Err(ProcessingError::InvalidInput(
            "array must hold only numbers or only objects".into(),
        ))
    }

    pub fn len(&self) -> usize {
        match self {
            RawInput::Numeric(values) => values.len(),
            RawInput::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<f64>> for RawInput {
    fn from(values: Vec<f64>) -> Self {
        RawInput::Numeric(values)
    }
}

impl From<Vec<PositionRecord>> for RawInput {
    fn from(records: Vec<PositionRecord>) -> Self {
        RawInput::Records(records)
    }
}

/// Build the canonical series with both position channels populated.
pub fn normalize(input: RawInput) -> Result<CanonicalSeries> {
    match input {
        RawInput::Numeric(values) => Ok(CanonicalSeries::from_raw(values)),
        RawInput::Records(records) => {
            let mut raw = Vec::with_capacity(records.len());
            let mut position = Vec::with_capacity(records.len());
            for (index, record) in records.iter().enumerate() {
                let r = record
                    .position_raw
                    .or(record.position)
                    .ok_or(ProcessingError::MissingPosition { index })?;
                raw.push(r);
                position.push(record.position.unwrap_or(r));
            }
            Ok(CanonicalSeries::new(raw, position))
        }
    }
}
