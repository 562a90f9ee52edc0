//! The exit contract's validation log row. `DatabaseValidator` (in
//! `lci-transform`) produces these; this crate only defines the shape so
//! both the transform and driver crates can depend on it without a cycle.

use serde::{Deserialize, Serialize};

/// One row of the NDJSON-shaped validation log: `{scenario, model, year,
/// name, reference_product, location, reason, message}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub scenario: String,
    pub model: String,
    pub year: i32,
    pub name: String,
    pub reference_product: String,
    pub location: String,
    pub reason: String,
    pub message: String,
}

impl ValidationRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scenario: impl Into<String>,
        model: impl Into<String>,
        year: i32,
        name: impl Into<String>,
        reference_product: impl Into<String>,
        location: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            scenario: scenario.into(),
            model: model.into(),
            year,
            name: name.into(),
            reference_product: reference_product.into(),
            location: location.into(),
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Render as one NDJSON line.
    pub fn to_ndjson_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Serialize a batch of records as newline-delimited JSON.
pub fn write_ndjson(records: &[ValidationRecord]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for record in records {
        out.push_str(&record.to_ndjson_line()?);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndjson_round_trip() {
        let record = ValidationRecord::new(
            "SSP2-Base", "REMIND", 2050, "market for steel", "steel", "EUR", "market_sum", "sum was 1.20",
        );
        let line = record.to_ndjson_line().unwrap();
        let parsed: ValidationRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.year, 2050);
        assert_eq!(parsed.reason, "market_sum");
    }

    #[test]
    fn write_ndjson_batches_records() {
        let records = vec![
            ValidationRecord::new("s", "m", 2050, "a", "a", "DE", "r1", "m1"),
            ValidationRecord::new("s", "m", 2050, "b", "b", "FR", "r2", "m2"),
        ];
        let text = write_ndjson(&records).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
