//! Raw backend record → [`MatchReport`].
//!
//! The backend emits one flat JSON object per record with three keys per
//! declared field: the expected input value, the extracted value, and a status
//! literal. Only the exact string `"True"` means matched.

use serde_json::{Map, Value};
use tracing::warn;

use crate::models::job::RawResult;
use crate::models::report::{FieldComparison, MatchReport, OverallStatus};

/// Placeholder for missing, null or empty values.
pub const PLACEHOLDER: &str = "N/A";

/// Reserved extracted-name value written when a document could not be read.
pub const COMPRESSION_FAILED: &str = "COMPRESSION_FAILED";

/// Marker the extraction stage prefixes onto values it failed to produce.
pub const EXTRACTION_ERROR_MARKER: &str = "ERROR:";

/// Wire key → display label for one declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
}

impl FieldSpec {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
        }
    }

    pub fn labelled(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// The declared fields of one job plus the failure conventions around them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub fields: Vec<FieldSpec>,
    /// Field whose extracted value carries the per-record failure sentinel.
    pub sentinel_field: String,
    pub sentinels: Vec<String>,
    pub source_label_suffix: String,
}

impl FieldSchema {
    /// GATE scorecard schema used by the verification pipeline.
    pub fn gate_scorecard() -> Self {
        Self {
            fields: vec![
                FieldSpec::new("name"),
                FieldSpec::new("father_name"),
                FieldSpec::labelled("reg_id", "registration_id"),
                FieldSpec::new("year"),
                FieldSpec::new("paper_code"),
                FieldSpec::new("score"),
                FieldSpec::new("scoreof100"),
                FieldSpec::new("rank"),
            ],
            sentinel_field: "name".to_string(),
            sentinels: vec![COMPRESSION_FAILED.to_string()],
            source_label_suffix: "_GATE".to_string(),
        }
    }

    pub fn total_fields(&self) -> usize {
        self.fields.len()
    }

    fn is_failure_value(&self, extracted: &str) -> bool {
        self.sentinels.iter().any(|s| s == extracted) || extracted.contains(EXTRACTION_ERROR_MARKER)
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::gate_scorecard()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Record payload is not a JSON object (found {0})")]
    NotAnObject(&'static str),
}

/// The single place the `"True"`/`"False"` wire contract is decoded.
///
/// Booleans, `"true"`, `"TRUE"` and anything else count as not matched.
pub fn decode_match_literal(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::String(s)) if s == "True")
}

fn decode_record(data: &Value) -> Result<&Map<String, Value>, TransformError> {
    match data {
        Value::Object(map) => Ok(map),
        Value::Null => Err(TransformError::NotAnObject("null")),
        Value::Bool(_) => Err(TransformError::NotAnObject("bool")),
        Value::Number(_) => Err(TransformError::NotAnObject("number")),
        Value::String(_) => Err(TransformError::NotAnObject("string")),
        Value::Array(_) => Err(TransformError::NotAnObject("array")),
    }
}

/// Render a scalar as display text; `None` for missing, null or empty.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// `<field>_<suffix>` first, then the backend's `<prefix>_<field>` spelling.
fn field_value<'a>(data: &'a Map<String, Value>, key: &str, part: &str) -> Option<&'a Value> {
    data.get(&format!("{key}_{part}"))
        .or_else(|| data.get(&format!("{part}_{key}")))
}

/// Transform one raw record into a match report.
///
/// Pure and idempotent. A malformed record never fails the batch: it is
/// reported with every field defaulted and an overall `Failed` status.
pub fn transform(raw: &RawResult, schema: &FieldSchema) -> MatchReport {
    match decode_record(&raw.data) {
        Ok(data) => transform_fields(data, schema),
        Err(e) => {
            warn!(error = %e, "Malformed result record, defaulting");
            let mut report = transform_fields(&Map::new(), schema);
            report.overall_status = OverallStatus::Failed;
            report
        }
    }
}

/// Transform a whole status payload, preserving record order.
pub fn transform_all(raw: &[RawResult], schema: &FieldSchema) -> Vec<MatchReport> {
    raw.iter().map(|r| transform(r, schema)).collect()
}

fn transform_fields(data: &Map<String, Value>, schema: &FieldSchema) -> MatchReport {
    let id = scalar_text(data.get("id"));

    let fields: Vec<FieldComparison> = schema
        .fields
        .iter()
        .map(|spec| FieldComparison {
            label: spec.label.clone(),
            input: scalar_text(field_value(data, &spec.key, "input"))
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            extracted: scalar_text(field_value(data, &spec.key, "extracted"))
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            matched: decode_match_literal(data.get(&format!("{}_status", spec.key))),
        })
        .collect();

    let matched_count = fields.iter().filter(|f| f.matched).count();

    let sentinel_hit = scalar_text(field_value(data, &schema.sentinel_field, "extracted"))
        .is_some_and(|v| schema.is_failure_value(&v));

    let overall_status = if sentinel_hit {
        OverallStatus::Failed
    } else {
        OverallStatus::Complete
    };

    MatchReport {
        source_label: match &id {
            Some(id) => format!("{}{}", id, schema.source_label_suffix),
            None => "Unknown File".to_string(),
        },
        record_id: id.unwrap_or_else(|| PLACEHOLDER.to_string()),
        overall_status,
        matched_count,
        total_fields: fields.len(),
        fields,
        email: scalar_text(data.get("email")),
        phone: scalar_text(data.get("phone")),
    }
}
