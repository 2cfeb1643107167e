use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Per-record outcome after transformation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
pub enum OverallStatus {
    Complete,
    Failed,
}

/// Expected vs. extracted value for one declared field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldComparison {
    pub label: String,
    pub input: String,
    pub extracted: String,
    pub matched: bool,
}

/// Structured comparison derived from one raw backend record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchReport {
    pub record_id: String,
    pub source_label: String,
    pub overall_status: OverallStatus,
    pub fields: Vec<FieldComparison>,
    pub matched_count: usize,
    pub total_fields: usize,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub phone: Option<String>,
}

impl MatchReport {
    /// Look up a field comparison by its display label.
    pub fn field(&self, label: &str) -> Option<&FieldComparison> {
        self.fields.iter().find(|f| f.label == label)
    }

    pub fn is_full_match(&self) -> bool {
        self.matched_count == self.total_fields
    }
}
