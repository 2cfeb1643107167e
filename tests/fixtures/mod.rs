//! Raw backend payload builders for the GATE scorecard schema.

#![allow(dead_code)]

use serde_json::{json, Map, Value};

use verify_center::models::job::{JobStatus, RawResult, StatusResponse};
use verify_center::models::verification::{DocumentSource, UploadFile};

/// Wire keys of the default schema, in declaration order.
pub const GATE_FIELDS: &[&str] = &[
    "name",
    "father_name",
    "reg_id",
    "year",
    "paper_code",
    "score",
    "scoreof100",
    "rank",
];

/// A record with every field matched and the given extracted name.
pub fn record(id: u64, extracted_name: &str) -> RawResult {
    record_with(id, extracted_name, &[true; 8])
}

/// A record whose per-field status follows `matches` (in [`GATE_FIELDS`] order).
pub fn record_with(id: u64, extracted_name: &str, matches: &[bool]) -> RawResult {
    let mut data = Map::new();
    data.insert("id".to_string(), json!(id));
    for (field, matched) in GATE_FIELDS.iter().zip(matches) {
        let value = format!("{field}-{id}");
        data.insert(format!("input_{field}"), json!(&value));
        let extracted = if *field == "name" {
            extracted_name.to_string()
        } else {
            value
        };
        data.insert(format!("extracted_{field}"), json!(extracted));
        let literal = if *matched { "True" } else { "False" };
        data.insert(format!("{field}_status"), json!(literal));
    }
    RawResult {
        data: Value::Object(data),
    }
}

pub fn status(status: JobStatus, results: Vec<RawResult>) -> StatusResponse {
    StatusResponse {
        status,
        details: None,
        expected_count: None,
        results,
    }
}

pub fn status_with_details(
    status: JobStatus,
    details: &str,
    results: Vec<RawResult>,
) -> StatusResponse {
    StatusResponse {
        details: Some(details.to_string()),
        ..self::status(status, results)
    }
}

pub fn master_csv() -> UploadFile {
    UploadFile::new(
        "master.csv",
        b"id,name,father_name,registration_number\n1001,Asha Rao,R Rao,CS23S1\n".to_vec(),
    )
}

pub fn documents(count: usize) -> DocumentSource {
    DocumentSource::Files(
        (0..count)
            .map(|i| UploadFile::new(format!("{}_GATE.pdf", 1001 + i), vec![0x25, 0x50, 0x44, 0x46]))
            .collect(),
    )
}
