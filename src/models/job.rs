use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Status of a verification job as reported by the backend.
///
/// The pipeline reports an in-flight job as `PROCESSING`; any status the client
/// does not recognise is treated as still running so the session keeps polling.
#[derive(Debug, Clone, Copy, Serialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum JobStatus {
    Pending,
    #[strum(to_string = "RUNNING", serialize = "PROCESSING")]
    Running,
    Complete,
    Failed,
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|_| {
            tracing::warn!(status = %raw, "Unrecognised job status, treating as running");
            JobStatus::Running
        }))
    }
}

impl JobStatus {
    /// COMPLETE and FAILED end a polling session.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

/// Opaque job identifier assigned by the backend.
///
/// The backend hands out integer ids today; the client never interprets them
/// and accepts either a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_opaque_id(deserializer).map(JobId)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OpaqueId {
    Number(u64),
    Text(String),
}

/// Accepts `42` or `"42"` and yields the textual form.
pub(crate) fn deserialize_opaque_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<String, D::Error> {
    match OpaqueId::deserialize(deserializer)? {
        OpaqueId::Number(n) => Ok(n.to_string()),
        OpaqueId::Text(s) => Ok(s),
    }
}

/// Client-side view of a submitted verification job.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationJob {
    pub id: JobId,
    pub status: JobStatus,
    pub expected_count: Option<usize>,
    pub submitted_at: DateTime<Utc>,
}

impl VerificationJob {
    pub fn submitted(id: JobId, expected_count: Option<usize>) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            expected_count,
            submitted_at: Utc::now(),
        }
    }
}

/// Response body of the submit endpoint.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub id: JobId,
}

/// One entry of the status payload's `results` array.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawResult {
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Response body of the status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub expected_count: Option<u64>,
    #[serde(default)]
    pub results: Vec<RawResult>,
}

impl StatusResponse {
    /// Best-effort expected record count.
    ///
    /// An explicit `expected_count` wins. Otherwise, on `COMPLETE` only, the
    /// first integer in the free-text `details` is used; other statuses put
    /// error text there.
    pub fn expected_count(&self) -> Option<usize> {
        if let Some(n) = self.expected_count {
            return usize::try_from(n).ok();
        }
        match self.status {
            JobStatus::Complete => self.details.as_deref().and_then(first_integer),
            _ => None,
        }
    }
}

fn first_integer(text: &str) -> Option<usize> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Records received against records expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Progress {
    pub received: usize,
    pub expected: Option<usize>,
}

impl Progress {
    /// Fraction complete in `[0, ∞)`; `0.0` when the expected count is zero or unknown.
    pub fn fraction(&self) -> f64 {
        match self.expected {
            Some(expected) if expected > 0 => self.received as f64 / expected as f64,
            _ => 0.0,
        }
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.expected {
            Some(expected) => write!(f, "{}/{}", self.received, expected),
            None => write!(f, "{}/?", self.received),
        }
    }
}
