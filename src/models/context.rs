use serde::{Deserialize, Deserializer, Serialize};

use super::job::deserialize_opaque_id;

/// Opaque key of a grouping context in the backend's registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ContextId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_opaque_id(deserializer).map(ContextId)
    }
}

/// A grouping context (e.g. one advertisement or intake round).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub id: ContextId,
    pub name: String,
}

/// Body of the create-context request.
#[derive(Debug, Serialize)]
pub struct NewContext<'a> {
    pub name: &'a str,
}
