use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::Result,
    exception::{from_error_object, parse_error, StructuredError},
    record::{scalar_to_string, Record},
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Shards {
    #[serde(default)]
    pub total: u32,
    pub skipped: Option<u32>,
    #[serde(default)]
    pub successful: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub failures: Vec<ShardFailure>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShardFailure {
    pub index: Option<String>,
    pub shard: Option<i32>,
    pub node: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Value,
}

impl ShardFailure {
    /// The failure reason as a typed error; older servers send a string,
    /// newer ones an object.
    pub fn structured_reason(&self) -> Result<Option<StructuredError>> {
        match &self.reason {
            Value::Null => Ok(None),
            Value::String(reason) => parse_error(reason).map(Some),
            Value::Object(reason) => Ok(Some(from_error_object(Record::from_map(reason)))),
            other => Ok(Some(StructuredError::Generic {
                message: scalar_to_string(other),
            })),
        }
    }
}

/// How a score was computed, as returned with `explain`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub value: f32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: Vec<Explanation>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Eq,
    Gte,
}

impl Default for Relation {
    fn default() -> Self {
        Relation::Eq
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitsTotal {
    pub value: u64,
    #[serde(default)]
    pub relation: Relation,
}
