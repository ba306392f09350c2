use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    exception::{parse_error, StructuredError},
    response::{common::Shards, FromResponse},
};

use std::fmt;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkResponse {
    pub took: u64,
    pub errors: bool,
    pub items: Vec<Item>,
}

impl BulkResponse {
    pub fn succeed_items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|x| x.success())
    }

    pub fn failed_items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|x| !x.success())
    }

    pub fn first_error(&self) -> Option<&ItemError> {
        self.failed_items().find_map(|x| x.body().error.as_ref())
    }
}

impl FromResponse for BulkResponse {
    fn from_body(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// One bulk result, keyed by the action that produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Item {
    #[serde(rename = "create")]
    Create(ItemBody),
    #[serde(rename = "delete")]
    Delete(ItemBody),
    #[serde(rename = "index")]
    Index(ItemBody),
    #[serde(rename = "update")]
    Update(ItemBody),
}

impl Item {
    pub fn body(&self) -> &ItemBody {
        match self {
            Item::Create(body) | Item::Delete(body) | Item::Index(body) | Item::Update(body) => {
                body
            }
        }
    }

    /// A delete of a missing document still reports 404 without an error.
    pub fn success(&self) -> bool {
        let body = self.body();
        body.error.is_none() && body.status >= 200 && body.status < 500
    }

    pub fn error(&self) -> Option<&ItemError> {
        self.body().error.as_ref()
    }

    pub fn id(&self) -> &str {
        &self.body().id
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemBody {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type")]
    pub ty: Option<String>,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_version")]
    pub version: Option<i64>,
    #[serde(rename = "_shards")]
    pub shards: Option<Shards>,
    #[serde(rename = "_seq_no")]
    pub seq_no: Option<i64>,
    #[serde(rename = "_primary_term")]
    pub primary_term: Option<i64>,
    pub result: Option<String>,
    pub status: u16,
    pub error: Option<ItemError>,
}

/// Older servers report item failures as exception text, newer ones as an object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemError {
    Text(String),
    Detail {
        #[serde(rename = "type")]
        ty: String,
        reason: String,
        index_uuid: Option<String>,
        shard: Option<String>,
        index: Option<String>,
    },
}

impl ItemError {
    pub fn structured(&self) -> Result<StructuredError> {
        match self {
            ItemError::Text(message) => parse_error(message),
            ItemError::Detail { ty, reason, .. } => Ok(StructuredError::Generic {
                message: format!("{}: {}", ty, reason),
            }),
        }
    }
}

impl std::error::Error for ItemError {}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ItemError::Text(message) => write!(f, "reason: {}", message),
            ItemError::Detail { reason, .. } => write!(f, "reason: {}", reason),
        }
    }
}
