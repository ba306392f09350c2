use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::Result,
    exception::{from_error_object, parse_error, StructuredError},
    record::{from_body, Record},
    response::{
        common::{Explanation, Shards},
        FromResponse, RawResponse,
    },
};

use std::collections::HashMap;

/// A stored document as returned by get, update-with-get or explain.
#[derive(Clone, Debug, PartialEq)]
pub struct GetResult {
    pub index: String,
    pub ty: String,
    pub id: String,
    /// -1 when the document was not found or no version was sent.
    pub version: i64,
    pub found: bool,
    pub source: Option<Bytes>,
    pub fields: Option<HashMap<String, Vec<Value>>>,
}

impl GetResult {
    /// Builds a result whose identity and payload may sit at different depths,
    /// e.g. the top level of an update response and its `get` object.
    pub fn from_parts(metadata: Record<'_>, payload: Record<'_>) -> Result<Self> {
        let found = payload.bool("found").unwrap_or(false);
        let version = if found {
            payload.i64("_version").unwrap_or(-1)
        } else {
            -1
        };
        build_get_result(metadata, payload, found, version)
    }

    pub fn from_record(record: Record<'_>) -> Result<Self> {
        Self::from_parts(record, record)
    }

    pub fn source_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.source {
            Some(source) => Ok(Some(serde_json::from_slice(source)?)),
            None => Ok(None),
        }
    }
}

fn build_get_result(
    metadata: Record<'_>,
    payload: Record<'_>,
    found: bool,
    version: i64,
) -> Result<GetResult> {
    let (source, fields) = if found {
        let source = match payload.get("_source") {
            Some(source) => Some(Bytes::from(serde_json::to_vec(source)?)),
            None => None,
        };
        (source, Some(normalize_fields(payload.record("fields"))))
    } else {
        (None, None)
    };

    Ok(GetResult {
        index: metadata.require_str("_index")?.to_owned(),
        ty: metadata.require_str("_type")?.to_owned(),
        id: metadata.require_str("_id")?.to_owned(),
        version,
        found,
        source,
        fields,
    })
}

/// Scalar field values become single element lists.
fn normalize_fields(fields: Option<Record<'_>>) -> HashMap<String, Vec<Value>> {
    fields
        .map(|fields| {
            fields
                .map()
                .iter()
                .map(|(name, value)| {
                    let values = match value {
                        Value::Array(values) => values.clone(),
                        value => vec![value.clone()],
                    };
                    (name.clone(), values)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// A top level get is the stored document itself.
pub type GetResponse = GetResult;

impl FromResponse for GetResult {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, GetResult::from_record)
    }
}

fn shards_of(record: Record<'_>) -> Result<Option<Shards>> {
    record.deserialize("_shards")
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexResponse {
    pub index: String,
    pub ty: String,
    pub id: String,
    pub version: i64,
    pub created: bool,
    pub result: Option<String>,
    pub shards: Option<Shards>,
    pub seq_no: Option<i64>,
    pub primary_term: Option<i64>,
}

impl FromResponse for IndexResponse {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            let result = record.string("result");
            Ok(IndexResponse {
                index: record.require_str("_index")?.to_owned(),
                ty: record.require_str("_type")?.to_owned(),
                id: record.require_str("_id")?.to_owned(),
                version: record.i64("_version").unwrap_or(-1),
                created: record
                    .bool("created")
                    .unwrap_or_else(|| result.as_deref() == Some("created")),
                result,
                shards: shards_of(record)?,
                seq_no: record.i64("_seq_no"),
                primary_term: record.i64("_primary_term"),
            })
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteResponse {
    pub index: String,
    pub ty: String,
    pub id: String,
    pub version: i64,
    pub found: bool,
    pub result: Option<String>,
    pub shards: Option<Shards>,
}

impl FromResponse for DeleteResponse {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            let result = record.string("result");
            Ok(DeleteResponse {
                index: record.require_str("_index")?.to_owned(),
                ty: record.require_str("_type")?.to_owned(),
                id: record.require_str("_id")?.to_owned(),
                version: record.i64("_version").unwrap_or(-1),
                found: record
                    .bool("found")
                    .unwrap_or_else(|| result.as_deref() == Some("deleted")),
                result,
                shards: shards_of(record)?,
            })
        })
    }
}

/// An update; `get` is only present when the request asked for fields back.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateResponse {
    pub index: String,
    pub ty: String,
    pub id: String,
    pub version: i64,
    pub created: bool,
    pub result: Option<String>,
    pub shards: Option<Shards>,
    pub get: Option<GetResult>,
}

impl FromResponse for UpdateResponse {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            let result = record.string("result");
            let get = match record.record("get") {
                Some(payload) => Some(GetResult::from_parts(record, payload)?),
                None => None,
            };
            Ok(UpdateResponse {
                index: record.require_str("_index")?.to_owned(),
                ty: record.require_str("_type")?.to_owned(),
                id: record.require_str("_id")?.to_owned(),
                version: record.i64("_version").unwrap_or(-1),
                created: record
                    .bool("created")
                    .unwrap_or_else(|| result.as_deref() == Some("created")),
                result,
                shards: shards_of(record)?,
                get,
            })
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MultiGetItem {
    Found(GetResult),
    Failure {
        index: String,
        ty: Option<String>,
        id: String,
        error: StructuredError,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultiGetResponse {
    pub items: Vec<MultiGetItem>,
}

impl MultiGetResponse {
    pub fn found(&self) -> impl Iterator<Item = &GetResult> {
        self.items.iter().filter_map(|item| match item {
            MultiGetItem::Found(result) if result.found => Some(result),
            _ => None,
        })
    }
}

impl FromResponse for MultiGetResponse {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            let items = record
                .records("docs")
                .unwrap_or_default()
                .into_iter()
                .map(multi_get_item)
                .collect::<Result<Vec<_>>>()?;
            Ok(MultiGetResponse { items })
        })
    }
}

fn multi_get_item(doc: Record<'_>) -> Result<MultiGetItem> {
    let error = match doc.get("error") {
        None => return GetResult::from_record(doc).map(MultiGetItem::Found),
        Some(Value::String(error)) => parse_error(error)?,
        Some(Value::Object(error)) => from_error_object(Record::from_map(error)),
        Some(other) => StructuredError::Generic {
            message: other.to_string(),
        },
    };
    Ok(MultiGetItem::Failure {
        index: doc.require_str("_index")?.to_owned(),
        ty: doc.string("_type"),
        id: doc.require_str("_id")?.to_owned(),
        error,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExplainResponse {
    pub index: String,
    pub ty: String,
    pub id: String,
    pub matched: bool,
    pub explanation: Option<Explanation>,
    pub get: Option<GetResult>,
}

impl FromResponse for ExplainResponse {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            // explain never reports a version for the embedded document
            let get = match record.record("get") {
                Some(payload) => {
                    let found = payload.bool("found").unwrap_or(true);
                    Some(build_get_result(record, payload, found, -1)?)
                }
                None => None,
            };
            Ok(ExplainResponse {
                index: record.require_str("_index")?.to_owned(),
                ty: record.require_str("_type")?.to_owned(),
                id: record.require_str("_id")?.to_owned(),
                matched: record.bool("matched").unwrap_or(false),
                explanation: record.deserialize("explanation")?,
                get,
            })
        })
    }
}

/// Document or search existence. A bare 404 means "does not exist".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExistsResponse {
    pub exists: bool,
}

impl FromResponse for ExistsResponse {
    fn from_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ExistsResponse { exists: true });
        }
        from_body(body, |record| {
            Ok(ExistsResponse {
                exists: record
                    .bool("exists")
                    .or_else(|| record.bool("found"))
                    .unwrap_or(true),
            })
        })
    }

    fn from_raw(raw: &RawResponse) -> Result<Self> {
        if raw.status == 404 {
            return Ok(ExistsResponse { exists: false });
        }
        Self::from_body(&raw.body)
    }
}
