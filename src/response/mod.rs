pub mod admin;
pub mod aggs;
pub mod bulk;
pub mod common;
pub mod document;
pub mod hit;
pub mod scroll;
pub mod search;
pub mod termvectors;

pub use admin::{
    ClusterHealth, ClusterState, ClusterStats, ClusterUpdateSettings, GetAliases,
    GetIndexTemplates, GetMappings, GetSettings, HealthStatus, NodesHotThreads, Reported,
};
pub use aggs::{Aggregation, AggregationKind, Aggregations, BucketKey};
pub use bulk::{BulkResponse, Item, ItemBody, ItemError};
pub use common::{Explanation, HitsTotal, Relation, ShardFailure, Shards};
pub use document::{
    DeleteResponse, ExistsResponse, ExplainResponse, GetResponse, GetResult, IndexResponse,
    MultiGetItem, MultiGetResponse, UpdateResponse,
};
pub use hit::{Hit, Hits, SortValue};
pub use scroll::ClearScrollResponse;
pub use search::{CountResponse, SearchResponse};
pub use termvectors::{FieldStatistics, FieldTermVector, Term, TermToken, TermVectorResponse};

use bytes::Bytes;
use elasticsearch::http::response::Response;

use crate::{
    error::{Error, Result},
    exception::{from_error_object, parse_error, StructuredError},
    record::Record,
    token::{Token, TokenStream},
};

/// A complete response as handed over by the transport.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Reads the whole body of a transport response.
    pub async fn from_transport(response: Response) -> Result<Self> {
        let status = response.status_code().as_u16();
        let body = response.text().await?;
        Ok(Self::new(status, body))
    }

    /// The remote failure carried by a top level `error` field, if any.
    pub fn remote_error(&self) -> Result<Option<StructuredError>> {
        // empty and plain text bodies carry no error object
        match self.body.iter().find(|byte| !byte.is_ascii_whitespace()) {
            Some(b'{') => {}
            _ => return Ok(None),
        }

        let mut stream = TokenStream::new(&self.body);
        if stream.next_required()? != Token::StartObject {
            return Ok(None);
        }

        while let Some((name, token)) = stream.next_field()? {
            if name != "error" {
                stream.skip_children()?;
                continue;
            }
            return match token {
                Token::Null => Ok(None),
                Token::StartObject => {
                    let error = stream.value()?;
                    Ok(Record::new(&error).map(from_error_object))
                }
                Token::String => parse_error(&stream.text()?).map(Some),
                _ => {
                    let raw = stream.copy_current_structure()?;
                    Ok(Some(StructuredError::Generic {
                        message: String::from_utf8_lossy(&raw).into_owned(),
                    }))
                }
            };
        }
        Ok(None)
    }

    /// Rebuilds `T`, or the remote error when the body carries one.
    pub fn parse<T: FromResponse>(&self) -> Result<T> {
        if let Some(error) = self.remote_error()? {
            return Err(Error::Remote(error));
        }
        T::from_raw(self)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Rebuilds a typed response from its body.
pub trait FromResponse: Sized {
    fn from_body(body: &[u8]) -> Result<Self>;

    fn from_raw(raw: &RawResponse) -> Result<Self> {
        Self::from_body(&raw.body)
    }
}

/// Positions a fresh stream on the root object.
pub(crate) fn open_root<'a>(body: &'a [u8]) -> Result<TokenStream<'a>> {
    let mut stream = TokenStream::new(body);
    let token = stream.next_required()?;
    if token != Token::StartObject {
        return Err(stream.unexpected("a json object", Some(token)));
    }
    Ok(stream)
}

/// Fails on anything after the root value.
pub(crate) fn close_root(stream: &mut TokenStream<'_>) -> Result<()> {
    match stream.next_token()? {
        None => Ok(()),
        Some(token) => Err(stream.unexpected("the end of the document", Some(token))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_field_wins_over_status() {
        let raw = RawResponse::new(200, r#"{"error": "IndexMissingException[[logs] missing]", "status": 404}"#);
        match raw.parse::<CountResponse>() {
            Err(Error::Remote(StructuredError::IndexMissing { index })) => assert_eq!(index, "logs"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_object() {
        let raw = RawResponse::new(
            400,
            r#"{"error": {"root_cause": [], "type": "parsing_exception", "reason": "unknown query [foo]"}, "status": 400}"#,
        );
        assert_eq!(
            raw.remote_error().unwrap(),
            Some(StructuredError::Generic {
                message: "parsing_exception: unknown query [foo]".to_owned()
            })
        );
    }

    #[test]
    fn test_no_error() {
        assert!(RawResponse::new(200, r#"{"count": 1, "nested": {"error": "x"}}"#)
            .remote_error()
            .unwrap()
            .is_none());
        assert!(RawResponse::new(404, "").remote_error().unwrap().is_none());
        assert!(RawResponse::new(200, "[1]").remote_error().unwrap().is_none());
        assert!(RawResponse::new(200, "::: [node-1] hot threads").remote_error().unwrap().is_none());
    }

    #[test]
    fn test_malformed_error_is_fatal() {
        let raw = RawResponse::new(404, r#"{"error": "IndexMissingException[noclosingbracket"}"#);
        assert!(matches!(
            raw.parse::<CountResponse>(),
            Err(Error::MalformedErrorFormat { .. })
        ));
    }

    #[test]
    fn test_close_root_rejects_trailing_data() {
        let body = br#"{"a": 1} {"b": 2}"#;
        let mut stream = open_root(body).unwrap();
        stream.skip_children().unwrap();
        assert!(close_root(&mut stream).is_err());
    }
}
