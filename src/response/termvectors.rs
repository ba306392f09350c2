use log::trace;
use serde::Deserialize;

use crate::{
    error::{Error, Result},
    record::required,
    response::{close_root, open_root, FromResponse},
    token::{Token, TokenStream},
};

use std::{collections::BTreeMap, convert::TryFrom};

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FieldStatistics {
    pub sum_doc_freq: i64,
    pub doc_count: i64,
    pub sum_ttf: i64,
}

/// One occurrence of a term, present when positions or offsets were requested.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TermToken {
    pub position: Option<u32>,
    pub start_offset: Option<u32>,
    pub end_offset: Option<u32>,
    /// Base64 as sent by the server.
    pub payload: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Term {
    pub term: String,
    /// Only with `term_statistics`.
    pub doc_freq: Option<u32>,
    pub term_freq: u32,
    pub total_term_freq: Option<u64>,
    pub score: Option<f64>,
    pub tokens: Vec<TermToken>,
}

impl Term {
    fn parse(term: String, stream: &mut TokenStream<'_>) -> Result<Self> {
        stream.expect_current(Token::StartObject, "a term object")?;
        let mut parsed = Term {
            term,
            ..Term::default()
        };

        while let Some((name, token)) = stream.next_field()? {
            match (name.as_str(), token) {
                ("doc_freq", Token::Number) => parsed.doc_freq = Some(unsigned(stream, "doc_freq")?),
                ("term_freq", Token::Number) => parsed.term_freq = unsigned(stream, "term_freq")?,
                ("ttf", Token::Number) => {
                    let ttf = stream.long_value()?;
                    parsed.total_term_freq = Some(
                        u64::try_from(ttf)
                            .map_err(|_| Error::invalid("ttf", format!("`{}` is negative", ttf)))?,
                    );
                }
                ("score", _) => parsed.score = stream.optional_double()?,
                ("tokens", Token::StartArray) => parsed.tokens = stream.deserialize()?,
                _ => {
                    trace!("skipping term field {}", name);
                    stream.skip_children()?;
                }
            }
        }
        Ok(parsed)
    }
}

fn unsigned(stream: &TokenStream<'_>, field: &str) -> Result<u32> {
    let value = stream.long_value()?;
    u32::try_from(value).map_err(|_| Error::invalid(field, format!("`{}` is out of range", value)))
}

/// The term vector of one field, terms in server order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldTermVector {
    pub field_statistics: Option<FieldStatistics>,
    pub terms: Vec<Term>,
}

impl FieldTermVector {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        stream.expect_current(Token::StartObject, "a field term vector")?;
        let mut vector = FieldTermVector::default();

        while let Some((name, token)) = stream.next_field()? {
            match (name.as_str(), token) {
                ("field_statistics", Token::StartObject) => {
                    vector.field_statistics = Some(stream.deserialize()?)
                }
                ("terms", Token::StartObject) => {
                    while let Some((term, _)) = stream.next_field()? {
                        vector.terms.push(Term::parse(term, stream)?);
                    }
                }
                _ => {
                    trace!("skipping term vector field {}", name);
                    stream.skip_children()?;
                }
            }
        }
        Ok(vector)
    }

    pub fn term(&self, term: &str) -> Option<&Term> {
        self.terms.iter().find(|candidate| candidate.term == term)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TermVectorResponse {
    pub index: String,
    pub ty: String,
    pub id: String,
    /// -1 when no version was sent.
    pub version: i64,
    pub found: bool,
    pub took: Option<u64>,
    /// Keyed by field name; empty when the document was not found.
    pub term_vectors: BTreeMap<String, FieldTermVector>,
}

impl TermVectorResponse {
    pub fn field(&self, field: &str) -> Option<&FieldTermVector> {
        self.term_vectors.get(field)
    }
}

impl FromResponse for TermVectorResponse {
    fn from_body(body: &[u8]) -> Result<Self> {
        let mut stream = open_root(body)?;
        let (mut index, mut ty, mut id) = (None, None, None);
        let mut version = -1;
        let mut found = false;
        let mut took = None;
        let mut term_vectors = BTreeMap::new();

        while let Some((name, token)) = stream.next_field()? {
            match (name.as_str(), token) {
                ("_index", _) => index = stream.optional_text()?,
                ("_type", _) => ty = stream.optional_text()?,
                ("_id", _) => id = stream.optional_text()?,
                ("_version", _) => version = stream.optional_long()?.unwrap_or(-1),
                ("found", _) => found = stream.bool_value()?,
                ("took", _) => {
                    let value = stream.long_value()?;
                    took = Some(u64::try_from(value).map_err(|_| {
                        Error::invalid("took", format!("`{}` is negative", value))
                    })?);
                }
                // `term_vector` on 1.x servers
                ("term_vectors", Token::StartObject) | ("term_vector", Token::StartObject) => {
                    while let Some((field, _)) = stream.next_field()? {
                        term_vectors.insert(field, FieldTermVector::parse(&mut stream)?);
                    }
                }
                _ => {
                    trace!("skipping term vector response field {}", name);
                    stream.skip_children()?;
                }
            }
        }
        close_root(&mut stream)?;

        Ok(TermVectorResponse {
            index: required(index, "_index")?,
            ty: required(ty, "_type")?,
            id: required(id, "_id")?,
            version,
            found,
            took,
            term_vectors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_term_vectors() {
        let response = TermVectorResponse::from_body(
            br#"{
                "_index": "twitter",
                "_type": "tweet",
                "_id": "1",
                "_version": 1,
                "found": true,
                "took": 6,
                "term_vectors": {
                    "text": {
                        "field_statistics": {"sum_doc_freq": 4, "doc_count": 2, "sum_ttf": 6},
                        "terms": {
                            "test": {
                                "doc_freq": 2,
                                "ttf": 4,
                                "term_freq": 3,
                                "tokens": [
                                    {"position": 1, "start_offset": 8, "end_offset": 12, "payload": "d29yZA=="},
                                    {"position": 2, "start_offset": 13, "end_offset": 17}
                                ]
                            },
                            "again": {"term_freq": 1, "score": 0.5}
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(response.index, "twitter");
        assert_eq!(response.version, 1);
        assert!(response.found);
        assert_eq!(response.took, Some(6));

        let text = response.field("text").unwrap();
        assert_eq!(
            text.field_statistics,
            Some(FieldStatistics {
                sum_doc_freq: 4,
                doc_count: 2,
                sum_ttf: 6
            })
        );
        let terms: Vec<&str> = text.terms.iter().map(|term| term.term.as_str()).collect();
        assert_eq!(terms, vec!["test", "again"]);

        let test = text.term("test").unwrap();
        assert_eq!(test.doc_freq, Some(2));
        assert_eq!(test.term_freq, 3);
        assert_eq!(test.total_term_freq, Some(4));
        assert_eq!(test.tokens.len(), 2);
        assert_eq!(test.tokens[0].payload.as_deref(), Some("d29yZA=="));
        assert!(test.tokens[1].payload.is_none());

        let again = text.term("again").unwrap();
        assert!(again.doc_freq.is_none());
        assert_eq!(again.score, Some(0.5));
        assert!(again.tokens.is_empty());
    }

    #[test]
    fn test_not_found_and_legacy_key() {
        let missing = TermVectorResponse::from_body(
            br#"{"_index": "twitter", "_type": "tweet", "_id": "9", "found": false}"#,
        )
        .unwrap();
        assert!(!missing.found);
        assert_eq!(missing.version, -1);
        assert!(missing.term_vectors.is_empty());

        let legacy = TermVectorResponse::from_body(
            br#"{"_index": "i", "_type": "t", "_id": "1", "found": true,
                 "term_vector": {"body": {"terms": {"x": {"term_freq": 1}}}}}"#,
        )
        .unwrap();
        assert_eq!(legacy.field("body").unwrap().terms[0].term, "x");
    }

    #[test]
    fn test_invalid_term_vectors() {
        assert!(matches!(
            TermVectorResponse::from_body(br#"{"_type": "t", "_id": "1", "found": false}"#),
            Err(Error::MissingField(_))
        ));
        assert!(matches!(
            TermVectorResponse::from_body(
                br#"{"_index": "i", "_type": "t", "_id": "1", "term_vectors": {"f": {"terms": {"x": {"term_freq": -2}}}}}"#
            ),
            Err(Error::InvalidField { .. })
        ));
    }
}
