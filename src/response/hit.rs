use bytes::Bytes;
use log::trace;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::{Error, Result},
    record::{lossless_i64, required},
    response::common::{Explanation, HitsTotal, Relation},
    token::{Token, TokenStream},
};

use std::{collections::HashMap, convert::TryFrom};

/// One element of a hit's `sort` array.
#[derive(Clone, Debug, PartialEq)]
pub enum SortValue {
    Null,
    Long(i64),
    Double(f64),
    /// Strings and anything non numeric, kept as comparable bytes.
    Bytes(Bytes),
}

impl SortValue {
    fn from_current(stream: &mut TokenStream<'_>, token: Token) -> Result<Self> {
        Ok(match token {
            Token::Null => SortValue::Null,
            Token::Number => {
                let number = stream.number()?;
                match lossless_i64(&number) {
                    Some(value) if !number.is_f64() => SortValue::Long(value),
                    _ => SortValue::Double(stream.double_value()?),
                }
            }
            Token::String | Token::Bool => SortValue::Bytes(Bytes::from(stream.text()?)),
            _ => SortValue::Bytes(stream.copy_current_structure()?),
        })
    }
}

#[derive(Clone, Debug)]
pub struct Hit {
    pub index: String,
    pub ty: String,
    pub id: String,
    /// NaN when the server did not score the hit.
    pub score: f32,
    /// 0 when no `_version` was sent.
    pub version: i64,
    pub source: Option<Bytes>,
    pub fields: HashMap<String, Vec<Value>>,
    pub sort: Vec<SortValue>,
    pub highlight: HashMap<String, Vec<String>>,
    pub matched_queries: Vec<String>,
    pub explanation: Option<Explanation>,
    pub shard: Option<String>,
    pub node: Option<String>,
}

impl Hit {
    /// Parses the hit object the stream is positioned on.
    pub fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        stream.expect_current(Token::StartObject, "a hit object")?;

        let (mut index, mut ty, mut id) = (None, None, None);
        let mut score = f32::NAN;
        let mut version = 0;
        let mut source = None;
        let mut fields = HashMap::new();
        let mut sort = Vec::new();
        let mut highlight = HashMap::new();
        let mut matched_queries = Vec::new();
        let mut explanation = None;
        let (mut shard, mut node) = (None, None);

        while let Some((name, token)) = stream.next_field()? {
            match name.as_str() {
                "_index" => index = stream.optional_text()?,
                "_type" => ty = stream.optional_text()?,
                "_id" => id = stream.optional_text()?,
                "_score" => {
                    score = stream
                        .optional_double()?
                        .map_or(f32::NAN, |value| value as f32)
                }
                "_version" => version = stream.optional_long()?.unwrap_or(0),
                "_source" if token == Token::Null => source = None,
                "_source" => source = Some(stream.copy_current_structure()?),
                "fields" if token == Token::StartObject => fields = parse_fields(stream)?,
                "sort" if token == Token::StartArray => sort = parse_sort(stream)?,
                "highlight" if token == Token::StartObject => highlight = stream.deserialize()?,
                "matched_queries" if token == Token::StartArray => {
                    matched_queries = stream.deserialize()?
                }
                "_explanation" if token == Token::StartObject => {
                    explanation = Some(stream.deserialize()?)
                }
                "_shard" => shard = stream.optional_text()?,
                "_node" => node = stream.optional_text()?,
                _ => {
                    trace!("skipping hit field {}", name);
                    stream.skip_children()?;
                }
            }
        }

        Ok(Hit {
            index: required(index, "_index")?,
            ty: required(ty, "_type")?,
            id: required(id, "_id")?,
            score,
            version,
            source,
            fields,
            sort,
            highlight,
            matched_queries,
            explanation,
            shard,
            node,
        })
    }

    pub fn source_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.source {
            Some(source) => Ok(Some(serde_json::from_slice(source)?)),
            None => Ok(None),
        }
    }

    /// First value of a stored field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).and_then(|values| values.first())
    }
}

// a scalar field value becomes a single element list
fn parse_fields(stream: &mut TokenStream<'_>) -> Result<HashMap<String, Vec<Value>>> {
    let mut fields = HashMap::new();
    while let Some((name, _)) = stream.next_field()? {
        let values = match stream.value()? {
            Value::Array(values) => values,
            value => vec![value],
        };
        fields.insert(name, values);
    }
    Ok(fields)
}

fn parse_sort(stream: &mut TokenStream<'_>) -> Result<Vec<SortValue>> {
    let mut sort = Vec::new();
    loop {
        match stream.next_required()? {
            Token::EndArray => return Ok(sort),
            token => sort.push(SortValue::from_current(stream, token)?),
        }
    }
}

/// The hits envelope of a search, in rank order.
#[derive(Clone, Debug, Default)]
pub struct Hits {
    pub total: HitsTotal,
    pub max_score: Option<f32>,
    pub hits: Vec<Hit>,
}

impl Hits {
    pub fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        stream.expect_current(Token::StartObject, "a hits object")?;
        let mut hits = Hits::default();

        while let Some((name, token)) = stream.next_field()? {
            match (name.as_str(), token) {
                ("total", Token::Number) => {
                    let total = stream.long_value()?;
                    hits.total = HitsTotal {
                        value: u64::try_from(total).map_err(|_| {
                            Error::invalid("total", format!("`{}` is negative", total))
                        })?,
                        relation: Relation::Eq,
                    }
                }
                ("total", Token::StartObject) => hits.total = stream.deserialize()?,
                ("max_score", _) => {
                    hits.max_score = stream.optional_double()?.map(|value| value as f32)
                }
                ("hits", Token::StartArray) => loop {
                    match stream.next_required()? {
                        Token::EndArray => break,
                        _ => hits.hits.push(Hit::parse(stream)?),
                    }
                },
                _ => {
                    trace!("skipping hits field {}", name);
                    stream.skip_children()?;
                }
            }
        }

        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hit> {
        self.hits.iter()
    }
}

impl IntoIterator for Hits {
    type Item = Hit;
    type IntoIter = std::vec::IntoIter<Hit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}
