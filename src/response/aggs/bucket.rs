use log::trace;

use crate::{
    error::Result,
    record::{lossless_i64, required},
    response::aggs::{parse_body, Aggregations, ParseAggregation},
    token::{Token, TokenStream},
};

use std::{fmt, net::Ipv4Addr};

/// A bucket key as the server sent it.
#[derive(Clone, Debug, PartialEq)]
pub enum BucketKey {
    Text(String),
    Long(i64),
    Double(f64),
}

impl BucketKey {
    fn from_current(stream: &TokenStream<'_>, token: Token) -> Result<Self> {
        if token != Token::Number {
            return Ok(BucketKey::Text(stream.text()?));
        }
        let number = stream.number()?;
        match lossless_i64(&number) {
            Some(value) if !number.is_f64() => Ok(BucketKey::Long(value)),
            _ => Ok(BucketKey::Double(stream.double_value()?)),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BucketKey::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            BucketKey::Long(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            BucketKey::Long(value) => Some(*value as f64),
            BucketKey::Double(value) => Some(*value),
            BucketKey::Text(_) => None,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BucketKey::Text(text) => f.write_str(text),
            BucketKey::Long(value) => write!(f, "{}", value),
            BucketKey::Double(value) => write!(f, "{}", value),
        }
    }
}

/// Reads one bucket object.
///
/// `field` takes the kind's own keys; any other object valued field is kept
/// as a sub-aggregation of the bucket.
fn parse_bucket<F>(stream: &mut TokenStream<'_>, mut field: F) -> Result<(i64, Aggregations)>
where
    F: FnMut(&str, Token, &mut TokenStream<'_>) -> Result<bool>,
{
    stream.expect_current(Token::StartObject, "a bucket object")?;
    let mut doc_count = 0;
    let mut aggregations = Aggregations::new();

    while let Some((name, token)) = stream.next_field()? {
        if name == "doc_count" {
            doc_count = stream.optional_long()?.unwrap_or(0);
        } else if name == "meta" {
            stream.skip_children()?;
        } else if field(&name, token, stream)? {
            continue;
        } else if token == Token::StartObject {
            let raw = stream.copy_current_structure()?;
            aggregations.insert_raw(name, raw);
        } else {
            trace!("skipping bucket field {}", name);
            stream.skip_children()?;
        }
    }

    Ok((doc_count, aggregations))
}

/// The part shared by buckets keyed by a term or a number.
struct KeyedBucket {
    key: BucketKey,
    key_as_string: Option<String>,
    doc_count: i64,
    aggregations: Aggregations,
}

impl KeyedBucket {
    /// `extra` takes the kind's fields beyond `key` and `key_as_string`. The
    /// object key of a keyed bucket list stands in for a missing `key`.
    fn parse<F>(keyed: Option<String>, stream: &mut TokenStream<'_>, mut extra: F) -> Result<Self>
    where
        F: FnMut(&str, &mut TokenStream<'_>) -> Result<bool>,
    {
        let mut key = None;
        let mut key_as_string = None;
        let (doc_count, aggregations) = parse_bucket(stream, |name, token, stream| {
            match name {
                "key" => key = Some(BucketKey::from_current(stream, token)?),
                "key_as_string" => key_as_string = stream.optional_text()?,
                _ => return extra(name, stream),
            }
            Ok(true)
        })?;
        Ok(KeyedBucket {
            key: required(key.or_else(|| keyed.map(BucketKey::Text)), "key")?,
            key_as_string,
            doc_count,
            aggregations,
        })
    }
}

/// Buckets come as an array, or as an object keyed by bucket name when the
/// request asked for `keyed` output.
fn parse_buckets<B, F>(stream: &mut TokenStream<'_>, token: Token, mut bucket: F) -> Result<Vec<B>>
where
    F: FnMut(Option<String>, &mut TokenStream<'_>) -> Result<B>,
{
    let mut buckets = Vec::new();
    match token {
        Token::StartArray => loop {
            match stream.next_required()? {
                Token::EndArray => break,
                _ => buckets.push(bucket(None, stream)?),
            }
        },
        Token::StartObject => {
            while let Some((key, _)) = stream.next_field()? {
                buckets.push(bucket(Some(key), stream)?);
            }
        }
        other => return Err(stream.unexpected("a buckets array or object", Some(other))),
    }
    Ok(buckets)
}

/// Doc count and sub-aggregations of a single bucket kind.
#[derive(Clone, Debug, Default)]
pub struct SingleBucket {
    pub doc_count: i64,
    pub aggregations: Aggregations,
}

impl SingleBucket {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let (doc_count, aggregations) = parse_bucket(stream, |_, _, _| Ok(false))?;
        Ok(SingleBucket {
            doc_count,
            aggregations,
        })
    }
}

shared_shape!(SingleBucket: Global, Filter, Missing, Nested, ReverseNested, Children);

#[derive(Clone, Debug)]
pub struct TermsBucket {
    pub key: BucketKey,
    pub key_as_string: Option<String>,
    pub doc_count: i64,
    pub doc_count_error_upper_bound: Option<i64>,
    pub aggregations: Aggregations,
}

#[derive(Clone, Debug, Default)]
pub struct Terms {
    pub doc_count_error_upper_bound: Option<i64>,
    pub sum_other_doc_count: Option<i64>,
    pub buckets: Vec<TermsBucket>,
}

impl Terms {
    pub fn bucket(&self, key: &str) -> Option<&TermsBucket> {
        self.buckets
            .iter()
            .find(|bucket| bucket.key.to_string() == key)
    }
}

impl ParseAggregation for Terms {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut terms = Terms::default();
        parse_body(stream, |name, token, stream| {
            match name {
                "doc_count_error_upper_bound" => {
                    terms.doc_count_error_upper_bound = stream.optional_long()?
                }
                "sum_other_doc_count" => terms.sum_other_doc_count = stream.optional_long()?,
                "buckets" => {
                    terms.buckets = parse_buckets(stream, token, |keyed, stream| {
                        let mut error_bound = None;
                        let bucket = KeyedBucket::parse(keyed, stream, |name, stream| {
                            if name != "doc_count_error_upper_bound" {
                                return Ok(false);
                            }
                            error_bound = stream.optional_long()?;
                            Ok(true)
                        })?;
                        Ok(TermsBucket {
                            key: bucket.key,
                            key_as_string: bucket.key_as_string,
                            doc_count: bucket.doc_count,
                            doc_count_error_upper_bound: error_bound,
                            aggregations: bucket.aggregations,
                        })
                    })?
                }
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(terms)
    }
}

#[derive(Clone, Debug)]
pub struct SignificantTermsBucket {
    pub key: BucketKey,
    pub key_as_string: Option<String>,
    pub doc_count: i64,
    pub score: f64,
    pub bg_count: i64,
    pub aggregations: Aggregations,
}

#[derive(Clone, Debug, Default)]
pub struct SignificantTerms {
    pub doc_count: Option<i64>,
    pub bg_count: Option<i64>,
    pub buckets: Vec<SignificantTermsBucket>,
}

impl ParseAggregation for SignificantTerms {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut significant = SignificantTerms::default();
        parse_body(stream, |name, token, stream| {
            match name {
                "doc_count" => significant.doc_count = stream.optional_long()?,
                "bg_count" => significant.bg_count = stream.optional_long()?,
                "buckets" => {
                    significant.buckets = parse_buckets(stream, token, |keyed, stream| {
                        let mut score = 0.0;
                        let mut bg_count = 0;
                        let bucket = KeyedBucket::parse(keyed, stream, |name, stream| {
                            match name {
                                "score" => score = stream.optional_double()?.unwrap_or(0.0),
                                "bg_count" => bg_count = stream.optional_long()?.unwrap_or(0),
                                _ => return Ok(false),
                            }
                            Ok(true)
                        })?;
                        Ok(SignificantTermsBucket {
                            key: bucket.key,
                            key_as_string: bucket.key_as_string,
                            doc_count: bucket.doc_count,
                            score,
                            bg_count,
                            aggregations: bucket.aggregations,
                        })
                    })?
                }
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(significant)
    }
}

#[derive(Clone, Debug)]
pub struct FiltersBucket {
    /// `None` for anonymous filters.
    pub key: Option<String>,
    pub doc_count: i64,
    pub aggregations: Aggregations,
}

#[derive(Clone, Debug, Default)]
pub struct Filters {
    pub buckets: Vec<FiltersBucket>,
}

impl Filters {
    pub fn bucket(&self, key: &str) -> Option<&FiltersBucket> {
        self.buckets
            .iter()
            .find(|bucket| bucket.key.as_deref() == Some(key))
    }
}

impl ParseAggregation for Filters {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut filters = Filters::default();
        parse_body(stream, |name, token, stream| {
            if name != "buckets" {
                return Ok(false);
            }
            filters.buckets = parse_buckets(stream, token, |key, stream| {
                let (doc_count, aggregations) = parse_bucket(stream, |_, _, _| Ok(false))?;
                Ok(FiltersBucket {
                    key,
                    doc_count,
                    aggregations,
                })
            })?;
            Ok(true)
        })?;
        Ok(filters)
    }
}

/// A bucket of `range`, `date_range`, `ip_range` or `geo_distance`.
#[derive(Clone, Debug)]
pub struct RangeBucket {
    pub key: Option<String>,
    pub from: Option<f64>,
    pub from_as_string: Option<String>,
    pub to: Option<f64>,
    pub to_as_string: Option<String>,
    pub doc_count: i64,
    pub aggregations: Aggregations,
}

impl RangeBucket {
    pub fn from_ip(&self) -> Option<Ipv4Addr> {
        ipv4(self.from_as_string.as_deref(), self.from)
    }

    pub fn to_ip(&self) -> Option<Ipv4Addr> {
        ipv4(self.to_as_string.as_deref(), self.to)
    }
}

// older servers send ip bounds as numbers, newer ones only as text
fn ipv4(text: Option<&str>, number: Option<f64>) -> Option<Ipv4Addr> {
    if let Some(address) = text.and_then(|text| text.parse().ok()) {
        return Some(address);
    }
    number
        .filter(|value| *value >= 0.0 && *value <= f64::from(u32::MAX))
        .map(|value| Ipv4Addr::from(value as u32))
}

#[derive(Clone, Debug, Default)]
pub struct RangeBuckets {
    pub buckets: Vec<RangeBucket>,
}

impl RangeBuckets {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut ranges = RangeBuckets::default();
        parse_body(stream, |name, token, stream| {
            if name != "buckets" {
                return Ok(false);
            }
            ranges.buckets = parse_buckets(stream, token, parse_range_bucket)?;
            Ok(true)
        })?;
        Ok(ranges)
    }

    pub fn bucket(&self, key: &str) -> Option<&RangeBucket> {
        self.buckets
            .iter()
            .find(|bucket| bucket.key.as_deref() == Some(key))
    }
}

fn parse_range_bucket(keyed: Option<String>, stream: &mut TokenStream<'_>) -> Result<RangeBucket> {
    let mut key = None;
    let (mut from, mut from_as_string) = (None, None);
    let (mut to, mut to_as_string) = (None, None);
    let (doc_count, aggregations) = parse_bucket(stream, |name, token, stream| {
        match (name, token) {
            ("key", _) => key = stream.optional_text()?,
            ("from", Token::String) => from_as_string = Some(stream.text()?),
            ("from", _) => from = stream.optional_double()?,
            ("from_as_string", _) => from_as_string = stream.optional_text()?,
            ("to", Token::String) => to_as_string = Some(stream.text()?),
            ("to", _) => to = stream.optional_double()?,
            ("to_as_string", _) => to_as_string = stream.optional_text()?,
            _ => return Ok(false),
        }
        Ok(true)
    })?;
    Ok(RangeBucket {
        key: key.or(keyed),
        from,
        from_as_string,
        to,
        to_as_string,
        doc_count,
        aggregations,
    })
}

shared_shape!(RangeBuckets: Range, DateRange, IpRange, GeoDistance);

#[derive(Clone, Debug)]
pub struct HistogramBucket {
    pub key: BucketKey,
    pub key_as_string: Option<String>,
    pub doc_count: i64,
    pub aggregations: Aggregations,
}

#[derive(Clone, Debug, Default)]
pub struct HistogramBuckets {
    pub buckets: Vec<HistogramBucket>,
}

impl HistogramBuckets {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut histogram = HistogramBuckets::default();
        parse_body(stream, |name, token, stream| {
            if name != "buckets" {
                return Ok(false);
            }
            histogram.buckets = parse_buckets(stream, token, |keyed, stream| {
                let bucket = KeyedBucket::parse(keyed, stream, |_, _| Ok(false))?;
                Ok(HistogramBucket {
                    key: bucket.key,
                    key_as_string: bucket.key_as_string,
                    doc_count: bucket.doc_count,
                    aggregations: bucket.aggregations,
                })
            })?;
            Ok(true)
        })?;
        Ok(histogram)
    }
}

shared_shape!(HistogramBuckets: Histogram, DateHistogram);

#[derive(Clone, Debug)]
pub struct GeohashGridBucket {
    pub key: String,
    pub doc_count: i64,
    pub aggregations: Aggregations,
}

#[derive(Clone, Debug, Default)]
pub struct GeohashGrid {
    pub buckets: Vec<GeohashGridBucket>,
}

impl ParseAggregation for GeohashGrid {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut grid = GeohashGrid::default();
        parse_body(stream, |name, token, stream| {
            if name != "buckets" {
                return Ok(false);
            }
            grid.buckets = parse_buckets(stream, token, |keyed, stream| {
                let mut key = keyed;
                let (doc_count, aggregations) = parse_bucket(stream, |name, _, stream| {
                    if name != "key" {
                        return Ok(false);
                    }
                    key = stream.optional_text()?;
                    Ok(true)
                })?;
                Ok(GeohashGridBucket {
                    key: required(key, "key")?,
                    doc_count,
                    aggregations,
                })
            })?;
            Ok(true)
        })?;
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, response::aggs::Max};

    fn parse(body: &str) -> Aggregations {
        let mut stream = TokenStream::new(body.as_bytes());
        stream.next_required().unwrap();
        Aggregations::parse(&mut stream).unwrap()
    }

    #[test]
    fn test_terms_with_sub_aggregation() {
        let aggs = parse(
            r#"{"genres": {
                "doc_count_error_upper_bound": 0,
                "sum_other_doc_count": 3,
                "buckets": [
                    {"key": "rock", "doc_count": 10, "max_play": {"value": 5.0}},
                    {"key": "jazz", "doc_count": 4, "max_play": {"value": null}}
                ]
            }}"#,
        );
        let genres = aggs.get::<Terms>("genres").unwrap().unwrap();
        assert_eq!(genres.sum_other_doc_count, Some(3));
        assert_eq!(genres.buckets.len(), 2);

        let rock = genres.bucket("rock").unwrap();
        assert_eq!(rock.doc_count, 10);
        assert_eq!(rock.key, BucketKey::Text("rock".to_owned()));
        let max = rock.aggregations.get::<Max>("max_play").unwrap().unwrap();
        assert_eq!(max.value, Some(5.0));
        assert!(rock.aggregations.get::<Max>("min_play").unwrap().is_none());
    }

    #[test]
    fn test_numeric_terms_keys() {
        let aggs = parse(
            r#"{"years": {"buckets": [
                {"key": 2014, "doc_count": 1},
                {"key": 1.5, "doc_count": 2},
                {"key": 1388534400000, "key_as_string": "2014-01-01", "doc_count": 3}
            ]}}"#,
        );
        let years = aggs.get::<Terms>("years").unwrap().unwrap();
        assert_eq!(years.buckets[0].key, BucketKey::Long(2014));
        assert_eq!(years.buckets[1].key, BucketKey::Double(1.5));
        assert_eq!(years.buckets[2].key.as_long(), Some(1_388_534_400_000));
        assert_eq!(years.buckets[2].key_as_string.as_deref(), Some("2014-01-01"));
    }

    #[test]
    fn test_bucket_without_key_is_fatal() {
        let aggs = parse(r#"{"genres": {"buckets": [{"doc_count": 1}]}}"#);
        match aggs.get::<Terms>("genres") {
            Err(Error::MissingField(field)) => assert_eq!(field, "key"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_single_bucket_kinds() {
        let aggs = parse(
            r#"{
                "all": {"doc_count": 42, "avg_price": {"value": 3.5}},
                "red": {"doc_count": 7, "meta": {"color": "red"}},
                "comments": {"doc_count": 3, "by_user": {"buckets": [{"key": "bob", "doc_count": 3}]}}
            }"#,
        );
        let all = aggs.get::<Global>("all").unwrap().unwrap();
        assert_eq!(all.doc_count, 42);
        assert_eq!(all.aggregations.names().collect::<Vec<_>>(), vec!["avg_price"]);

        let red = aggs.get::<Filter>("red").unwrap().unwrap();
        assert_eq!(red.doc_count, 7);
        assert!(red.aggregations.is_empty());

        let comments = aggs.get::<Nested>("comments").unwrap().unwrap();
        let by_user = comments.aggregations.get::<Terms>("by_user").unwrap().unwrap();
        assert_eq!(by_user.buckets[0].doc_count, 3);
    }

    #[test]
    fn test_keyed_terms_and_null_key() {
        let aggs = parse(
            r#"{
                "keyed": {"buckets": {"rock": {"doc_count": 2, "doc_count_error_upper_bound": 1}}},
                "nulled": {"buckets": [{"key": null, "doc_count": 1}]}
            }"#,
        );
        let keyed = aggs.get::<Terms>("keyed").unwrap().unwrap();
        assert_eq!(keyed.bucket("rock").unwrap().doc_count_error_upper_bound, Some(1));
        assert!(aggs.get::<Terms>("nulled").is_err());
    }

    #[test]
    fn test_significant_terms() {
        let aggs = parse(
            r#"{"crimes": {"doc_count": 47347, "bg_count": 5064554, "buckets": [
                {"key": "Bicycle theft", "doc_count": 3640, "score": 0.371, "bg_count": 66799}
            ]}}"#,
        );
        let crimes = aggs.get::<SignificantTerms>("crimes").unwrap().unwrap();
        assert_eq!(crimes.bg_count, Some(5_064_554));
        assert_eq!(crimes.buckets[0].score, 0.371);
        assert_eq!(crimes.buckets[0].bg_count, 66799);
    }

    #[test]
    fn test_filters_keyed_and_anonymous() {
        let aggs = parse(
            r#"{
                "messages": {"buckets": {"errors": {"doc_count": 1}, "warnings": {"doc_count": 2}}},
                "anonymous": {"buckets": [{"doc_count": 5}]}
            }"#,
        );
        let messages = aggs.get::<Filters>("messages").unwrap().unwrap();
        assert_eq!(messages.bucket("warnings").unwrap().doc_count, 2);

        let anonymous = aggs.get::<Filters>("anonymous").unwrap().unwrap();
        assert!(anonymous.buckets[0].key.is_none());
        assert_eq!(anonymous.buckets[0].doc_count, 5);
    }

    #[test]
    fn test_range_kinds() {
        let aggs = parse(
            r#"{
                "prices": {"buckets": [
                    {"key": "*-100.0", "to": 100.0, "doc_count": 2},
                    {"key": "100.0-*", "from": 100.0, "doc_count": 4}
                ]},
                "ips": {"buckets": [
                    {"to": 167772165, "to_as_string": "10.0.0.5", "doc_count": 4},
                    {"key": "10.0.0.5-*", "from": "10.0.0.5", "doc_count": 6}
                ]},
                "rings": {"buckets": {"near": {"from": 0.0, "to": 100.0, "doc_count": 3}}}
            }"#,
        );
        let prices = aggs.get::<Range>("prices").unwrap().unwrap();
        assert_eq!(prices.buckets[0].to, Some(100.0));
        assert!(prices.buckets[0].from.is_none());
        assert_eq!(prices.bucket("100.0-*").unwrap().doc_count, 4);

        let ips = aggs.get::<IpRange>("ips").unwrap().unwrap();
        assert_eq!(ips.buckets[0].to_ip(), Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(ips.buckets[1].from_ip(), Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(ips.buckets[1].from.is_none());

        let rings = aggs.get::<GeoDistance>("rings").unwrap().unwrap();
        assert_eq!(rings.bucket("near").unwrap().to, Some(100.0));
    }

    #[test]
    fn test_histograms_and_grid() {
        let aggs = parse(
            r#"{
                "prices": {"buckets": [{"key": 0, "doc_count": 1}, {"key": 50, "doc_count": 0}]},
                "per_month": {"buckets": [{"key_as_string": "2014-02-01", "key": 1391212800000, "doc_count": 2}]},
                "cells": {"buckets": [{"key": "u17", "doc_count": 3}]}
            }"#,
        );
        let prices = aggs.get::<Histogram>("prices").unwrap().unwrap();
        assert_eq!(prices.buckets[1].key, BucketKey::Long(50));
        assert_eq!(prices.buckets[1].doc_count, 0);

        let per_month = aggs.get::<DateHistogram>("per_month").unwrap().unwrap();
        assert_eq!(per_month.buckets[0].key_as_string.as_deref(), Some("2014-02-01"));

        let cells = aggs.get::<GeohashGrid>("cells").unwrap().unwrap();
        assert_eq!(cells.buckets[0].key, "u17");
    }
}
