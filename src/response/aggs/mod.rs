//! Named aggregation results, parsed on first typed request.
//!
//! Each entry is kept as its raw json sub-document until a caller asks for it
//! with a concrete type, e.g. `aggs.get::<Terms>("genres")`. The parsed value is
//! then cached for that name so later requests share the same `Arc`.

/// Declares kinds that share one parsed shape, each as its own type.
macro_rules! shared_shape {
    ($shape:ident: $($name:ident),+) => {
        $(
            #[derive(Clone, Debug)]
            pub struct $name(pub $shape);

            impl std::ops::Deref for $name {
                type Target = $shape;

                fn deref(&self) -> &$shape {
                    &self.0
                }
            }

            impl crate::response::aggs::ParseAggregation for $name {
                fn parse(stream: &mut crate::token::TokenStream<'_>) -> crate::error::Result<Self> {
                    $shape::parse(stream).map($name)
                }
            }
        )+
    };
}

mod bucket;
mod metrics;

pub use bucket::{
    BucketKey, Children, DateHistogram, DateRange, Filter, Filters, FiltersBucket, GeoDistance,
    GeohashGrid, GeohashGridBucket, Global, Histogram, HistogramBucket, HistogramBuckets, IpRange,
    Missing, Nested, Range, RangeBucket, RangeBuckets, ReverseNested, SignificantTerms,
    SignificantTermsBucket, SingleBucket, Terms, TermsBucket,
};
pub use metrics::{
    Avg, Bounds, Cardinality, CountValue, ExtendedStats, GeoBounds, GeoPoint, Max, Min, Percentile,
    PercentileRanks, Percentiles, PercentilesValues, ScriptedMetric, SingleValue, Stats, Sum,
    TopHits, ValueCount,
};

use bytes::Bytes;
use log::{debug, trace};
use parking_lot::Mutex;

use crate::{
    error::{Error, Result},
    token::{Token, TokenStream},
};

use std::{collections::HashMap, fmt, sync::Arc};

/// Reads one aggregation body; the stream sits on its opening `{`.
pub trait ParseAggregation: Sized {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self>;
}

/// A typed view that can be requested from [`Aggregations::get`].
pub trait Aggregation: ParseAggregation {
    const KIND: AggregationKind;

    #[doc(hidden)]
    fn into_resolved(value: Arc<Self>) -> Resolved;

    #[doc(hidden)]
    fn from_resolved(resolved: &Resolved) -> Option<Arc<Self>>;
}

macro_rules! aggregation_kinds {
    ($($kind:ident => $ty:ident,)*) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum AggregationKind {
            $($kind,)*
        }

        #[doc(hidden)]
        #[derive(Clone, Debug)]
        pub enum Resolved {
            $($kind(Arc<$ty>),)*
        }

        impl Resolved {
            fn kind(&self) -> AggregationKind {
                match self {
                    $(Resolved::$kind(_) => AggregationKind::$kind,)*
                }
            }
        }

        $(
            impl Aggregation for $ty {
                const KIND: AggregationKind = AggregationKind::$kind;

                fn into_resolved(value: Arc<Self>) -> Resolved {
                    Resolved::$kind(value)
                }

                fn from_resolved(resolved: &Resolved) -> Option<Arc<Self>> {
                    match resolved {
                        Resolved::$kind(value) => Some(Arc::clone(value)),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )*
    };
}

aggregation_kinds! {
    Min => Min,
    Max => Max,
    Avg => Avg,
    Sum => Sum,
    ValueCount => ValueCount,
    Cardinality => Cardinality,
    Stats => Stats,
    ExtendedStats => ExtendedStats,
    Percentiles => Percentiles,
    PercentileRanks => PercentileRanks,
    GeoBounds => GeoBounds,
    TopHits => TopHits,
    ScriptedMetric => ScriptedMetric,
    Global => Global,
    Filter => Filter,
    Missing => Missing,
    Nested => Nested,
    ReverseNested => ReverseNested,
    Children => Children,
    Terms => Terms,
    SignificantTerms => SignificantTerms,
    Filters => Filters,
    Range => Range,
    DateRange => DateRange,
    IpRange => IpRange,
    GeoDistance => GeoDistance,
    Histogram => Histogram,
    DateHistogram => DateHistogram,
    GeohashGrid => GeohashGrid,
}

#[derive(Clone, Debug)]
enum Slot {
    Unparsed(Bytes),
    Resolved(Resolved),
}

#[derive(Default)]
pub struct Aggregations {
    names: Vec<String>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Aggregations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures every `name: {...}` entry of the object the stream sits on.
    pub fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        stream.expect_current(Token::StartObject, "an aggregations object")?;
        let mut aggregations = Aggregations::new();
        while let Some((name, token)) = stream.next_field()? {
            if token != Token::StartObject {
                trace!("skipping non object aggregation {}", name);
                stream.skip_children()?;
                continue;
            }
            let raw = stream.copy_current_structure()?;
            aggregations.insert_raw(name, raw);
        }
        Ok(aggregations)
    }

    pub(crate) fn insert_raw(&mut self, name: String, raw: Bytes) {
        let slots = self.slots.get_mut();
        if slots.insert(name.clone(), Slot::Unparsed(raw)).is_none() {
            self.names.push(name);
        }
    }

    /// Names in the order the server sent them.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.lock().contains_key(name)
    }

    /// Returns the aggregation `name` viewed as `A`.
    ///
    /// `Ok(None)` when no aggregation has that name. Asking for a name that was
    /// already resolved as another kind fails with
    /// [`Error::AggregationKindMismatch`].
    pub fn get<A: Aggregation>(&self, name: &str) -> Result<Option<Arc<A>>> {
        let mut slots = self.slots.lock();
        let slot = match slots.get_mut(name) {
            Some(slot) => slot,
            None => return Ok(None),
        };

        match slot {
            Slot::Resolved(resolved) => match A::from_resolved(resolved) {
                Some(value) => Ok(Some(value)),
                None => Err(Error::AggregationKindMismatch {
                    name: name.to_owned(),
                    expected: A::KIND,
                    found: resolved.kind(),
                }),
            },
            Slot::Unparsed(raw) => {
                let raw = raw.clone();
                let mut stream = TokenStream::new(&raw);
                stream.next_required()?;
                let value = Arc::new(A::parse(&mut stream)?);
                debug!("resolved aggregation {} as {:?}", name, A::KIND);
                *slot = Slot::Resolved(A::into_resolved(Arc::clone(&value)));
                Ok(Some(value))
            }
        }
    }
}

impl Clone for Aggregations {
    fn clone(&self) -> Self {
        Self {
            names: self.names.clone(),
            slots: Mutex::new(self.slots.lock().clone()),
        }
    }
}

impl fmt::Debug for Aggregations {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Aggregations")
            .field("names", &self.names)
            .finish()
    }
}

/// Walks the fields of an aggregation body, skipping `meta` and anything the
/// kind does not consume.
pub(crate) fn parse_body<F>(stream: &mut TokenStream<'_>, mut field: F) -> Result<()>
where
    F: FnMut(&str, Token, &mut TokenStream<'_>) -> Result<bool>,
{
    stream.expect_current(Token::StartObject, "an aggregation object")?;
    while let Some((name, token)) = stream.next_field()? {
        if name == "meta" || !field(&name, token, stream)? {
            trace!("skipping aggregation field {}", name);
            stream.skip_children()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Aggregations {
        let mut stream = TokenStream::new(body.as_bytes());
        stream.next_required().unwrap();
        Aggregations::parse(&mut stream).unwrap()
    }

    #[test]
    fn test_resolved_once_and_shared() {
        let aggs = parse(r#"{"max_price": {"value": 12.5}, "genres": {"buckets": []}}"#);
        assert_eq!(aggs.names().collect::<Vec<_>>(), vec!["max_price", "genres"]);

        let first = aggs.get::<Max>("max_price").unwrap().unwrap();
        let second = aggs.get::<Max>("max_price").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.value, Some(12.5));
    }

    #[test]
    fn test_unknown_name_is_absent() {
        let aggs = parse(r#"{"max_price": {"value": 12.5}}"#);
        assert!(aggs.get::<Max>("min_price").unwrap().is_none());
        assert!(Aggregations::new().get::<Terms>("anything").unwrap().is_none());
    }

    #[test]
    fn test_kind_mismatch_after_resolution() {
        let aggs = parse(r#"{"price": {"value": 3.0}}"#);
        aggs.get::<Max>("price").unwrap();
        match aggs.get::<Min>("price") {
            Err(Error::AggregationKindMismatch {
                name,
                expected,
                found,
            }) => {
                assert_eq!(name, "price");
                assert_eq!(expected, AggregationKind::Min);
                assert_eq!(found, AggregationKind::Max);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failed_parse_leaves_entry_unresolved() {
        let aggs = parse(r#"{"price": {"value": "not a number"}}"#);
        assert!(aggs.get::<Max>("price").is_err());
        let value = aggs.get::<ScriptedMetric>("price").unwrap().unwrap();
        assert_eq!(value.value, serde_json::json!("not a number"));
    }

    #[test]
    fn test_concurrent_lookups_share_one_value() {
        let aggs = Arc::new(parse(
            r#"{"genres": {"buckets": [{"key": "rock", "doc_count": 3}, {"key": "jazz", "doc_count": 1}]}}"#,
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let aggs = Arc::clone(&aggs);
                std::thread::spawn(move || aggs.get::<Terms>("genres").unwrap().unwrap())
            })
            .collect();
        let resolved: Vec<Arc<Terms>> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        assert_eq!(resolved[0].buckets.len(), 2);
        assert!(resolved.iter().all(|terms| Arc::ptr_eq(terms, &resolved[0])));
        let again = aggs.get::<Terms>("genres").unwrap().unwrap();
        assert!(Arc::ptr_eq(&again, &resolved[0]));
    }

    #[test]
    fn test_clone_keeps_resolved_values() {
        let aggs = parse(r#"{"count": {"value": 3}}"#);
        let original = aggs.get::<ValueCount>("count").unwrap().unwrap();
        let copy = aggs.clone();
        let cloned = copy.get::<ValueCount>("count").unwrap().unwrap();
        assert!(Arc::ptr_eq(&original, &cloned));
    }
}
