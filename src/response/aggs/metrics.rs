use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::Result,
    response::{
        aggs::{parse_body, ParseAggregation},
        hit::Hits,
    },
    token::{Token, TokenStream},
};

/// `value` plus its formatted form; `None` when no document had the field.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SingleValue {
    pub value: Option<f64>,
    pub value_as_string: Option<String>,
}

impl SingleValue {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut single = SingleValue::default();
        parse_body(stream, |name, _, stream| {
            match name {
                "value" => single.value = stream.optional_double()?,
                "value_as_string" => single.value_as_string = stream.optional_text()?,
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(single)
    }
}

shared_shape!(SingleValue: Min, Max, Avg, Sum);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CountValue {
    pub value: i64,
}

impl CountValue {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut count = CountValue::default();
        parse_body(stream, |name, _, stream| {
            if name != "value" {
                return Ok(false);
            }
            count.value = stream.optional_long()?.unwrap_or(0);
            Ok(true)
        })?;
        Ok(count)
    }
}

shared_shape!(CountValue: ValueCount, Cardinality);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stats {
    pub count: i64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub sum: Option<f64>,
    pub min_as_string: Option<String>,
    pub max_as_string: Option<String>,
    pub avg_as_string: Option<String>,
    pub sum_as_string: Option<String>,
}

impl Stats {
    fn field(&mut self, name: &str, stream: &mut TokenStream<'_>) -> Result<bool> {
        match name {
            "count" => self.count = stream.optional_long()?.unwrap_or(0),
            "min" => self.min = stream.optional_double()?,
            "max" => self.max = stream.optional_double()?,
            "avg" => self.avg = stream.optional_double()?,
            "sum" => self.sum = stream.optional_double()?,
            "min_as_string" => self.min_as_string = stream.optional_text()?,
            "max_as_string" => self.max_as_string = stream.optional_text()?,
            "avg_as_string" => self.avg_as_string = stream.optional_text()?,
            "sum_as_string" => self.sum_as_string = stream.optional_text()?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl ParseAggregation for Stats {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut stats = Stats::default();
        parse_body(stream, |name, _, stream| stats.field(name, stream))?;
        Ok(stats)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub upper: Option<f64>,
    pub lower: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtendedStats {
    pub stats: Stats,
    pub sum_of_squares: Option<f64>,
    pub variance: Option<f64>,
    pub std_deviation: Option<f64>,
    pub std_deviation_bounds: Option<Bounds>,
}

impl ParseAggregation for ExtendedStats {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut extended = ExtendedStats::default();
        parse_body(stream, |name, token, stream| {
            match name {
                "sum_of_squares" => extended.sum_of_squares = stream.optional_double()?,
                "variance" => extended.variance = stream.optional_double()?,
                "std_deviation" => extended.std_deviation = stream.optional_double()?,
                "std_deviation_bounds" if token == Token::StartObject => {
                    extended.std_deviation_bounds = Some(stream.deserialize()?)
                }
                _ => return extended.stats.field(name, stream),
            }
            Ok(true)
        })?;
        Ok(extended)
    }
}

impl std::ops::Deref for ExtendedStats {
    type Target = Stats;

    fn deref(&self) -> &Stats {
        &self.stats
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Percentile {
    pub percent: f64,
    pub value: Option<f64>,
}

/// Percentiles keyed by percent, in server order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PercentilesValues {
    pub values: Vec<Percentile>,
}

impl PercentilesValues {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut percentiles = PercentilesValues::default();
        parse_body(stream, |name, token, stream| {
            match (name, token) {
                // {"values": {"99.0": 12.0, "99.0_as_string": "12.0"}}
                ("values", Token::StartObject) => {
                    while let Some((key, _)) = stream.next_field()? {
                        match key.parse::<f64>() {
                            Ok(percent) => percentiles.values.push(Percentile {
                                percent,
                                value: stream.optional_double()?,
                            }),
                            Err(_) => stream.skip_children()?,
                        }
                    }
                }
                // {"values": [{"key": 99.0, "value": 12.0}]}
                ("values", Token::StartArray) => loop {
                    match stream.next_required()? {
                        Token::EndArray => break,
                        _ => {
                            let mut percent = None;
                            let mut value = None;
                            parse_body(stream, |name, _, stream| {
                                match name {
                                    "key" => percent = stream.optional_double()?,
                                    "value" => value = stream.optional_double()?,
                                    _ => return Ok(false),
                                }
                                Ok(true)
                            })?;
                            if let Some(percent) = percent {
                                percentiles.values.push(Percentile { percent, value });
                            }
                        }
                    }
                },
                _ => return Ok(false),
            }
            Ok(true)
        })?;
        Ok(percentiles)
    }

    pub fn value_at(&self, percent: f64) -> Option<f64> {
        self.values
            .iter()
            .find(|percentile| (percentile.percent - percent).abs() < f64::EPSILON)
            .and_then(|percentile| percentile.value)
    }
}

shared_shape!(PercentilesValues: Percentiles, PercentileRanks);

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Bounding box of all points; both corners are absent for an empty bucket.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeoBounds {
    pub top_left: Option<GeoPoint>,
    pub bottom_right: Option<GeoPoint>,
}

impl ParseAggregation for GeoBounds {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut bounds = GeoBounds::default();
        parse_body(stream, |name, token, stream| {
            if name != "bounds" || token != Token::StartObject {
                return Ok(false);
            }
            parse_body(stream, |corner, token, stream| {
                if token != Token::StartObject {
                    return Ok(false);
                }
                match corner {
                    "top_left" => bounds.top_left = Some(stream.deserialize()?),
                    "bottom_right" => bounds.bottom_right = Some(stream.deserialize()?),
                    _ => return Ok(false),
                }
                Ok(true)
            })?;
            Ok(true)
        })?;
        Ok(bounds)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TopHits {
    pub hits: Hits,
}

impl ParseAggregation for TopHits {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut top = TopHits::default();
        parse_body(stream, |name, token, stream| {
            if name != "hits" || token != Token::StartObject {
                return Ok(false);
            }
            top.hits = Hits::parse(stream)?;
            Ok(true)
        })?;
        Ok(top)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScriptedMetric {
    pub value: Value,
}

impl ParseAggregation for ScriptedMetric {
    fn parse(stream: &mut TokenStream<'_>) -> Result<Self> {
        let mut scripted = ScriptedMetric::default();
        parse_body(stream, |name, _, stream| {
            if name != "value" {
                return Ok(false);
            }
            scripted.value = stream.value()?;
            Ok(true)
        })?;
        Ok(scripted)
    }
}
