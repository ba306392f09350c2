use log::trace;
use serde::de::DeserializeOwned;

use crate::{
    error::{Error, Result},
    record::from_body,
    response::{
        aggs::Aggregations,
        close_root,
        common::Shards,
        hit::{Hit, Hits},
        open_root, FromResponse,
    },
    token::Token,
};

use std::convert::TryFrom;

/// A search or scroll page, read in one streaming pass.
#[derive(Clone, Debug, Default)]
pub struct SearchResponse {
    pub took: u64,
    pub timed_out: bool,
    pub terminated_early: Option<bool>,
    pub scroll_id: Option<String>,
    pub shards: Shards,
    pub hits: Hits,
    pub aggregations: Aggregations,
    pub status: Option<u16>,
}

impl SearchResponse {
    pub fn sources<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.hits
            .iter()
            .filter_map(|hit| hit.source_as().transpose())
            .collect()
    }

    pub fn first(&self) -> Option<&Hit> {
        self.hits.hits.first()
    }
}

impl FromResponse for SearchResponse {
    fn from_body(body: &[u8]) -> Result<Self> {
        let mut stream = open_root(body)?;
        let mut response = SearchResponse::default();
        let mut seen_hits = false;

        while let Some((name, token)) = stream.next_field()? {
            match (name.as_str(), token) {
                ("took", _) => {
                    let took = stream.long_value()?;
                    response.took = u64::try_from(took)
                        .map_err(|_| Error::invalid("took", format!("`{}` is negative", took)))?;
                }
                ("timed_out", _) => response.timed_out = stream.bool_value()?,
                ("terminated_early", _) => response.terminated_early = Some(stream.bool_value()?),
                ("_scroll_id", _) => response.scroll_id = stream.optional_text()?,
                ("_shards", Token::StartObject) => response.shards = stream.deserialize()?,
                ("hits", Token::StartObject) => {
                    response.hits = Hits::parse(&mut stream)?;
                    seen_hits = true;
                }
                ("aggregations", Token::StartObject) => {
                    response.aggregations = Aggregations::parse(&mut stream)?
                }
                ("status", Token::Number) => {
                    let status = stream.long_value()?;
                    let status = u16::try_from(status).map_err(|_| {
                        Error::invalid("status", format!("`{}` is not an http status", status))
                    })?;
                    response.status = Some(status);
                }
                _ => {
                    trace!("skipping search response field {}", name);
                    stream.skip_children()?;
                }
            }
        }
        close_root(&mut stream)?;

        if !seen_hits {
            return Err(Error::missing("hits"));
        }
        Ok(response)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CountResponse {
    pub count: u64,
    pub shards: Option<Shards>,
}

impl FromResponse for CountResponse {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            Ok(CountResponse {
                count: record.require_u64("count")?,
                shards: record.deserialize("_shards")?,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::aggs::{Terms, ValueCount};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Tweet {
        user: String,
    }

    #[test]
    fn test_parse_search_response() {
        let body = r#"{
            "took": 5,
            "timed_out": false,
            "_shards": {"total": 5, "successful": 5, "failed": 0},
            "profile": {"shards": []},
            "hits": {
                "total": 2,
                "max_score": 1.3,
                "hits": [
                    {"_index": "twitter", "_type": "tweet", "_id": "2", "_score": 1.3, "_source": {"user": "bob"}},
                    {"_index": "twitter", "_type": "tweet", "_id": "1", "_score": 0.2, "_source": {"user": "kimchy"}}
                ]
            },
            "aggregations": {
                "users": {"buckets": [{"key": "bob", "doc_count": 1, "tweets": {"value": 1}}]}
            }
        }"#;
        let response = SearchResponse::from_body(body.as_bytes()).unwrap();
        assert_eq!(response.took, 5);
        assert!(!response.timed_out);
        assert_eq!(response.shards.total, 5);
        assert_eq!(response.hits.total.value, 2);
        assert_eq!(response.first().unwrap().id, "2");
        assert_eq!(
            response.sources::<Tweet>().unwrap(),
            vec![
                Tweet {
                    user: "bob".to_owned()
                },
                Tweet {
                    user: "kimchy".to_owned()
                }
            ]
        );

        let users = response.aggregations.get::<Terms>("users").unwrap().unwrap();
        let tweets = users.buckets[0]
            .aggregations
            .get::<ValueCount>("tweets")
            .unwrap()
            .unwrap();
        assert_eq!(tweets.value, 1);
    }

    #[test]
    fn test_scroll_page() {
        let body = br#"{"_scroll_id": "c2Nhbjs2OzM0NDg1ODpzRlBLc0FXNlNyNm5JWUc1", "took": 1, "timed_out": false, "terminated_early": true, "hits": {"total": {"value": 0, "relation": "eq"}, "max_score": null, "hits": []}}"#;
        let response = SearchResponse::from_body(body).unwrap();
        assert_eq!(
            response.scroll_id.as_deref(),
            Some("c2Nhbjs2OzM0NDg1ODpzRlBLc0FXNlNyNm5JWUc1")
        );
        assert_eq!(response.terminated_early, Some(true));
        assert!(response.hits.is_empty());
        assert!(response.aggregations.is_empty());
    }

    #[test]
    fn test_missing_hits_and_truncated_body() {
        match SearchResponse::from_body(br#"{"took": 1}"#) {
            Err(Error::MissingField(field)) => assert_eq!(field, "hits"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            SearchResponse::from_body(br#"{"took": 1, "hits": {"hits": ["#),
            Err(Error::MalformedJson { .. })
        ));
    }

    #[test]
    fn test_out_of_range_numbers_are_rejected() {
        let body = |status: &str| {
            format!(
                r#"{{"took": 1, "status": {}, "hits": {{"total": 0, "hits": []}}}}"#,
                status
            )
        };
        assert_eq!(
            SearchResponse::from_body(body("200").as_bytes()).unwrap().status,
            Some(200)
        );
        for &status in &["70000", "-1"] {
            match SearchResponse::from_body(body(status).as_bytes()) {
                Err(Error::InvalidField { field, .. }) => assert_eq!(field, "status"),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(SearchResponse::from_body(br#"{"took": -3, "hits": {"hits": []}}"#).is_err());
    }

    #[test]
    fn test_bad_escapes_in_unread_parts_fail() {
        let skipped = br#"{"profile": "bad\qescape", "hits": {"hits": []}}"#;
        assert!(matches!(
            SearchResponse::from_body(skipped),
            Err(Error::MalformedJson { .. })
        ));

        let captured: &[u8] = b"{\"hits\": {\"hits\": [{\"_index\": \"i\", \"_type\": \"t\", \"_id\": \"1\", \"_source\": {\"a\": \"\xff\"}}]}}";
        assert!(matches!(
            SearchResponse::from_body(captured),
            Err(Error::MalformedJson { .. })
        ));
    }

    #[test]
    fn test_count() {
        let count = CountResponse::from_body(
            br#"{"count": 42, "_shards": {"total": 1, "successful": 1, "failed": 0}}"#,
        )
        .unwrap();
        assert_eq!(count.count, 42);
        assert_eq!(count.shards.unwrap().total, 1);
    }
}
