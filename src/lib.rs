//! Typed Elasticsearch responses rebuilt from their json wire format.
//!
//! A [`RawResponse`] holds the status and body handed over by the transport.
//! [`RawResponse::parse`] surfaces a remote `error` as a [`StructuredError`] and
//! otherwise rebuilds any [`FromResponse`] type.

pub mod error;
pub mod exception;
pub mod record;
pub mod response;
pub mod token;

pub use error::{Error, Result};
pub use exception::{parse_error, StructuredError};
pub use response::{
    Aggregation, Aggregations, BulkResponse, ClusterHealth, ClusterState, ClusterStats,
    FromResponse, GetResult, Hit, Hits, HitsTotal, ItemError, RawResponse, SearchResponse,
    Shards, TermVectorResponse,
};
