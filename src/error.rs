use elasticsearch::Error as ElasticError;
use serde_json::error::Error as SerializeJsonError;
use thiserror::Error as ThisError;

use crate::{exception::StructuredError, response::aggs::AggregationKind, token::Token};

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("Elastic Error: `{0:?}`")]
    ElasticError(#[from] ElasticError),
    #[error("Serialize Json Error: `{0:?}`")]
    SerializeJsonError(#[from] SerializeJsonError),
    #[error("Malformed Json at byte {offset}: {reason}")]
    MalformedJson { offset: usize, reason: String },
    #[error("Unexpected Token at byte {offset}: expected {expected}, found `{found:?}`")]
    UnexpectedToken {
        offset: usize,
        expected: &'static str,
        found: Option<Token>,
    },
    #[error("Missing Field: `{0}`")]
    MissingField(String),
    #[error("Invalid Field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("Remote Error: {0}")]
    Remote(#[from] StructuredError),
    #[error("Malformed {kind} message: `{message}`")]
    MalformedErrorFormat { kind: &'static str, message: String },
    #[error("Aggregation `{name}` was resolved as {found:?}, requested as {expected:?}")]
    AggregationKindMismatch {
        name: String,
        expected: AggregationKind,
        found: AggregationKind,
    },
}

impl Error {
    pub(crate) fn missing(field: &str) -> Self {
        Error::MissingField(field.to_owned())
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Error::InvalidField {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
