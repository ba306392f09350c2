//! Rebuilds typed failures from the free text `error` field of a response.
//!
//! The server renders its exceptions as `ClassName[...]` with positional
//! fields between brackets. Each known class has one [`Signature`] whose
//! extraction rule is expressed as bracket ordinals (`Slot(open, close)` is the
//! text between the `open`-th `[` and the `close`-th `]`, both counted from 1).
//! A known class whose text does not fit its rule is a hard failure.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::{
    error::{Error, Result},
    record::Record,
};

const TRANSPORT_WRAPPER: &str = "RemoteTransportException";
const NESTED: &str = "nested: ";
const NESTED_CAUSE: &str = "; nested: ";

#[derive(ThisError, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StructuredError {
    #[error("Validation Failed: {}", .failures.join("; "))]
    Validation { failures: Vec<String> },
    #[error("[{index}][{shard}] [{ty}][{id}]: version conflict, current [{current_version}], provided [{provided_version}]")]
    VersionConflict {
        index: String,
        shard: i32,
        ty: String,
        id: String,
        current_version: i64,
        provided_version: i64,
    },
    #[error("[{index}] [{ty}][{id}]: document missing")]
    DocumentMissing {
        index: String,
        shard: Option<i32>,
        ty: String,
        id: String,
    },
    #[error("[{index}][{shard}] [{ty}][{id}]: document already exists")]
    DocumentAlreadyExists {
        index: String,
        shard: i32,
        ty: String,
        id: String,
    },
    #[error("[{index}] missing")]
    IndexMissing { index: String },
    #[error("[{index}] already exists")]
    IndexAlreadyExists { index: String },
    #[error("[{index}] closed")]
    IndexClosed { index: String },
    #[error("[{index}] {reason}")]
    InvalidIndexName { index: String, reason: String },
    #[error("routing is required for [{index}]/[{ty}]/[{id}]")]
    RoutingMissing {
        index: String,
        ty: String,
        id: String,
    },
    #[error("[{index}][{shard}] {message}")]
    UnavailableShards {
        index: String,
        shard: i32,
        message: String,
    },
    #[error("blocked by: {blocks:?}")]
    ClusterBlock { blocks: Vec<BlockedBy> },
    #[error("parse failure: {message}")]
    Parse { message: String },
    #[error("illegal argument: {message}")]
    IllegalArgument { message: String },
    #[error("aliases {aliases:?} missing")]
    AliasesMissing { aliases: Vec<String> },
    #[error("Failed to execute phase [{phase}], {message}")]
    SearchPhaseExecution {
        phase: String,
        message: String,
        failures: Vec<ShardSearchFailure>,
    },
    #[error("mapper parsing: {message}")]
    MapperParsing {
        message: String,
        cause: Option<Box<StructuredError>>,
    },
    #[error("{message}; nested: {cause}")]
    ReduceSearchPhase {
        phase: String,
        message: String,
        cause: Box<StructuredError>,
    },
    #[error("illegal state: {message}")]
    IllegalState { message: String },
    #[error("{message} at [Source: {source_ref}; line: {line}, column: {column}]")]
    JsonParse {
        message: String,
        source_ref: String,
        line: u32,
        column: u32,
    },
    #[error("expression compilation: {message}")]
    ExpressionScriptCompilation { message: String },
    #[error("{message}")]
    Elasticsearch { message: String },
    #[error("{message}")]
    Generic { message: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockedBy {
    pub status: String,
    pub id: u32,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShardSearchFailure {
    pub node_id: String,
    pub index: String,
    pub shard: i32,
    pub reason: String,
}

/// Un-parses an error string into its typed form.
///
/// Unknown classes come back as [`StructuredError::Generic`] carrying `raw`
/// verbatim; a known class with a broken field layout is
/// [`Error::MalformedErrorFormat`].
pub fn parse_error(raw: &str) -> Result<StructuredError> {
    debug!("received error {}", raw);
    let message = unwrap_transport(raw);
    let class = leading_class(message);

    let signature = match SIGNATURES.iter().find(|signature| signature.class == class) {
        Some(signature) => signature,
        None => {
            return Ok(StructuredError::Generic {
                message: raw.to_owned(),
            })
        }
    };

    let built = match signature.build {
        Build::Plain(build) => build(message),
        Build::Wrapping(build) => match message.split_once(NESTED_CAUSE) {
            Some((head, nested)) => {
                let cause = parse_error(nested.trim_end_matches(|c| c == ';' || c == ' '))?;
                build(head, Some(cause))
            }
            None => build(message, None),
        },
    };
    built.ok_or_else(|| Error::MalformedErrorFormat {
        kind: signature.class,
        message: message.to_owned(),
    })
}

/// Newer servers send `{"type": ..., "reason": ...}` instead of a string.
pub fn from_error_object(error: Record<'_>) -> StructuredError {
    let message = match (error.str("type"), error.str("reason")) {
        (Some(ty), Some(reason)) => format!("{}: {}", ty, reason),
        (Some(ty), None) => ty.to_owned(),
        (None, Some(reason)) => reason.to_owned(),
        (None, None) => Record::map(&error)
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(", "),
    };
    StructuredError::Generic { message }
}

struct Signature {
    class: &'static str,
    build: Build,
}

enum Build {
    Plain(fn(&str) -> Option<StructuredError>),
    /// Gets the text before `; nested: ` and the rebuilt cause after it.
    Wrapping(fn(&str, Option<StructuredError>) -> Option<StructuredError>),
}

#[derive(Clone, Copy)]
struct Slot(usize, usize);

const SHARD_DOC: [Slot; 4] = [Slot(2, 1), Slot(3, 2), Slot(4, 3), Slot(5, 4)];

const SIGNATURES: &[Signature] = &[
    Signature {
        class: "ActionRequestValidationException",
        build: Build::Plain(validation),
    },
    Signature {
        class: "VersionConflictEngineException",
        build: Build::Plain(version_conflict),
    },
    Signature {
        class: "DocumentMissingException",
        build: Build::Plain(document_missing),
    },
    Signature {
        class: "DocumentAlreadyExistsException",
        build: Build::Plain(document_already_exists),
    },
    Signature {
        class: "IndexMissingException",
        build: Build::Plain(index_missing),
    },
    Signature {
        class: "IndexAlreadyExistsException",
        build: Build::Plain(index_already_exists),
    },
    Signature {
        class: "IndexClosedException",
        build: Build::Plain(index_closed),
    },
    Signature {
        class: "InvalidIndexNameException",
        build: Build::Plain(invalid_index_name),
    },
    Signature {
        class: "RoutingMissingException",
        build: Build::Plain(routing_missing),
    },
    Signature {
        class: "UnavailableShardsException",
        build: Build::Plain(unavailable_shards),
    },
    Signature {
        class: "ClusterBlockException",
        build: Build::Plain(cluster_block),
    },
    Signature {
        class: "ElasticsearchParseException",
        build: Build::Plain(parse_failure),
    },
    Signature {
        class: "ElasticsearchIllegalArgumentException",
        build: Build::Plain(illegal_argument),
    },
    Signature {
        class: "ElasticsearchIllegalStateException",
        build: Build::Plain(illegal_state),
    },
    Signature {
        class: "ElasticsearchException",
        build: Build::Plain(elasticsearch),
    },
    Signature {
        class: "AliasesMissingException",
        build: Build::Plain(aliases_missing),
    },
    Signature {
        class: "SearchPhaseExecutionException",
        build: Build::Plain(search_phase_execution),
    },
    Signature {
        class: "JsonParseException",
        build: Build::Plain(json_parse),
    },
    Signature {
        class: "ExpressionScriptCompilationException",
        build: Build::Plain(expression_compilation),
    },
    Signature {
        class: "MapperParsingException",
        build: Build::Wrapping(mapper_parsing),
    },
    Signature {
        class: "ReduceSearchPhaseException",
        build: Build::Wrapping(reduce_search_phase),
    },
];

fn unwrap_transport(raw: &str) -> &str {
    if raw.starts_with(TRANSPORT_WRAPPER) {
        if let Some(start) = raw.find(NESTED) {
            return raw[start + NESTED.len()..].trim_end_matches(|c| c == ';' || c == ' ');
        }
    }
    raw
}

fn leading_class(message: &str) -> &str {
    message
        .split(|c| c == '[' || c == ';' || c == ' ')
        .next()
        .unwrap_or(message)
}

/// Byte index of the `n`-th occurrence of `needle`, counted from 1.
fn nth_index_of(haystack: &str, needle: char, n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    haystack
        .match_indices(needle)
        .nth(n - 1)
        .map(|(index, _)| index)
}

fn slot(message: &str, Slot(open, close): Slot) -> Option<&str> {
    let start = nth_index_of(message, '[', open)? + 1;
    let end = nth_index_of(message, ']', close)?;
    message.get(start..end)
}

fn slots<'m>(message: &'m str, rule: &[Slot]) -> Option<Vec<&'m str>> {
    rule.iter().map(|s| slot(message, *s)).collect()
}

/// Everything between the first `[` and the last `]`.
fn bracket_body(message: &str) -> Option<&str> {
    let start = message.find('[')? + 1;
    let end = message.rfind(']')?;
    message.get(start..end)
}

fn index_only(message: &str) -> Option<String> {
    slot(message, Slot(2, 1)).map(str::to_owned)
}

fn index_missing(message: &str) -> Option<StructuredError> {
    index_only(message).map(|index| StructuredError::IndexMissing { index })
}

fn index_already_exists(message: &str) -> Option<StructuredError> {
    index_only(message).map(|index| StructuredError::IndexAlreadyExists { index })
}

fn index_closed(message: &str) -> Option<StructuredError> {
    index_only(message).map(|index| StructuredError::IndexClosed { index })
}

fn parse_failure(message: &str) -> Option<StructuredError> {
    bracket_body(message).map(|message| StructuredError::Parse {
        message: message.to_owned(),
    })
}

fn illegal_argument(message: &str) -> Option<StructuredError> {
    bracket_body(message).map(|message| StructuredError::IllegalArgument {
        message: message.to_owned(),
    })
}

fn illegal_state(message: &str) -> Option<StructuredError> {
    bracket_body(message).map(|message| StructuredError::IllegalState {
        message: message.to_owned(),
    })
}

// ElasticsearchException[Cannot access field token_count from transaction log.]
fn elasticsearch(message: &str) -> Option<StructuredError> {
    bracket_body(message).map(|message| StructuredError::Elasticsearch {
        message: message.to_owned(),
    })
}

// ExpressionScriptCompilationException[Failed to parse expression: doc['x'].value +]
fn expression_compilation(message: &str) -> Option<StructuredError> {
    bracket_body(message).map(|message| StructuredError::ExpressionScriptCompilation {
        message: message.to_owned(),
    })
}

// ActionRequestValidationException[Validation Failed: 1: script or doc is missing;2: ...;]
fn validation(message: &str) -> Option<StructuredError> {
    let body = bracket_body(message)?.strip_prefix("Validation Failed: ")?;
    let failures = body
        .split(';')
        .map(str::trim)
        .filter(|failure| !failure.is_empty())
        .map(|failure| match failure.split_once(": ") {
            Some((ordinal, text)) if ordinal.chars().all(|c| c.is_ascii_digit()) => {
                text.to_owned()
            }
            _ => failure.to_owned(),
        })
        .collect();
    Some(StructuredError::Validation { failures })
}

// VersionConflictEngineException[[test][1] [type][1]: version conflict, current [-1], provided [17]]
fn version_conflict(message: &str) -> Option<StructuredError> {
    let fields = slots(
        message,
        &[
            Slot(2, 1),
            Slot(3, 2),
            Slot(4, 3),
            Slot(5, 4),
            Slot(6, 5),
            Slot(7, 6),
        ],
    )?;
    Some(StructuredError::VersionConflict {
        index: fields[0].to_owned(),
        shard: fields[1].parse().ok()?,
        ty: fields[2].to_owned(),
        id: fields[3].to_owned(),
        current_version: fields[4].parse().ok()?,
        provided_version: fields[5].parse().ok()?,
    })
}

// DocumentMissingException[[test][2] [type][1]: document missing], shard may be `_na`
fn document_missing(message: &str) -> Option<StructuredError> {
    let fields = slots(message, &SHARD_DOC)?;
    let shard = match fields[1] {
        "_na" => None,
        shard => Some(shard.parse().ok()?),
    };
    Some(StructuredError::DocumentMissing {
        index: fields[0].to_owned(),
        shard,
        ty: fields[2].to_owned(),
        id: fields[3].to_owned(),
    })
}

fn document_already_exists(message: &str) -> Option<StructuredError> {
    let fields = slots(message, &SHARD_DOC)?;
    Some(StructuredError::DocumentAlreadyExists {
        index: fields[0].to_owned(),
        shard: fields[1].parse().ok()?,
        ty: fields[2].to_owned(),
        id: fields[3].to_owned(),
    })
}

// InvalidIndexNameException[[_foo] Invalid index name [_foo], must not start with '_']
fn invalid_index_name(message: &str) -> Option<StructuredError> {
    let index = index_only(message)?;
    let start = nth_index_of(message, ']', 1)? + 1;
    let end = message.rfind(']')?;
    let reason = message
        .get(start..end)?
        .trim_start_matches(|c| c == ',' || c == ' ');
    Some(StructuredError::InvalidIndexName {
        index,
        reason: reason.to_owned(),
    })
}

// RoutingMissingException[routing is required for [test]/[type1]/[1]]
fn routing_missing(message: &str) -> Option<StructuredError> {
    let fields = slots(message, &[Slot(2, 1), Slot(3, 2), Slot(4, 3)])?;
    Some(StructuredError::RoutingMissing {
        index: fields[0].to_owned(),
        ty: fields[1].to_owned(),
        id: fields[2].to_owned(),
    })
}

// UnavailableShardsException[[test][2] [2] shardIt, [0] active : Timeout waiting for [1s], request: ...]
fn unavailable_shards(message: &str) -> Option<StructuredError> {
    let fields = slots(message, &[Slot(2, 1), Slot(3, 2)])?;
    let rest = match message.find("Timeout") {
        Some(start) => &message[start..],
        None => message[nth_index_of(message, ']', 2)? + 1..].trim_start(),
    };
    let rest = rest.strip_suffix(']').unwrap_or(rest);
    Some(StructuredError::UnavailableShards {
        index: fields[0].to_owned(),
        shard: fields[1].parse().ok()?,
        message: rest.to_owned(),
    })
}

// ClusterBlockException[blocked by: [FORBIDDEN/8/index write (api)];]
fn cluster_block(message: &str) -> Option<StructuredError> {
    let body = bracket_body(message)?.strip_prefix("blocked by: ")?;
    let blocks = body
        .split(';')
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| {
            let inner = block.strip_prefix('[')?.strip_suffix(']')?;
            let mut parts = inner.splitn(3, '/');
            let status = parts.next()?.to_owned();
            let id = parts.next()?.parse().ok()?;
            let description = parts.next()?.to_owned();
            Some(BlockedBy {
                status,
                id,
                description,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    if blocks.is_empty() {
        return None;
    }
    Some(StructuredError::ClusterBlock { blocks })
}

// AliasesMissingException[aliases [[alias1, alias2]] missing]
fn aliases_missing(message: &str) -> Option<StructuredError> {
    let aliases = slot(message, Slot(3, 1))?
        .split(',')
        .map(str::trim)
        .filter(|alias| !alias.is_empty())
        .map(str::to_owned)
        .collect();
    Some(StructuredError::AliasesMissing { aliases })
}

// SearchPhaseExecutionException[Failed to execute phase [query], all shards failed;
//   shardFailures {[node][index][0]: Cause[...]}{[node][index][1]: Cause[...]; }]
fn search_phase_execution(message: &str) -> Option<StructuredError> {
    let message = message.strip_suffix(']')?;
    let phase = slot(message, Slot(2, 1))?.to_owned();
    let after_phase = &message[nth_index_of(message, ']', 1)? + 1..];
    let after_phase = after_phase.trim_start_matches(|c| c == ',' || c == ' ');
    let end = after_phase.find(';').unwrap_or_else(|| after_phase.len());
    let text = after_phase[..end].to_owned();

    let failures = match message.find("shardFailures ") {
        Some(start) => message[start..]
            .split("{[")
            .skip(1)
            .map(shard_search_failure)
            .collect::<Option<Vec<_>>>()?,
        None => Vec::new(),
    };

    Some(StructuredError::SearchPhaseExecution {
        phase,
        message: text,
        failures,
    })
}

// node][index][5]: Cause[...]; nested: Other[...]; }
fn shard_search_failure(failure: &str) -> Option<ShardSearchFailure> {
    let end_node = nth_index_of(failure, ']', 1)?;
    let index = failure.get(nth_index_of(failure, '[', 1)? + 1..nth_index_of(failure, ']', 2)?)?;
    let shard = failure.get(nth_index_of(failure, '[', 2)? + 1..nth_index_of(failure, ']', 3)?)?;
    let reason = failure.get(nth_index_of(failure, ']', 3)? + 1..)?;
    let reason = reason.trim_start_matches(|c| c == ':' || c == ' ');
    let reason = reason.strip_suffix('}').unwrap_or(reason);
    Some(ShardSearchFailure {
        node_id: failure[..end_node].to_owned(),
        index: index.to_owned(),
        shard: shard.parse().ok()?,
        reason: reason.trim_end_matches(|c| c == ';' || c == ' ').to_owned(),
    })
}

// JsonParseException[Unexpected character ('{' (code 123)): was expecting comma
//  at [Source: [B@737ccd2f; line: 1, column: 19]]
fn json_parse(message: &str) -> Option<StructuredError> {
    const SOURCE: &str = " at [Source: ";
    let body = bracket_body(message)?;
    let location_start = body.rfind(SOURCE)?;
    let location = &body[location_start + SOURCE.len()..];

    let (source_ref, position) = location.split_once("; line: ")?;
    let (line, column) = position.split_once(", column: ")?;
    let column = column.strip_suffix(']').unwrap_or(column);
    Some(StructuredError::JsonParse {
        message: body[..location_start].trim_end().to_owned(),
        source_ref: source_ref.to_owned(),
        line: line.trim().parse().ok()?,
        column: column.trim().parse().ok()?,
    })
}

// MapperParsingException[failed to parse]; nested: ElasticsearchIllegalArgumentException[...];
fn mapper_parsing(head: &str, cause: Option<StructuredError>) -> Option<StructuredError> {
    Some(StructuredError::MapperParsing {
        message: bracket_body(head)?.to_owned(),
        cause: cause.map(Box::new),
    })
}

// ReduceSearchPhaseException[Failed to execute phase [query], [reduce] ];
//   nested: ElasticsearchIllegalStateException[Can't merge suggest result ...];
fn reduce_search_phase(head: &str, cause: Option<StructuredError>) -> Option<StructuredError> {
    Some(StructuredError::ReduceSearchPhase {
        phase: slot(head, Slot(2, 1))?.to_owned(),
        message: bracket_body(head)?.trim_end().to_owned(),
        cause: Box::new(cause?),
    })
}
