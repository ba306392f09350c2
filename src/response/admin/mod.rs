//! Cluster and index administration responses, rebuilt from the decoded json
//! tree with the [`Record`] accessors.

mod health;
mod indices;
mod nodes;
mod state;
mod stats;

pub use health::{ClusterHealth, IndexHealth, ShardHealth};
pub use indices::{AliasMetadata, GetAliases, GetIndexTemplates, GetMappings, GetSettings, IndexTemplate};
pub use nodes::{ClusterUpdateSettings, NodesHotThreads};
pub use state::{
    BlockLevel, ClusterBlock, ClusterBlocks, ClusterState, DiscoveryNode, IndexMetadata,
    Metadata, ShardRouting, ShardRoutingState, TransportAddress,
};
pub use stats::{
    CacheStats, ClusterStats, DocsStats, FsStats, IndexShardDistribution, IndicesStats,
    JvmMem, JvmStats, JvmVersion, MinMaxAvg, NodeCounts, NodesStats, OsStats, PercolateStats,
    PluginInfo, ProcessStats, SegmentsStats, ShardsStats, StoreStats,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    record::{scalar_to_string, Record},
};

use std::{collections::BTreeMap, fmt, str::FromStr};

/// Flattened `a.b.c` settings.
pub type Settings = BTreeMap<String, String>;

/// A value the server response does not carry enough information to rebuild.
#[derive(Clone, Debug, PartialEq)]
pub enum Reported<T> {
    Value(T),
    NotPopulated,
}

impl<T> Reported<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Reported::Value(value) => Some(value),
            Reported::NotPopulated => None,
        }
    }

    pub fn is_populated(&self) -> bool {
        matches!(self, Reported::Value(_))
    }
}

impl<T> Default for Reported<T> {
    fn default() -> Self {
        Reported::NotPopulated
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

impl FromStr for HealthStatus {
    type Err = Error;

    fn from_str(status: &str) -> Result<Self> {
        match status.to_ascii_lowercase().as_str() {
            "green" => Ok(HealthStatus::Green),
            "yellow" => Ok(HealthStatus::Yellow),
            "red" => Ok(HealthStatus::Red),
            _ => Err(Error::invalid("status", format!("unknown health status `{}`", status))),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let status = match self {
            HealthStatus::Green => "green",
            HealthStatus::Yellow => "yellow",
            HealthStatus::Red => "red",
        };
        f.write_str(status)
    }
}

pub(crate) fn require_status(record: Record<'_>) -> Result<HealthStatus> {
    record.require_str("status")?.parse()
}

/// Nested settings objects become dotted keys, array elements get their index
/// as the last path segment.
pub fn flatten_settings(settings: Option<Record<'_>>) -> Settings {
    let mut flat = Settings::new();
    if let Some(settings) = settings {
        for (key, value) in settings.map() {
            flatten_into(key.clone(), value, &mut flat);
        }
    }
    flat
}

fn flatten_into(prefix: String, value: &Value, flat: &mut Settings) {
    match value {
        Value::Object(children) => {
            for (key, child) in children {
                flatten_into(format!("{}.{}", prefix, key), child, flat);
            }
        }
        Value::Array(items) => {
            for (position, item) in items.iter().enumerate() {
                flatten_into(format!("{}.{}", prefix, position), item, flat);
            }
        }
        Value::Null => {}
        scalar => {
            flat.insert(prefix, scalar_to_string(scalar));
        }
    }
}

/// Object valued entries as owned json, e.g. mappings by type.
pub(crate) fn json_entries(record: Option<Record<'_>>) -> BTreeMap<String, Value> {
    record
        .map(|record| {
            record
                .map()
                .iter()
                .filter(|(_, value)| value.is_object())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default()
}
