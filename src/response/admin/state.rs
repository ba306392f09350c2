use serde_json::Value;

use crate::{
    error::{Error, Result},
    record::{from_body, scalar_to_string, Record},
    response::{
        admin::{flatten_settings, json_entries, Settings},
        FromResponse,
    },
};

use std::{collections::BTreeMap, str::FromStr};

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterState {
    pub cluster_name: String,
    pub version: i64,
    pub master_node: Option<String>,
    pub nodes: BTreeMap<String, DiscoveryNode>,
    pub blocks: ClusterBlocks,
    pub routing_table: BTreeMap<String, BTreeMap<u32, Vec<ShardRouting>>>,
    pub metadata: Metadata,
}

impl FromResponse for ClusterState {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            let mut nodes = BTreeMap::new();
            for (id, node) in record.record("nodes").iter().flat_map(Record::entries) {
                nodes.insert(id.to_owned(), DiscoveryNode::from_record(id, node)?);
            }

            let mut routing_table = BTreeMap::new();
            let routed = record
                .record("routing_table")
                .and_then(|table| table.record("indices"));
            for (index, table) in routed.iter().flat_map(Record::entries) {
                routing_table.insert(index.to_owned(), index_routing(table)?);
            }

            Ok(ClusterState {
                cluster_name: record.require_str("cluster_name")?.to_owned(),
                version: record.i64("version").unwrap_or(-1),
                master_node: record.string("master_node"),
                nodes,
                blocks: ClusterBlocks::from_record(record.record("blocks"))?,
                routing_table,
                metadata: Metadata::from_record(record.record("metadata")),
            })
        })
    }
}

/// Where a node listens for transport traffic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportAddress {
    Inet { host: String, port: u16 },
    Local(String),
}

impl FromStr for TransportAddress {
    type Err = Error;

    /// Accepts `inet[/10.0.0.1:9300]`, `inet[name/10.0.0.1:9300]`,
    /// `10.0.0.1:9300`, `[::1]:9300`, `local[1]` and `local1`.
    fn from_str(address: &str) -> Result<Self> {
        let invalid = || Error::invalid("transport_address", format!("unknown transport `{}`", address));

        if let Some(id) = address.strip_prefix("local[") {
            let id = id.strip_suffix(']').ok_or_else(invalid)?;
            return Ok(TransportAddress::Local(id.to_owned()));
        }
        // `local1` but not `localhost:9300`
        if let Some(id) = address.strip_prefix("local") {
            if !id.is_empty() && id.bytes().all(|byte| byte.is_ascii_digit()) {
                return Ok(TransportAddress::Local(id.to_owned()));
            }
        }

        let inner = match address.strip_prefix("inet[") {
            Some(inner) => inner.strip_suffix(']').ok_or_else(invalid)?,
            None => address,
        };
        let socket = inner.rsplit('/').next().unwrap_or(inner);
        let split = socket.rfind(':').ok_or_else(invalid)?;
        let (host, port) = (&socket[..split], &socket[split + 1..]);
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(TransportAddress::Inet {
            host: host.to_owned(),
            port: port.parse().map_err(|_| invalid())?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveryNode {
    pub id: String,
    pub name: Option<String>,
    pub transport_address: TransportAddress,
    pub attributes: BTreeMap<String, String>,
}

impl DiscoveryNode {
    fn from_record(id: &str, record: Record<'_>) -> Result<Self> {
        let attributes = record
            .record("attributes")
            .map(|attributes| {
                attributes
                    .map()
                    .iter()
                    .map(|(key, value)| (key.clone(), scalar_to_string(value)))
                    .collect()
            })
            .unwrap_or_default();
        Ok(DiscoveryNode {
            id: id.to_owned(),
            name: record.string("name"),
            transport_address: record.require_str("transport_address")?.parse()?,
            attributes,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlockLevel {
    Read,
    Write,
    MetadataRead,
    MetadataWrite,
}

impl FromStr for BlockLevel {
    type Err = Error;

    fn from_str(level: &str) -> Result<Self> {
        match level.to_ascii_lowercase().as_str() {
            "read" => Ok(BlockLevel::Read),
            "write" => Ok(BlockLevel::Write),
            "metadata_read" => Ok(BlockLevel::MetadataRead),
            "metadata_write" => Ok(BlockLevel::MetadataWrite),
            _ => Err(Error::invalid("levels", format!("unknown block level `{}`", level))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterBlock {
    pub id: u32,
    pub description: Option<String>,
    pub retryable: bool,
    pub disable_state_persistence: bool,
    pub levels: Vec<BlockLevel>,
}

impl ClusterBlock {
    fn from_record(id: &str, record: Record<'_>) -> Result<Self> {
        let levels = record
            .strings("levels")
            .unwrap_or_default()
            .iter()
            .map(|level| level.parse::<BlockLevel>())
            .collect::<Result<Vec<_>>>()?;
        Ok(ClusterBlock {
            id: id
                .parse()
                .map_err(|_| Error::invalid("blocks", format!("`{}` is not a block id", id)))?,
            description: record.string("description"),
            retryable: record.bool("retryable").unwrap_or(false),
            disable_state_persistence: record.bool("disable_state_persistence").unwrap_or(false),
            levels,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterBlocks {
    pub global: Vec<ClusterBlock>,
    pub indices: BTreeMap<String, Vec<ClusterBlock>>,
}

impl ClusterBlocks {
    // {"global": {"1": {...}}, "indices": {"logs": {"4": {...}}}}
    fn from_record(record: Option<Record<'_>>) -> Result<Self> {
        let mut blocks = ClusterBlocks::default();
        let record = match record {
            Some(record) => record,
            None => return Ok(blocks),
        };

        for (id, block) in record.record("global").iter().flat_map(Record::entries) {
            blocks.global.push(ClusterBlock::from_record(id, block)?);
        }
        for (index, index_blocks) in record.record("indices").iter().flat_map(Record::entries) {
            let parsed = index_blocks
                .entries()
                .map(|(id, block)| ClusterBlock::from_record(id, block))
                .collect::<Result<Vec<_>>>()?;
            blocks.indices.insert(index.to_owned(), parsed);
        }
        Ok(blocks)
    }

    pub fn has_global_block(&self, level: BlockLevel) -> bool {
        self.global.iter().any(|block| block.levels.contains(&level))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardRoutingState {
    Unassigned,
    Initializing,
    Started,
    Relocating,
}

impl FromStr for ShardRoutingState {
    type Err = Error;

    fn from_str(state: &str) -> Result<Self> {
        match state {
            "UNASSIGNED" => Ok(ShardRoutingState::Unassigned),
            "INITIALIZING" => Ok(ShardRoutingState::Initializing),
            "STARTED" => Ok(ShardRoutingState::Started),
            "RELOCATING" => Ok(ShardRoutingState::Relocating),
            _ => Err(Error::invalid("state", format!("unknown shard state `{}`", state))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShardRouting {
    pub index: String,
    pub shard: u32,
    pub node: Option<String>,
    pub relocating_node: Option<String>,
    pub primary: bool,
    pub state: ShardRoutingState,
}

// {"shards": {"0": [{"state": "STARTED", "primary": true, "node": "n1", ...}]}}
fn index_routing(table: Record<'_>) -> Result<BTreeMap<u32, Vec<ShardRouting>>> {
    let mut shards = BTreeMap::new();
    let listed = match table.record("shards") {
        Some(listed) => listed,
        None => return Ok(shards),
    };
    for (id, copies) in listed.map() {
        let id: u32 = id
            .parse()
            .map_err(|_| Error::invalid("shards", format!("`{}` is not a shard id", id)))?;
        let copies = copies
            .as_array()
            .map(|copies| copies.iter().filter_map(Record::new).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .map(|copy| -> Result<ShardRouting> {
                Ok(ShardRouting {
                    index: copy.require_str("index")?.to_owned(),
                    shard: copy.u32("shard").unwrap_or(id),
                    node: copy.string("node"),
                    relocating_node: copy.string("relocating_node"),
                    primary: copy.require_bool("primary")?,
                    state: copy.require_str("state")?.parse()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        shards.insert(id, copies);
    }
    Ok(shards)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexMetadata {
    pub state: Option<String>,
    pub settings: Settings,
    pub mappings: BTreeMap<String, Value>,
    pub aliases: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    pub cluster_uuid: Option<String>,
    pub persistent_settings: Settings,
    pub indices: BTreeMap<String, IndexMetadata>,
}

impl Metadata {
    fn from_record(record: Option<Record<'_>>) -> Self {
        let record = match record {
            Some(record) => record,
            None => return Metadata::default(),
        };
        let indices = record
            .record("indices")
            .iter()
            .flat_map(Record::entries)
            .map(|(name, index)| {
                let metadata = IndexMetadata {
                    state: index.string("state"),
                    settings: flatten_settings(index.record("settings")),
                    mappings: json_entries(index.record("mappings")),
                    aliases: index.strings("aliases").unwrap_or_default(),
                };
                (name.to_owned(), metadata)
            })
            .collect();
        Metadata {
            cluster_uuid: record.string("cluster_uuid"),
            persistent_settings: flatten_settings(record.record("persistent")),
            indices,
        }
    }
}
