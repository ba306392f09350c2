use log::debug;

use crate::{
    error::{Error, Result},
    record::{from_body, Record},
    response::{
        admin::{require_status, HealthStatus, Reported},
        FromResponse,
    },
};

use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterHealth {
    pub cluster_name: String,
    pub status: HealthStatus,
    pub timed_out: bool,
    pub number_of_nodes: u32,
    pub number_of_data_nodes: u32,
    pub active_primary_shards: u32,
    pub active_shards: u32,
    pub relocating_shards: u32,
    pub initializing_shards: u32,
    pub unassigned_shards: u32,
    pub validation_failures: Vec<String>,
    pub indices: BTreeMap<String, IndexHealth>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexHealth {
    pub status: HealthStatus,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    pub active_primary_shards: u32,
    pub active_shards: u32,
    pub relocating_shards: u32,
    pub initializing_shards: u32,
    pub unassigned_shards: u32,
    pub validation_failures: Vec<String>,
    pub shards: BTreeMap<u32, ShardHealth>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShardHealth {
    pub id: u32,
    pub status: HealthStatus,
    pub primary_active: bool,
    pub active_shards: u32,
    pub relocating_shards: u32,
    pub initializing_shards: u32,
    pub unassigned_shards: u32,
    /// Why unassigned copies could not be allocated; not part of the health output.
    pub allocation_failures: Reported<Vec<String>>,
}

impl ClusterHealth {
    /// Rebuilds the health of a request that asked about `requested_indices`.
    ///
    /// A requested index missing from a per index report means it does not
    /// exist, which makes the cluster red for this request.
    pub fn parse_for(body: &[u8], requested_indices: &[&str]) -> Result<Self> {
        from_body(body, |record| Self::from_record(record, requested_indices))
    }

    fn from_record(record: Record<'_>, requested_indices: &[&str]) -> Result<Self> {
        let mut status = require_status(record)?;

        let mut indices = BTreeMap::new();
        if let Some(reported) = record.record("indices") {
            for (name, index) in reported.entries() {
                indices.insert(name.to_owned(), IndexHealth::from_record(index)?);
            }

            let missing = requested_indices
                .iter()
                .filter(|index| !index.contains('*') && **index != "_all")
                .find(|index| !indices.contains_key(**index));
            if let Some(index) = missing {
                debug!("requested index {} absent from health report", index);
                status = HealthStatus::Red;
            }
        }

        Ok(ClusterHealth {
            cluster_name: record.require_str("cluster_name")?.to_owned(),
            status,
            timed_out: record.bool("timed_out").unwrap_or(false),
            number_of_nodes: count(record, "number_of_nodes"),
            number_of_data_nodes: count(record, "number_of_data_nodes"),
            active_primary_shards: count(record, "active_primary_shards"),
            active_shards: count(record, "active_shards"),
            relocating_shards: count(record, "relocating_shards"),
            initializing_shards: count(record, "initializing_shards"),
            unassigned_shards: count(record, "unassigned_shards"),
            validation_failures: record.strings("validation_failures").unwrap_or_default(),
            indices,
        })
    }

    pub fn index(&self, name: &str) -> Option<&IndexHealth> {
        self.indices.get(name)
    }
}

impl FromResponse for ClusterHealth {
    fn from_body(body: &[u8]) -> Result<Self> {
        Self::parse_for(body, &[])
    }
}

impl IndexHealth {
    fn from_record(record: Record<'_>) -> Result<Self> {
        let mut shards = BTreeMap::new();
        if let Some(reported) = record.record("shards") {
            for (id, shard) in reported.entries() {
                let id = id
                    .parse()
                    .map_err(|_| Error::invalid("shards", format!("`{}` is not a shard id", id)))?;
                shards.insert(id, ShardHealth::from_record(id, shard)?);
            }
        }

        Ok(IndexHealth {
            status: require_status(record)?,
            number_of_shards: count(record, "number_of_shards"),
            number_of_replicas: count(record, "number_of_replicas"),
            active_primary_shards: count(record, "active_primary_shards"),
            active_shards: count(record, "active_shards"),
            relocating_shards: count(record, "relocating_shards"),
            initializing_shards: count(record, "initializing_shards"),
            unassigned_shards: count(record, "unassigned_shards"),
            validation_failures: record.strings("validation_failures").unwrap_or_default(),
            shards,
        })
    }
}

impl ShardHealth {
    fn from_record(id: u32, record: Record<'_>) -> Result<Self> {
        Ok(ShardHealth {
            id,
            status: require_status(record)?,
            primary_active: record.bool("primary_active").unwrap_or(false),
            active_shards: count(record, "active_shards"),
            relocating_shards: count(record, "relocating_shards"),
            initializing_shards: count(record, "initializing_shards"),
            unassigned_shards: count(record, "unassigned_shards"),
            allocation_failures: Reported::NotPopulated,
        })
    }
}

fn count(record: Record<'_>, key: &str) -> u32 {
    record.u32(key).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEALTH: &str = r#"{
        "cluster_name": "elasticsearch",
        "status": "yellow",
        "timed_out": false,
        "number_of_nodes": 1,
        "number_of_data_nodes": 1,
        "active_primary_shards": 5,
        "active_shards": 5,
        "relocating_shards": 0,
        "initializing_shards": 0,
        "unassigned_shards": 5,
        "indices": {
            "twitter": {
                "status": "yellow",
                "number_of_shards": 5,
                "number_of_replicas": 1,
                "active_primary_shards": 5,
                "active_shards": 5,
                "relocating_shards": 0,
                "initializing_shards": 0,
                "unassigned_shards": 5,
                "shards": {
                    "0": {"status": "yellow", "primary_active": true, "active_shards": 1, "relocating_shards": 0, "initializing_shards": 0, "unassigned_shards": 1},
                    "1": {"status": "yellow", "primary_active": true, "active_shards": 1, "relocating_shards": 0, "initializing_shards": 0, "unassigned_shards": 1}
                }
            }
        }
    }"#;

    #[test]
    fn test_parse_cluster_health() {
        let health = ClusterHealth::from_body(HEALTH.as_bytes()).unwrap();
        assert_eq!(health.cluster_name, "elasticsearch");
        assert_eq!(health.status, HealthStatus::Yellow);
        assert_eq!(health.unassigned_shards, 5);
        assert!(health.validation_failures.is_empty());

        let twitter = health.index("twitter").unwrap();
        assert_eq!(twitter.number_of_replicas, 1);
        assert_eq!(twitter.shards.len(), 2);
        let shard = &twitter.shards[&1];
        assert_eq!(shard.id, 1);
        assert!(shard.primary_active);
        assert_eq!(shard.allocation_failures, Reported::NotPopulated);
    }

    #[test]
    fn test_missing_requested_index_is_red() {
        let health = ClusterHealth::parse_for(HEALTH.as_bytes(), &["twitter", "facebook"]).unwrap();
        assert_eq!(health.status, HealthStatus::Red);

        let health = ClusterHealth::parse_for(HEALTH.as_bytes(), &["twitter", "tw*"]).unwrap();
        assert_eq!(health.status, HealthStatus::Yellow);
    }

    #[test]
    fn test_cluster_level_health() {
        let health = ClusterHealth::parse_for(
            br#"{"cluster_name": "c", "status": "green", "number_of_nodes": 3}"#,
            &["logs"],
        )
        .unwrap();
        assert_eq!(health.status, HealthStatus::Green);
        assert_eq!(health.number_of_nodes, 3);
        assert_eq!(health.active_shards, 0);
        assert!(health.indices.is_empty());
    }

    #[test]
    fn test_unknown_status_is_fatal() {
        assert!(ClusterHealth::from_body(br#"{"cluster_name": "c", "status": "blue"}"#).is_err());
    }
}
