use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::Result,
    record::from_body,
    response::{
        admin::{HealthStatus, Reported},
        FromResponse,
    },
};

#[derive(Clone, Debug, PartialEq)]
pub struct ClusterStats {
    pub timestamp: i64,
    pub cluster_name: String,
    pub status: Option<HealthStatus>,
    pub nodes: NodesStats,
    pub indices: IndicesStats,
}

impl FromResponse for ClusterStats {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            Ok(ClusterStats {
                timestamp: record.i64("timestamp").unwrap_or(0),
                cluster_name: record.require_str("cluster_name")?.to_owned(),
                status: record.str("status").map(str::parse::<HealthStatus>).transpose()?,
                nodes: record.deserialize("nodes")?.unwrap_or_default(),
                indices: record.deserialize("indices")?.unwrap_or_default(),
            })
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MinMaxAvg {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NodesStats {
    pub count: NodeCounts,
    pub versions: Vec<String>,
    pub os: OsStats,
    pub process: ProcessStats,
    pub jvm: JvmStats,
    pub fs: FsStats,
    pub plugins: Vec<PluginInfo>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NodeCounts {
    pub total: u32,
    pub master_only: u32,
    pub data_only: u32,
    pub master_data: u32,
    pub client: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OsStats {
    pub available_processors: u32,
    #[serde(rename = "mem", deserialize_with = "total_in_bytes")]
    pub mem_total_in_bytes: u64,
    /// Per cpu model breakdown.
    #[serde(skip)]
    pub cpu: Reported<Vec<Value>>,
}

fn total_in_bytes<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Mem {
        #[serde(default)]
        total_in_bytes: u64,
    }
    Ok(Mem::deserialize(deserializer)?.total_in_bytes)
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProcessStats {
    #[serde(rename = "cpu", deserialize_with = "cpu_percent")]
    pub cpu_percent: u32,
    pub open_file_descriptors: Option<MinMaxAvg>,
    /// Only min, max and avg are reported per node.
    #[serde(skip)]
    pub open_file_descriptors_total: Reported<u64>,
}

fn cpu_percent<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Cpu {
        #[serde(default)]
        percent: u32,
    }
    Ok(Cpu::deserialize(deserializer)?.percent)
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct JvmStats {
    pub versions: Vec<JvmVersion>,
    pub threads: u64,
    pub max_uptime_in_millis: u64,
    pub mem: JvmMem,
}

impl JvmStats {
    pub fn heap_used_in_bytes(&self) -> u64 {
        self.mem.heap_used_in_bytes
    }

    pub fn heap_max_in_bytes(&self) -> u64 {
        self.mem.heap_max_in_bytes
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct JvmMem {
    pub heap_used_in_bytes: u64,
    pub heap_max_in_bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct JvmVersion {
    pub version: String,
    pub vm_name: String,
    pub vm_version: String,
    pub vm_vendor: String,
    pub count: u32,
}

/// Every size is absent when no data node reports a filesystem.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FsStats {
    pub total_in_bytes: Option<u64>,
    pub free_in_bytes: Option<u64>,
    pub available_in_bytes: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PluginInfo {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub jvm: bool,
    pub site: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IndicesStats {
    pub count: u32,
    pub shards: ShardsStats,
    pub docs: DocsStats,
    pub store: StoreStats,
    pub fielddata: CacheStats,
    pub filter_cache: CacheStats,
    pub id_cache: CacheStats,
    pub completion: StoreStats,
    pub segments: SegmentsStats,
    pub percolate: PercolateStats,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShardsStats {
    pub total: u32,
    pub primaries: u32,
    pub replication: f64,
    pub index: Option<IndexShardDistribution>,
    /// Only the per index average is reported.
    #[serde(skip)]
    pub replication_total: Reported<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IndexShardDistribution {
    pub shards: MinMaxAvg,
    pub primaries: MinMaxAvg,
    pub replication: MinMaxAvg,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DocsStats {
    pub count: u64,
    pub deleted: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreStats {
    pub size_in_bytes: u64,
    pub throttle_time_in_millis: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheStats {
    pub memory_size_in_bytes: u64,
    pub evictions: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SegmentsStats {
    pub count: u64,
    pub memory_in_bytes: u64,
    pub index_writer_memory_in_bytes: u64,
    pub version_map_memory_in_bytes: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PercolateStats {
    pub total: u64,
    pub time_in_millis: u64,
    pub current: u64,
    pub queries: u64,
    /// The server reports -1 while its memory estimator is disabled.
    #[serde(skip)]
    pub memory_size_in_bytes: Reported<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATS: &str = r#"{
        "timestamp": 1409848496406,
        "cluster_name": "elasticsearch",
        "status": "green",
        "indices": {
            "count": 2,
            "shards": {
                "total": 11,
                "primaries": 11,
                "replication": 0.0,
                "index": {
                    "shards": {"min": 5, "max": 6, "avg": 5.5},
                    "primaries": {"min": 5, "max": 6, "avg": 5.5},
                    "replication": {"min": 0.0, "max": 0.0, "avg": 0.0}
                }
            },
            "docs": {"count": 14, "deleted": 11},
            "store": {"size_in_bytes": 28768, "throttle_time_in_millis": 0},
            "fielddata": {"memory_size_in_bytes": 86269, "evictions": 0},
            "filter_cache": {"memory_size_in_bytes": 0, "evictions": 0},
            "id_cache": {"memory_size_in_bytes": 0},
            "completion": {"size_in_bytes": 0},
            "segments": {"count": 11, "memory_in_bytes": 66152, "index_writer_memory_in_bytes": 0, "version_map_memory_in_bytes": 0},
            "percolate": {"total": 0, "time_in_millis": 0, "current": 0, "memory_size_in_bytes": -1, "memory_size": "-1b", "queries": 0}
        },
        "nodes": {
            "count": {"total": 1, "master_only": 0, "data_only": 0, "master_data": 1, "client": 0},
            "versions": ["1.3.2"],
            "os": {"available_processors": 8, "mem": {"total_in_bytes": 0}, "cpu": []},
            "process": {"cpu": {"percent": 3}, "open_file_descriptors": {"min": 380, "max": 380, "avg": 380}},
            "jvm": {
                "max_uptime_in_millis": 6833,
                "versions": [{"version": "1.7.0_55", "vm_name": "OpenJDK 64-Bit Server VM", "vm_version": "24.51-b03", "vm_vendor": "Oracle Corporation", "count": 1}],
                "mem": {"heap_used_in_bytes": 119600200, "heap_max_in_bytes": 1908932608},
                "threads": 107
            },
            "fs": {"total_in_bytes": 2147483648, "free_in_bytes": 2146779136, "available_in_bytes": 2146779136},
            "plugins": []
        }
    }"#;

    #[test]
    fn test_parse_cluster_stats() {
        let stats = ClusterStats::from_body(STATS.as_bytes()).unwrap();
        assert_eq!(stats.timestamp, 1_409_848_496_406);
        assert_eq!(stats.status, Some(HealthStatus::Green));

        let nodes = &stats.nodes;
        assert_eq!(nodes.count.master_data, 1);
        assert_eq!(nodes.versions, vec!["1.3.2".to_owned()]);
        assert_eq!(nodes.os.available_processors, 8);
        assert_eq!(nodes.os.cpu, Reported::NotPopulated);
        assert_eq!(nodes.process.cpu_percent, 3);
        assert_eq!(nodes.process.open_file_descriptors.unwrap().max, 380.0);
        assert!(!nodes.process.open_file_descriptors_total.is_populated());
        assert_eq!(nodes.jvm.threads, 107);
        assert_eq!(nodes.jvm.heap_max_in_bytes(), 1_908_932_608);
        assert_eq!(nodes.jvm.versions[0].vm_vendor, "Oracle Corporation");
        assert_eq!(nodes.fs.total_in_bytes, Some(2_147_483_648));

        let indices = &stats.indices;
        assert_eq!(indices.count, 2);
        assert_eq!(indices.shards.total, 11);
        assert_eq!(indices.shards.index.unwrap().shards.avg, 5.5);
        assert_eq!(indices.shards.replication_total, Reported::NotPopulated);
        assert_eq!(indices.docs.deleted, 11);
        assert_eq!(indices.fielddata.memory_size_in_bytes, 86269);
        assert_eq!(indices.segments.memory_in_bytes, 66152);
        assert_eq!(indices.percolate.memory_size_in_bytes, Reported::NotPopulated);
    }

    #[test]
    fn test_sparse_cluster_stats() {
        let stats = ClusterStats::from_body(
            br#"{"cluster_name": "c", "nodes": {"count": {"total": 2}, "fs": {}}, "indices": {"count": 0}}"#,
        )
        .unwrap();
        assert!(stats.status.is_none());
        assert_eq!(stats.nodes.count.total, 2);
        assert!(stats.nodes.fs.total_in_bytes.is_none());
        assert!(stats.nodes.process.open_file_descriptors.is_none());
        assert!(stats.indices.shards.index.is_none());
    }
}
