use log::warn;

use crate::{
    error::Result,
    record::from_body,
    response::{
        admin::{flatten_settings, Reported, Settings},
        FromResponse,
    },
};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterUpdateSettings {
    pub acknowledged: bool,
    pub transient_settings: Settings,
    pub persistent_settings: Settings,
}

impl FromResponse for ClusterUpdateSettings {
    fn from_body(body: &[u8]) -> Result<Self> {
        from_body(body, |record| {
            Ok(ClusterUpdateSettings {
                acknowledged: record.bool("acknowledged").unwrap_or(true),
                transient_settings: flatten_settings(record.record("transient")),
                persistent_settings: flatten_settings(record.record("persistent")),
            })
        })
    }
}

/// The hot threads report is plain text that is not rebuilt.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodesHotThreads {
    pub threads: Reported<String>,
}

impl FromResponse for NodesHotThreads {
    fn from_body(body: &[u8]) -> Result<Self> {
        warn!("hot threads report ignored ({} bytes)", body.len());
        Ok(NodesHotThreads {
            threads: Reported::NotPopulated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_update_settings() {
        let update = ClusterUpdateSettings::from_body(
            br#"{
                "acknowledged": true,
                "persistent": {"discovery": {"zen": {"minimum_master_nodes": 2}}},
                "transient": {"indices.recovery.max_bytes_per_sec": "50mb"}
            }"#,
        )
        .unwrap();
        assert!(update.acknowledged);
        assert_eq!(update.persistent_settings["discovery.zen.minimum_master_nodes"], "2");
        assert_eq!(update.transient_settings["indices.recovery.max_bytes_per_sec"], "50mb");

        let update = ClusterUpdateSettings::from_body(br#"{"acknowledged": false}"#).unwrap();
        assert!(!update.acknowledged);
        assert!(update.transient_settings.is_empty());
    }

    #[test]
    fn test_hot_threads_not_populated() {
        let hot = NodesHotThreads::from_body(b"::: [node-1][abc][inet[/127.0.0.1:9300]]\n").unwrap();
        assert!(!hot.threads.is_populated());
    }
}
