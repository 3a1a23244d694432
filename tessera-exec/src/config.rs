use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tessera_storage::config::StorageConfig;

pub const DEFAULT_TEMP_TABLE_MEMORY_LIMIT: i64 = 100 * 1024 * 1024;

/// Settings of one engine instance, delivered by the host at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cluster_index: i32,
    pub site_id: i64,
    pub partition_id: i32,
    pub host_id: i32,
    pub hostname: String,
    /// Number of partitions of the cluster, used to check row locality.
    pub partition_count: u32,
    /// Bytes all temp tables of one fragment may hold. Negative disables the limit.
    pub temp_table_memory_limit: i64,
    /// Allocation that triggers one informational log. Negative disables it.
    pub temp_table_log_threshold: i64,
    pub storage: StorageConfig,
}

impl Default for EngineConfig {
    #[inline]
    fn default() -> Self {
        EngineConfig {
            cluster_index: 0,
            site_id: 0,
            partition_id: 0,
            host_id: 0,
            hostname: String::from("localhost"),
            partition_count: 1,
            temp_table_memory_limit: DEFAULT_TEMP_TABLE_MEMORY_LIMIT,
            temp_table_log_threshold: -1,
            storage: StorageConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(s: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(s).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.partition_count == 0 {
            return Err(Error::InvalidConfig("partition_count must be positive".into()));
        }
        if self.partition_id < 0 || self.partition_id as u32 >= self.partition_count {
            return Err(Error::InvalidConfig(format!(
                "partition_id {} out of range of {} partitions",
                self.partition_id, self.partition_count
            )));
        }
        if self.storage.table_block_size == 0 {
            return Err(Error::InvalidConfig("table_block_size must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json() {
        let c = EngineConfig::from_json(
            r#"{"site_id": 5, "partition_id": 2, "partition_count": 4,
                "storage": {"compaction_enabled": false}}"#,
        )
        .unwrap();
        assert_eq!(c.site_id, 5);
        assert_eq!(c.partition_count, 4);
        assert_eq!(c.temp_table_memory_limit, DEFAULT_TEMP_TABLE_MEMORY_LIMIT);
        assert!(!c.storage.compaction_enabled);
        assert!(EngineConfig::from_json(r#"{"partition_id": 1}"#).is_err());
        assert!(EngineConfig::from_json("[1]").is_err());
    }
}
