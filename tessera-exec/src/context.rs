use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::topend::Topend;
use fnv::FnvHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tessera_datatype::Value;
use tessera_storage::catalog::Catalog;
use tessera_storage::config::TempTableLimits;
use tessera_storage::pool::PoolArena;
use tessera_storage::table::PersistentTable;
use tessera_storage::undo::{UndoLog, UndoQuantum};

/// Maps partitioning values to partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    partition_id: i32,
    partition_count: u32,
}

impl Partitioner {
    #[inline]
    pub fn new(partition_id: i32, partition_count: u32) -> Self {
        Partitioner {
            partition_id,
            partition_count: partition_count.max(1),
        }
    }

    /// Partition owning rows with given partitioning value.
    /// Null always belongs to partition 0.
    #[inline]
    pub fn partition_of(&self, v: &Value) -> i32 {
        if self.partition_count == 1 || v.is_null() {
            return 0;
        }
        let mut hasher = FnvHasher::default();
        v.hash(&mut hasher);
        (hasher.finish() % self.partition_count as u64) as i32
    }

    #[inline]
    pub fn is_local(&self, v: &Value) -> bool {
        self.partition_of(v) == self.partition_id
    }
}

/// ExecutorContext holds everything executors read or modify
/// while running one fragment.
pub struct ExecutorContext {
    pub(crate) catalog: Catalog,
    pub(crate) arena: PoolArena,
    pub(crate) undo_log: UndoLog,
    pub(crate) params: Vec<Value>,
    pub(crate) undo_token: Option<i64>,
    pub(crate) input_dependency_id: Option<i64>,
    pub(crate) tuples_modified: i64,
    limits: Arc<TempTableLimits>,
    topend: Box<dyn Topend>,
    config: EngineConfig,
}

impl ExecutorContext {
    pub fn new(config: EngineConfig, topend: Box<dyn Topend>) -> Self {
        let limits = Arc::new(TempTableLimits::new(
            config.temp_table_memory_limit,
            config.temp_table_log_threshold,
        ));
        ExecutorContext {
            catalog: Catalog::new(config.storage.clone()),
            arena: PoolArena::new(),
            undo_log: UndoLog::new(),
            params: vec![],
            undo_token: None,
            input_dependency_id: None,
            tuples_modified: 0,
            limits,
            topend,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[inline]
    pub fn arena(&self) -> &PoolArena {
        &self.arena
    }

    #[inline]
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    #[inline]
    pub fn topend(&self) -> &dyn Topend {
        self.topend.as_ref()
    }

    #[inline]
    pub fn limits(&self) -> &Arc<TempTableLimits> {
        &self.limits
    }

    #[inline]
    pub fn partitioner(&self) -> Partitioner {
        Partitioner::new(self.config.partition_id, self.config.partition_count)
    }

    #[inline]
    pub fn table(&self, name: &str) -> Result<&PersistentTable> {
        self.catalog
            .table_by_name(name)
            .ok_or_else(|| Error::TableNotExists(name.to_string()))
    }

    /// Splits the context for a modification: the table to modify,
    /// the arena holding its objects and the undo quantum of the
    /// current token. No quantum is opened without a token.
    pub(crate) fn modify_parts(
        &mut self,
        table: &str,
    ) -> Result<(&mut PersistentTable, &mut PoolArena, Option<&mut UndoQuantum>)> {
        let t = self
            .catalog
            .table_by_name_mut(table)
            .ok_or_else(|| Error::TableNotExists(table.to_string()))?;
        let quantum = match self.undo_token {
            Some(token) => Some(self.undo_log.generate_undo_quantum(token)),
            None => None,
        };
        Ok((t, &mut self.arena, quantum))
    }

    /// Logs through both the log facade and the host.
    pub(crate) fn diagnose(&self, level: log::Level, message: &str) {
        log::log!(level, "{}", message);
        self.topend.log(level, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitioner() {
        let single = Partitioner::new(0, 1);
        assert!(single.is_local(&Value::Integer(42)));
        let p = Partitioner::new(1, 3);
        assert_eq!(p.partition_of(&Value::Null), 0);
        let owner = p.partition_of(&Value::BigInt(7));
        assert!((0..3).contains(&owner));
        // numerics hash by value, not by width
        assert_eq!(owner, p.partition_of(&Value::Integer(7)));
        assert_eq!(
            p.partition_of(&Value::varchar("abc")),
            p.partition_of(&Value::varchar("abc"))
        );
    }
}
