use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

pub const DEFAULT_TABLE_BLOCK_SIZE: usize = 2 * 1024 * 1024;

/// Storage settings of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Byte size of one tuple block of persistent table.
    pub table_block_size: usize,
    /// Carve tuple blocks from the process-wide big memory region
    /// instead of the per-worker object pools.
    pub use_big_allocator: bool,
    /// Compact sparse blocks when undo quanta are released.
    pub compaction_enabled: bool,
    /// Row limit applied to tables created without explicit one.
    pub default_tuple_limit: Option<usize>,
}

impl Default for StorageConfig {
    #[inline]
    fn default() -> Self {
        StorageConfig {
            table_block_size: DEFAULT_TABLE_BLOCK_SIZE,
            use_big_allocator: false,
            compaction_enabled: true,
            default_tuple_limit: None,
        }
    }
}

/// Memory accounting shared by all temp tables of one fragment.
/// A negative limit or threshold disables the corresponding check.
#[derive(Debug)]
pub struct TempTableLimits {
    allocated: AtomicI64,
    peak: AtomicI64,
    memory_limit: i64,
    log_threshold: i64,
    log_latch: AtomicBool,
}

impl Default for TempTableLimits {
    #[inline]
    fn default() -> Self {
        TempTableLimits::new(-1, -1)
    }
}

impl TempTableLimits {
    #[inline]
    pub fn new(memory_limit: i64, log_threshold: i64) -> Self {
        TempTableLimits {
            allocated: AtomicI64::new(0),
            peak: AtomicI64::new(0),
            memory_limit,
            log_threshold,
            log_latch: AtomicBool::new(false),
        }
    }

    pub fn increase_allocated(&self, bytes: usize) -> Result<()> {
        let allocated = self.allocated.fetch_add(bytes as i64, Ordering::Relaxed) + bytes as i64;
        self.peak.fetch_max(allocated, Ordering::Relaxed);
        if self.memory_limit > 0 && allocated > self.memory_limit {
            return Err(Error::TempTableMemoryLimit {
                allocated,
                limit: self.memory_limit,
            });
        }
        if self.log_threshold > 0
            && allocated > self.log_threshold
            && !self.log_latch.swap(true, Ordering::Relaxed)
        {
            log::info!(
                "temp table memory {} bytes exceeds log threshold {} bytes",
                allocated,
                self.log_threshold
            );
        }
        Ok(())
    }

    pub fn reduce_allocated(&self, bytes: usize) {
        let allocated = self.allocated.fetch_sub(bytes as i64, Ordering::Relaxed) - bytes as i64;
        if self.log_threshold > 0 && allocated < self.log_threshold {
            self.log_latch.store(false, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn allocated(&self) -> i64 {
        self.allocated.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn peak(&self) -> i64 {
        self.peak.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn memory_limit(&self) -> i64 {
        self.memory_limit
    }

    #[inline]
    pub fn log_threshold(&self) -> i64 {
        self.log_threshold
    }

    /// Returns whether the log threshold has been crossed and
    /// usage has not yet dropped back below it.
    #[inline]
    pub fn log_latched(&self) -> bool {
        self.log_latch.load(Ordering::Relaxed)
    }
}
