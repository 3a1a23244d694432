mod compact;
mod temp;

pub use compact::CompactingPool;
pub use temp::TempPool;

use crate::object::{
    object_alloc_size, ObjectAllocator, ObjectRef, ObjectStore, BACK_REF_SIZE, OBJECT_HEADER_SIZE,
};
use fnv::FnvHashMap;
use slab::Slab;

const POOL_CHUNK_BYTES: usize = 2 * 1024 * 1024;
const LARGE_OBJECT_SIZE: usize = 256 * 1024;
const INITIAL_BATCH: usize = 32;

/// ObjectPool recycles fixed-size buffers of one size.
/// It grows in batches bounded by 2MB, or two objects at a time
/// for large objects, so untouched memory stays small.
pub struct ObjectPool {
    size: usize,
    next_size: usize,
    free: Vec<Box<[u8]>>,
    bytes_allocated: usize,
}

impl ObjectPool {
    #[inline]
    pub fn new(size: usize) -> Self {
        ObjectPool {
            size,
            next_size: INITIAL_BATCH,
            free: vec![],
            bytes_allocated: 0,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn allocate(&mut self) -> Box<[u8]> {
        if let Some(obj) = self.free.pop() {
            return obj;
        }
        if self.next_size * self.size > POOL_CHUNK_BYTES {
            self.next_size = if self.size < LARGE_OBJECT_SIZE {
                (POOL_CHUNK_BYTES / self.size).max(1)
            } else {
                2
            };
        }
        let n = self.next_size;
        let size = self.size;
        self.free
            .extend((0..n).map(|_| vec![0u8; size].into_boxed_slice()));
        self.bytes_allocated += n * size;
        self.next_size = n * 2;
        match self.free.pop() {
            Some(obj) => obj,
            None => fatal!("object pool of size {} failed to grow", self.size),
        }
    }

    pub fn free(&mut self, mut obj: Box<[u8]>) {
        if obj.len() != self.size {
            fatal!(
                "object of size {} returned to pool of size {}",
                obj.len(),
                self.size
            )
        }
        obj.fill(0);
        self.free.push(obj);
    }

    #[inline]
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }
}

/// Location of a pooled object payload.
#[derive(Debug, Clone, Copy)]
pub struct ObjectRecord {
    size: usize,
    slot: usize,
}

/// PoolArena owns all pooled memory of one worker: fixed-size object
/// pools keyed by size and compacting string pools keyed by size class.
/// It is created when the worker starts and dropped when it stops.
#[derive(Default)]
pub struct PoolArena {
    object_pools: FnvHashMap<usize, ObjectPool>,
    string_pools: FnvHashMap<usize, CompactingPool>,
    refs: Slab<ObjectRecord>,
}

impl PoolArena {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn allocate_object(&mut self, size: usize) -> Box<[u8]> {
        self.object_pools
            .entry(size)
            .or_insert_with(|| ObjectPool::new(size))
            .allocate()
    }

    #[inline]
    pub fn free_object(&mut self, size: usize, obj: Box<[u8]>) {
        match self.object_pools.get_mut(&size) {
            Some(pool) => pool.free(obj),
            None => fatal!(
                "attempted to deallocate an object that was not pool allocated, size was {}",
                size
            ),
        }
    }

    /// Allocates one element of given size class and returns its slot.
    #[inline]
    pub fn allocate_string(&mut self, alloc_size: usize) -> usize {
        debug_assert!(alloc_size > 0);
        self.string_pools
            .entry(alloc_size)
            .or_insert_with(|| CompactingPool::new(alloc_size, POOL_CHUNK_BYTES / alloc_size + 1))
            .malloc()
    }

    /// Frees one element, returns true if another element was moved
    /// into its slot.
    #[inline]
    pub fn free_string(&mut self, alloc_size: usize, slot: usize) -> bool {
        match self.string_pools.get_mut(&alloc_size) {
            Some(pool) => pool.free(slot),
            None => fatal!(
                "attempted to deallocate a string that was not pool allocated, size was {}",
                alloc_size
            ),
        }
    }

    pub fn total_bytes_allocated(&self) -> usize {
        self.object_pools
            .values()
            .map(ObjectPool::bytes_allocated)
            .chain(self.string_pools.values().map(CompactingPool::bytes_allocated))
            .sum()
    }

    /// Number of live pooled objects.
    #[inline]
    pub fn object_count(&self) -> usize {
        self.refs.len()
    }

    #[inline]
    fn record(&self, r: ObjectRef) -> &ObjectRecord {
        match self.refs.get(r.id() as usize - 1) {
            Some(rec) => rec,
            None => fatal!("dangling object reference {}", r.raw()),
        }
    }
}

impl ObjectStore for PoolArena {
    #[inline]
    fn object(&self, r: ObjectRef) -> &[u8] {
        let rec = self.record(r);
        let elem = match self.string_pools.get(&rec.size) {
            Some(pool) => pool.get(rec.slot),
            None => fatal!("no string pool of size {}", rec.size),
        };
        let len: u32 = bytemuck::pod_read_unaligned(&elem[BACK_REF_SIZE..OBJECT_HEADER_SIZE]);
        &elem[OBJECT_HEADER_SIZE..OBJECT_HEADER_SIZE + len as usize]
    }
}

impl ObjectAllocator for PoolArena {
    fn create_object(&mut self, data: &[u8]) -> ObjectRef {
        let size = object_alloc_size(data.len());
        let slot = self.allocate_string(size);
        let key = self.refs.insert(ObjectRecord { size, slot });
        let r = ObjectRef::pooled(key as u64 + 1);
        // string pool always exists after allocation
        if let Some(pool) = self.string_pools.get_mut(&size) {
            let elem = pool.get_mut(slot);
            elem[..BACK_REF_SIZE].copy_from_slice(bytemuck::bytes_of(&r.raw()));
            elem[BACK_REF_SIZE..OBJECT_HEADER_SIZE]
                .copy_from_slice(bytemuck::bytes_of(&(data.len() as u32)));
            elem[OBJECT_HEADER_SIZE..OBJECT_HEADER_SIZE + data.len()].copy_from_slice(data);
        }
        r
    }

    fn destroy_object(&mut self, r: ObjectRef) {
        if r.is_null() || r.is_temp() {
            return;
        }
        let rec = match self.refs.try_remove(r.id() as usize - 1) {
            Some(rec) => rec,
            None => fatal!("object reference {} destroyed twice", r.raw()),
        };
        if self.free_string(rec.size, rec.slot) {
            // slot now holds the moved element, patch its owner
            let moved = match self.string_pools.get(&rec.size) {
                Some(pool) => {
                    let raw: u64 = bytemuck::pod_read_unaligned(&pool.get(rec.slot)[..BACK_REF_SIZE]);
                    ObjectRef::from_raw(raw)
                }
                None => return,
            };
            if let Some(moved_rec) = self.refs.get_mut(moved.id() as usize - 1) {
                moved_rec.slot = rec.slot;
            }
        }
    }
}
