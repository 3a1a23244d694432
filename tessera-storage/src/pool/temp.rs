use crate::object::{ObjectAllocator, ObjectRef, ObjectStore};

const TEMP_POOL_CHUNK_SIZE: usize = 256 * 1024;

/// TempPool is a bump allocator for query-scoped objects.
/// Objects are never freed one by one: references it hands out are
/// tagged as temp, destroying them is a no-op, and the whole pool is
/// reclaimed by `purge`.
pub struct TempPool {
    chunks: Vec<Vec<u8>>,
    records: Vec<(u32, u32, u32)>,
}

impl Default for TempPool {
    #[inline]
    fn default() -> Self {
        TempPool::new()
    }
}

impl TempPool {
    #[inline]
    pub fn new() -> Self {
        TempPool {
            chunks: vec![],
            records: vec![],
        }
    }

    /// Drops every object allocated so far.
    /// The first chunk is kept for reuse.
    pub fn purge(&mut self) {
        self.records.clear();
        self.chunks.truncate(1);
        if let Some(c) = self.chunks.first_mut() {
            c.clear();
        }
    }

    #[inline]
    pub fn allocated_memory(&self) -> usize {
        self.chunks.iter().map(|c| c.capacity()).sum()
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.records.len()
    }

    fn chunk_for(&mut self, len: usize) -> usize {
        if let Some(last) = self.chunks.last() {
            if last.capacity() - last.len() >= len {
                return self.chunks.len() - 1;
            }
        }
        self.chunks
            .push(Vec::with_capacity(TEMP_POOL_CHUNK_SIZE.max(len)));
        self.chunks.len() - 1
    }
}

impl ObjectStore for TempPool {
    #[inline]
    fn object(&self, r: ObjectRef) -> &[u8] {
        let (chunk, offset, len) = self.records[r.id() as usize - 1];
        let start = offset as usize;
        &self.chunks[chunk as usize][start..start + len as usize]
    }
}

impl ObjectAllocator for TempPool {
    fn create_object(&mut self, data: &[u8]) -> ObjectRef {
        let chunk = self.chunk_for(data.len());
        let c = &mut self.chunks[chunk];
        let offset = c.len();
        c.extend_from_slice(data);
        self.records
            .push((chunk as u32, offset as u32, data.len() as u32));
        ObjectRef::temp(self.records.len() as u64)
    }

    #[inline]
    fn destroy_object(&mut self, _r: ObjectRef) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_pool_alloc_and_purge() {
        let mut pool = TempPool::new();
        let a = pool.create_object(b"abc");
        let big = vec![7u8; TEMP_POOL_CHUNK_SIZE + 10];
        let b = pool.create_object(&big);
        let c = pool.create_object(b"xyz");
        assert!(a.is_temp() && b.is_temp() && c.is_temp());
        assert_eq!(pool.object(a), b"abc");
        assert_eq!(pool.object(b), &big[..]);
        assert_eq!(pool.object(c), b"xyz");
        pool.destroy_object(a);
        assert_eq!(pool.object(a), b"abc");
        assert_eq!(pool.object_count(), 3);
        pool.purge();
        assert_eq!(pool.object_count(), 0);
        let mem = pool.allocated_memory();
        assert!(mem >= TEMP_POOL_CHUNK_SIZE && mem < TEMP_POOL_CHUNK_SIZE * 2);
    }
}
