/// CompactingPool stores same-sized elements densely.
/// Freeing an element moves the last element into the freed slot,
/// so memory in use always tracks the number of live elements.
pub struct CompactingPool {
    elem_size: usize,
    elems_per_chunk: usize,
    chunks: Vec<Box<[u8]>>,
    count: usize,
}

impl CompactingPool {
    #[inline]
    pub fn new(elem_size: usize, elems_per_chunk: usize) -> Self {
        debug_assert!(elem_size > 0 && elems_per_chunk > 0);
        CompactingPool {
            elem_size,
            elems_per_chunk,
            chunks: vec![],
            count: 0,
        }
    }

    #[inline]
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn bytes_allocated(&self) -> usize {
        self.chunks.len() * self.elems_per_chunk * self.elem_size
    }

    /// Allocates one element and returns its slot.
    pub fn malloc(&mut self) -> usize {
        let slot = self.count;
        if slot == self.chunks.len() * self.elems_per_chunk {
            let chunk = vec![0u8; self.elems_per_chunk * self.elem_size];
            self.chunks.push(chunk.into_boxed_slice());
        }
        self.count += 1;
        slot
    }

    /// Frees the element at given slot. Returns true if the last
    /// element was moved into the slot, so whoever referenced the
    /// last element must now use this slot.
    pub fn free(&mut self, slot: usize) -> bool {
        debug_assert!(slot < self.count);
        let last = self.count - 1;
        let relocated = if slot != last {
            let (src_chunk, src_off) = self.locate(last);
            let (dst_chunk, dst_off) = self.locate(slot);
            let size = self.elem_size;
            if src_chunk == dst_chunk {
                self.chunks[src_chunk].copy_within(src_off..src_off + size, dst_off);
            } else {
                let (lo, hi) = self.chunks.split_at_mut(src_chunk);
                lo[dst_chunk][dst_off..dst_off + size]
                    .copy_from_slice(&hi[0][src_off..src_off + size]);
            }
            true
        } else {
            false
        };
        self.count = last;
        // release trailing chunk once it holds nothing
        if self.count <= (self.chunks.len().saturating_sub(1)) * self.elems_per_chunk {
            self.chunks.pop();
        }
        relocated
    }

    #[inline]
    pub fn get(&self, slot: usize) -> &[u8] {
        let (chunk, off) = self.locate(slot);
        &self.chunks[chunk][off..off + self.elem_size]
    }

    #[inline]
    pub fn get_mut(&mut self, slot: usize) -> &mut [u8] {
        let (chunk, off) = self.locate(slot);
        let size = self.elem_size;
        &mut self.chunks[chunk][off..off + size]
    }

    #[inline]
    fn locate(&self, slot: usize) -> (usize, usize) {
        (
            slot / self.elems_per_chunk,
            (slot % self.elems_per_chunk) * self.elem_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compacting_pool_relocation() {
        let mut pool = CompactingPool::new(4, 2);
        for i in 0..5u8 {
            let slot = pool.malloc();
            pool.get_mut(slot).fill(i);
        }
        assert_eq!(pool.count(), 5);
        assert_eq!(pool.bytes_allocated(), 3 * 2 * 4);
        // free non-terminal element, last one moves in
        assert!(pool.free(1));
        assert_eq!(pool.get(1), &[4, 4, 4, 4]);
        assert_eq!(pool.bytes_allocated(), 2 * 2 * 4);
        // free terminal element, nothing moves
        assert!(!pool.free(3));
        assert_eq!(pool.count(), 3);
        assert_eq!(pool.get(0), &[0, 0, 0, 0]);
        assert_eq!(pool.get(2), &[2, 2, 2, 2]);
        while pool.count() > 0 {
            pool.free(0);
        }
        assert_eq!(pool.bytes_allocated(), 0);
    }
}
