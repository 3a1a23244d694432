use crate::big_alloc::BigBlock;
use crate::tuple::{TupleFlags, TUPLE_HEADER_SIZE};
use std::ops::{Deref, DerefMut};

/// Blocks with free slots are grouped into this many fill-level buckets.
pub const BUCKET_COUNT: usize = 20;

/// Backing memory of one tuple block.
pub(crate) enum BlockMemory {
    Pooled(Box<[u8]>),
    Big(BigBlock),
}

impl Deref for BlockMemory {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            BlockMemory::Pooled(b) => b,
            BlockMemory::Big(b) => b,
        }
    }
}

impl DerefMut for BlockMemory {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        match self {
            BlockMemory::Pooled(b) => b,
            BlockMemory::Big(b) => b,
        }
    }
}

/// TupleBlock is a fixed-size chunk of rows of one table.
/// Slots below `next_unused` are either occupied or in the free list.
/// Address of a slot is `base + slot * tuple_length`.
pub(crate) struct TupleBlock {
    base: u64,
    pub(crate) mem: BlockMemory,
    tuple_length: usize,
    capacity: usize,
    next_unused: usize,
    free_slots: Vec<u32>,
    used: usize,
    pub(crate) bucket: Option<usize>,
}

impl TupleBlock {
    #[inline]
    pub fn new(base: u64, mem: BlockMemory, tuple_length: usize) -> Self {
        debug_assert!(tuple_length >= TUPLE_HEADER_SIZE);
        let capacity = mem.len() / tuple_length;
        TupleBlock {
            base,
            mem,
            tuple_length,
            capacity,
            next_unused: 0,
            free_slots: vec![],
            used: 0,
            bucket: None,
        }
    }

    #[inline]
    pub fn base(&self) -> u64 {
        self.base
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied slots, pending deletes included.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn has_space(&self) -> bool {
        self.used < self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    #[inline]
    pub fn load(&self) -> f64 {
        self.used as f64 / self.capacity as f64
    }

    /// Fill-level bucket of the block, None if it is full.
    #[inline]
    pub fn compute_bucket(&self) -> Option<usize> {
        if self.has_space() {
            Some(self.used * BUCKET_COUNT / self.capacity)
        } else {
            None
        }
    }

    #[inline]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.base + (self.capacity * self.tuple_length) as u64
    }

    #[inline]
    pub fn slot_of(&self, addr: u64) -> usize {
        debug_assert!(self.contains(addr));
        debug_assert_eq!((addr - self.base) as usize % self.tuple_length, 0);
        (addr - self.base) as usize / self.tuple_length
    }

    #[inline]
    pub fn address_of(&self, slot: usize) -> u64 {
        self.base + (slot * self.tuple_length) as u64
    }

    /// Takes a free slot, reusing freed ones first.
    pub fn allocate_slot(&mut self) -> Option<usize> {
        let slot = if let Some(slot) = self.free_slots.pop() {
            slot as usize
        } else if self.next_unused < self.capacity {
            self.next_unused += 1;
            self.next_unused - 1
        } else {
            return None;
        };
        self.used += 1;
        Some(slot)
    }

    /// Returns a slot to the free list. The row bytes are cleared,
    /// objects it referenced must already be handled by the caller.
    pub fn free_slot(&mut self, slot: usize) {
        debug_assert!(slot < self.next_unused);
        self.row_mut(slot).fill(0);
        self.free_slots.push(slot as u32);
        self.used -= 1;
    }

    #[inline]
    pub fn row(&self, slot: usize) -> &[u8] {
        let start = slot * self.tuple_length;
        &self.mem[start..start + self.tuple_length]
    }

    #[inline]
    pub fn row_mut(&mut self, slot: usize) -> &mut [u8] {
        let start = slot * self.tuple_length;
        &mut self.mem[start..start + self.tuple_length]
    }

    #[inline]
    pub fn flags(&self, slot: usize) -> TupleFlags {
        TupleFlags::from_bits_truncate(self.row(slot)[0])
    }

    /// Slots holding active rows, in slot order.
    #[inline]
    pub fn active_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.next_unused).filter(move |s| self.flags(*s).contains(TupleFlags::ACTIVE))
    }
}
