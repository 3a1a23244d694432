use crate::config::DEFAULT_TABLE_BLOCK_SIZE;
use crate::error::{Error, Result};
use libc::{
    c_void, madvise, mmap, munmap, MADV_DONTNEED, MAP_ANONYMOUS, MAP_FAILED, MAP_NORESERVE,
    MAP_PRIVATE, PROT_READ, PROT_WRITE,
};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};

pub const BIG_MEMORY_REGION_SIZE: usize = 4 * 1024 * 1024 * 1024;

static GLOBAL: OnceCell<BigMemoryAllocator> = OnceCell::new();

/// BigMemoryAllocator hands out fixed-size blocks of one reserved
/// anonymous mapping. It is the only allocator shared between
/// workers, so its free list is guarded by a mutex.
/// Freed blocks are reused lowest offset first, and free blocks at
/// the end of the used range shrink the range.
pub struct BigMemoryAllocator {
    base: *mut u8,
    region_size: usize,
    block_size: usize,
    inner: Mutex<FreeList>,
}

unsafe impl Send for BigMemoryAllocator {}
unsafe impl Sync for BigMemoryAllocator {}

#[derive(Default)]
struct FreeList {
    used: usize,
    free: BTreeSet<usize>,
}

impl BigMemoryAllocator {
    pub fn new(region_size: usize, block_size: usize) -> Result<Self> {
        if block_size == 0 || region_size < block_size {
            return Err(Error::InvalidArgument);
        }
        let base = unsafe {
            let ptr = mmap(
                std::ptr::null_mut(),
                region_size,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS | MAP_NORESERVE,
                -1,
                0,
            );
            if ptr == MAP_FAILED {
                return Err(Error::InsufficientMemory(region_size));
            }
            ptr
        } as *mut u8;
        Ok(BigMemoryAllocator {
            base,
            region_size,
            block_size,
            inner: Mutex::new(FreeList::default()),
        })
    }

    /// Create an allocator and leak it to get the static reference.
    #[inline]
    pub fn with_capacity_static(region_size: usize, block_size: usize) -> Result<&'static Self> {
        let alloc = Self::new(region_size, block_size)?;
        Ok(Box::leak(Box::new(alloc)))
    }

    /// Process-wide allocator with blocks of default table block size,
    /// mapped on first use.
    #[inline]
    pub fn global() -> Result<&'static Self> {
        GLOBAL.get_or_try_init(|| Self::new(BIG_MEMORY_REGION_SIZE, DEFAULT_TABLE_BLOCK_SIZE))
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.region_size / self.block_size
    }

    /// Number of blocks between region start and the end of used range.
    #[inline]
    pub fn used_blocks(&self) -> usize {
        self.inner.lock().used
    }

    pub fn allocate(&'static self) -> Result<BigBlock> {
        let idx = {
            let mut g = self.inner.lock();
            if let Some(idx) = g.free.iter().next().cloned() {
                g.free.remove(&idx);
                idx
            } else if g.used < self.capacity() {
                g.used += 1;
                g.used - 1
            } else {
                return Err(Error::InsufficientMemory(self.block_size));
            }
        };
        Ok(BigBlock { alloc: self, idx })
    }

    fn deallocate(&self, idx: usize) {
        unsafe {
            madvise(
                self.block_ptr(idx) as *mut c_void,
                self.block_size,
                MADV_DONTNEED,
            );
        }
        let mut g = self.inner.lock();
        if idx + 1 == g.used {
            g.used -= 1;
            while g.used > 0 {
                let last = g.used - 1;
                if !g.free.remove(&last) {
                    break;
                }
                g.used = last;
            }
        } else {
            g.free.insert(idx);
        }
    }

    #[inline]
    fn block_ptr(&self, idx: usize) -> *mut u8 {
        unsafe { self.base.add(idx * self.block_size) }
    }
}

impl Drop for BigMemoryAllocator {
    fn drop(&mut self) {
        unsafe {
            munmap(self.base as *mut c_void, self.region_size);
        }
    }
}

/// One block of the big memory region, returned on drop.
pub struct BigBlock {
    alloc: &'static BigMemoryAllocator,
    idx: usize,
}

unsafe impl Send for BigBlock {}

impl BigBlock {
    /// Block position inside the region.
    #[inline]
    pub fn index(&self) -> usize {
        self.idx
    }
}

impl Deref for BigBlock {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.alloc.block_ptr(self.idx), self.alloc.block_size) }
    }
}

impl DerefMut for BigBlock {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(self.alloc.block_ptr(self.idx), self.alloc.block_size)
        }
    }
}

impl Drop for BigBlock {
    #[inline]
    fn drop(&mut self) {
        self.alloc.deallocate(self.idx);
    }
}
