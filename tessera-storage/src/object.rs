use std::mem;

/// Largest object payload that pooled storage accepts.
pub const POOLED_MAX_VALUE_LENGTH: usize = 1024 * 1024;
/// Every pooled element starts with the id of the reference owning it.
pub const BACK_REF_SIZE: usize = mem::size_of::<u64>();
/// Length of the payload follows the back reference.
pub const LENGTH_PREFIX_SIZE: usize = mem::size_of::<u32>();
/// Pooled element header: back reference and payload length.
pub const OBJECT_HEADER_SIZE: usize = BACK_REF_SIZE + LENGTH_PREFIX_SIZE;

const TEMP_TAG: u64 = 1 << 63;

/// ObjectRef identifies an out-of-line object.
/// The row keeps only this id, so the payload can be relocated
/// by its pool without touching any row.
/// Zero is the null reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(u64);

impl ObjectRef {
    pub const NULL: ObjectRef = ObjectRef(0);

    #[inline]
    pub(crate) fn pooled(id: u64) -> Self {
        debug_assert!(id & TEMP_TAG == 0);
        ObjectRef(id)
    }

    #[inline]
    pub(crate) fn temp(id: u64) -> Self {
        ObjectRef(id | TEMP_TAG)
    }

    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        ObjectRef(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Temp references belong to a scratch pool, destroying them
    /// through the arena does nothing.
    #[inline]
    pub fn is_temp(self) -> bool {
        self.0 & TEMP_TAG != 0
    }

    #[inline]
    pub(crate) fn id(self) -> u64 {
        self.0 & !TEMP_TAG
    }
}

/// Read access to out-of-line objects of a row.
pub trait ObjectStore {
    fn object(&self, r: ObjectRef) -> &[u8];
}

/// Allocation of out-of-line objects when a row is written.
pub trait ObjectAllocator: ObjectStore {
    fn create_object(&mut self, data: &[u8]) -> ObjectRef;

    fn destroy_object(&mut self, r: ObjectRef);
}

/// Rounds an allocation request up to its size class, which is
/// either a power of two or three quarters of one.
/// Returns None if the request exceeds pooled limit.
pub fn alloc_size_for(length: usize) -> Option<usize> {
    if length > POOLED_MAX_VALUE_LENGTH - (POOLED_MAX_VALUE_LENGTH >> 2) {
        if length > POOLED_MAX_VALUE_LENGTH + OBJECT_HEADER_SIZE {
            return None;
        }
        return Some(POOLED_MAX_VALUE_LENGTH + OBJECT_HEADER_SIZE);
    }
    let next_power_of_2 = length.max(1).next_power_of_two();
    let three_fourths = next_power_of_2 - (next_power_of_2 >> 2);
    if length <= three_fourths {
        Some(three_fourths)
    } else {
        Some(next_power_of_2)
    }
}

/// Pooled size class of an object with given payload length.
#[inline]
pub fn object_alloc_size(length: usize) -> usize {
    match alloc_size_for(OBJECT_HEADER_SIZE + length) {
        Some(size) => size,
        None => fatal!(
            "attempted to allocate an object larger than the 1 meg limit, requested size was {}",
            length
        ),
    }
}

/// Memory charged for storing one object of given payload length,
/// including its reference record.
#[inline]
pub fn compute_memory_used(length: usize) -> usize {
    object_alloc_size(length) + mem::size_of::<crate::pool::ObjectRecord>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_size_class(size: usize) -> bool {
        if size == POOLED_MAX_VALUE_LENGTH + OBJECT_HEADER_SIZE {
            return true;
        }
        let p = size.next_power_of_two();
        size == p || size == p - (p >> 2)
    }

    #[test]
    fn test_alloc_size_classes() {
        assert_eq!(alloc_size_for(1), Some(1));
        assert_eq!(alloc_size_for(3), Some(3));
        assert_eq!(alloc_size_for(5), Some(6));
        assert_eq!(alloc_size_for(7), Some(8));
        assert_eq!(alloc_size_for(20), Some(24));
        assert_eq!(alloc_size_for(25), Some(32));
        assert_eq!(alloc_size_for(100), Some(128));
        assert_eq!(
            alloc_size_for(POOLED_MAX_VALUE_LENGTH),
            Some(POOLED_MAX_VALUE_LENGTH + OBJECT_HEADER_SIZE)
        );
        assert_eq!(alloc_size_for(POOLED_MAX_VALUE_LENGTH + OBJECT_HEADER_SIZE + 1), None);
    }

    #[test]
    fn test_alloc_size_monotone() {
        let mut prev = 0;
        for n in 1..(POOLED_MAX_VALUE_LENGTH + OBJECT_HEADER_SIZE) {
            let size = alloc_size_for(n).unwrap();
            assert!(size >= n);
            assert!(size >= prev);
            if size != prev {
                assert!(is_size_class(size));
            }
            prev = size;
        }
    }

    #[test]
    fn test_compute_memory_used() {
        let small = compute_memory_used(10);
        let large = compute_memory_used(1000);
        assert!(large > small);
        assert!(small >= 10 + OBJECT_HEADER_SIZE);
    }

    #[test]
    #[should_panic]
    fn test_oversized_object() {
        object_alloc_size(POOLED_MAX_VALUE_LENGTH + 1);
    }

    #[test]
    fn test_object_ref_tags() {
        let r = ObjectRef::temp(5);
        assert!(r.is_temp());
        assert_eq!(r.id(), 5);
        assert!(!ObjectRef::pooled(5).is_temp());
        assert!(ObjectRef::NULL.is_null());
    }
}
