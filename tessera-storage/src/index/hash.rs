use crate::index::key::IndexKey;
use crate::index::{IndexCursor, IndexOps};
use fnv::FnvHashMap;
use smallvec::SmallVec;
use tessera_datatype::Value;

/// Hash index with at most one entry per key.
#[derive(Debug, Default)]
pub struct HashUniqueIndex {
    map: FnvHashMap<IndexKey, u64>,
}

impl HashUniqueIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexOps for HashUniqueIndex {
    #[inline]
    fn add_entry(&mut self, key: IndexKey, addr: u64) -> bool {
        if self.map.contains_key(&key) {
            return false;
        }
        self.map.insert(key, addr);
        true
    }

    #[inline]
    fn delete_entry(&mut self, key: &[Value], addr: u64) -> bool {
        match self.map.get(key) {
            Some(a) if *a == addr => {
                self.map.remove(key);
                true
            }
            _ => false,
        }
    }

    #[inline]
    fn replace_entry_no_key_change(&mut self, key: &[Value], new_addr: u64, old_addr: u64) -> bool {
        match self.map.get_mut(key) {
            Some(a) if *a == old_addr => {
                *a = new_addr;
                true
            }
            _ => false,
        }
    }

    #[inline]
    fn exists(&self, key: &[Value], addr: u64) -> bool {
        self.map.get(key) == Some(&addr)
    }

    #[inline]
    fn has_key(&self, key: &[Value]) -> bool {
        self.map.contains_key(key)
    }

    #[inline]
    fn size(&self) -> usize {
        self.map.len()
    }

    fn move_to_key(&self, key: &[Value], cursor: &mut IndexCursor) -> bool {
        cursor.reset(true);
        if let Some(a) = self.map.get(key) {
            cursor.matches.push(*a);
        }
        !cursor.matches.is_empty()
    }

    #[inline]
    fn next_value_at_key(&self, cursor: &mut IndexCursor) -> Option<u64> {
        cursor.next_match()
    }

    #[inline]
    fn next_value(&self, cursor: &mut IndexCursor) -> Option<u64> {
        cursor.next_match()
    }
}

/// Hash index allowing many entries per key.
#[derive(Debug, Default)]
pub struct HashMultiIndex {
    map: FnvHashMap<IndexKey, SmallVec<[u64; 2]>>,
    len: usize,
}

impl HashMultiIndex {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexOps for HashMultiIndex {
    fn add_entry(&mut self, key: IndexKey, addr: u64) -> bool {
        let addrs = self.map.entry(key).or_default();
        if addrs.contains(&addr) {
            return false;
        }
        addrs.push(addr);
        self.len += 1;
        true
    }

    fn delete_entry(&mut self, key: &[Value], addr: u64) -> bool {
        let addrs = match self.map.get_mut(key) {
            Some(addrs) => addrs,
            None => return false,
        };
        match addrs.iter().position(|a| *a == addr) {
            Some(i) => {
                addrs.swap_remove(i);
                if addrs.is_empty() {
                    self.map.remove(key);
                }
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    fn replace_entry_no_key_change(&mut self, key: &[Value], new_addr: u64, old_addr: u64) -> bool {
        self.map
            .get_mut(key)
            .and_then(|addrs| addrs.iter_mut().find(|a| **a == old_addr))
            .map(|a| *a = new_addr)
            .is_some()
    }

    #[inline]
    fn exists(&self, key: &[Value], addr: u64) -> bool {
        self.map
            .get(key)
            .map(|addrs| addrs.contains(&addr))
            .unwrap_or(false)
    }

    #[inline]
    fn has_key(&self, key: &[Value]) -> bool {
        self.map.contains_key(key)
    }

    #[inline]
    fn size(&self) -> usize {
        self.len
    }

    fn move_to_key(&self, key: &[Value], cursor: &mut IndexCursor) -> bool {
        cursor.reset(true);
        if let Some(addrs) = self.map.get(key) {
            cursor.matches.extend(addrs.iter().copied());
        }
        !cursor.matches.is_empty()
    }

    #[inline]
    fn next_value_at_key(&self, cursor: &mut IndexCursor) -> Option<u64> {
        cursor.next_match()
    }

    #[inline]
    fn next_value(&self, cursor: &mut IndexCursor) -> Option<u64> {
        cursor.next_match()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_hash_unique() {
        let mut idx = HashUniqueIndex::new();
        let k: IndexKey = smallvec![Value::varchar("a"), Value::Integer(1)];
        assert!(idx.add_entry(k.clone(), 10));
        assert!(!idx.add_entry(k.clone(), 11));
        assert!(idx.exists(&k, 10));
        assert!(!idx.delete_entry(&k, 11));
        assert!(idx.replace_entry_no_key_change(&k, 12, 10));
        let mut cursor = IndexCursor::default();
        assert!(idx.move_to_key(&k, &mut cursor));
        assert_eq!(idx.next_value_at_key(&mut cursor), Some(12));
        assert_eq!(idx.next_value_at_key(&mut cursor), None);
        assert!(idx.delete_entry(&k, 12));
        assert!(!idx.has_key(&k));
        assert_eq!(idx.size(), 0);
    }

    #[test]
    fn test_hash_multi() {
        let mut idx = HashMultiIndex::new();
        let k: IndexKey = smallvec![Value::BigInt(7)];
        assert!(idx.add_entry(k.clone(), 1));
        assert!(idx.add_entry(k.clone(), 2));
        assert!(!idx.add_entry(k.clone(), 2));
        assert_eq!(idx.size(), 2);
        assert!(idx.delete_entry(&k, 1));
        let mut cursor = IndexCursor::default();
        assert!(idx.move_to_key(&k, &mut cursor));
        assert_eq!(idx.next_value_at_key(&mut cursor), Some(2));
        assert_eq!(idx.next_value_at_key(&mut cursor), None);
        // lookup with a key of another integral width
        assert!(idx.has_key(&[Value::Integer(7)]));
    }
}
