use crate::index::key::{compare_keys, compare_prefix, IndexKey};
use crate::index::{IndexCursor, IndexOps};
use std::cmp::Ordering;
use tessera_datatype::Value;

const CHUNK_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    key: IndexKey,
    addr: u64,
}

impl Entry {
    #[inline]
    fn cmp_exact(&self, key: &[Value], addr: u64) -> Ordering {
        compare_keys(&self.key, key).then(self.addr.cmp(&addr))
    }
}

/// Position inside chunked entry list.
pub(crate) type Pos = (usize, usize);

/// Entries kept in key order, split into bounded chunks so that
/// insertion does not shift the whole list.
#[derive(Debug, Default)]
struct EntryList {
    chunks: Vec<Vec<Entry>>,
    len: usize,
}

impl EntryList {
    /// First position whose entry does not satisfy `pred`.
    /// `pred` must hold for a prefix of the list.
    fn partition_point<F: Fn(&Entry) -> bool>(&self, pred: F) -> Pos {
        let c = self
            .chunks
            .partition_point(|chunk| chunk.last().map(&pred).unwrap_or(true));
        if c == self.chunks.len() {
            return (c, 0);
        }
        (c, self.chunks[c].partition_point(&pred))
    }

    #[inline]
    fn rank(&self, pos: Pos) -> usize {
        self.chunks[..pos.0].iter().map(Vec::len).sum::<usize>() + pos.1
    }

    #[inline]
    fn get(&self, pos: Pos) -> Option<&Entry> {
        self.chunks.get(pos.0).and_then(|c| c.get(pos.1))
    }

    #[inline]
    fn get_mut(&mut self, pos: Pos) -> Option<&mut Entry> {
        self.chunks.get_mut(pos.0).and_then(|c| c.get_mut(pos.1))
    }

    #[inline]
    fn next_pos(&self, pos: Pos) -> Pos {
        if pos.1 + 1 < self.chunks[pos.0].len() {
            (pos.0, pos.1 + 1)
        } else {
            (pos.0 + 1, 0)
        }
    }

    #[inline]
    fn prev_pos(&self, pos: Pos) -> Option<Pos> {
        if pos.1 > 0 {
            Some((pos.0, pos.1 - 1))
        } else if pos.0 > 0 {
            Some((pos.0 - 1, self.chunks[pos.0 - 1].len() - 1))
        } else {
            None
        }
    }

    #[inline]
    fn end(&self) -> Pos {
        (self.chunks.len(), 0)
    }

    fn find_exact(&self, key: &[Value], addr: u64) -> Option<Pos> {
        let pos = self.partition_point(|e| e.cmp_exact(key, addr) == Ordering::Less);
        match self.get(pos) {
            Some(e) if e.cmp_exact(key, addr) == Ordering::Equal => Some(pos),
            _ => None,
        }
    }

    fn insert(&mut self, entry: Entry) {
        let (mut c, mut o) =
            self.partition_point(|e| e.cmp_exact(&entry.key, entry.addr) == Ordering::Less);
        if self.chunks.is_empty() {
            self.chunks.push(Vec::with_capacity(CHUNK_CAPACITY));
        }
        if c == self.chunks.len() {
            c -= 1;
            o = self.chunks[c].len();
        }
        self.chunks[c].insert(o, entry);
        if self.chunks[c].len() >= CHUNK_CAPACITY * 2 {
            let tail = self.chunks[c].split_off(CHUNK_CAPACITY);
            self.chunks.insert(c + 1, tail);
        }
        self.len += 1;
    }

    fn remove(&mut self, pos: Pos) -> Entry {
        let e = self.chunks[pos.0].remove(pos.1);
        if self.chunks[pos.0].is_empty() {
            self.chunks.remove(pos.0);
        }
        self.len -= 1;
        e
    }

    #[inline]
    fn lower_bound(&self, search: &[Value]) -> Pos {
        self.partition_point(|e| compare_prefix(&e.key, search) == Ordering::Less)
    }

    #[inline]
    fn upper_bound(&self, search: &[Value]) -> Pos {
        self.partition_point(|e| compare_prefix(&e.key, search) != Ordering::Greater)
    }
}

/// Ordered index. Entries are sorted by key then by address, so
/// entries of one key in a multi index are individually addressable.
/// Search keys may cover only leading key columns.
#[derive(Debug, Default)]
pub struct TreeIndex<const UNIQUE: bool> {
    entries: EntryList,
}

pub type TreeUniqueIndex = TreeIndex<true>;
pub type TreeMultiIndex = TreeIndex<false>;

impl<const UNIQUE: bool> TreeIndex<UNIQUE> {
    #[inline]
    pub fn new() -> Self {
        TreeIndex {
            entries: EntryList::default(),
        }
    }

    #[inline]
    fn read_forward(&self, cursor: &mut IndexCursor) -> Option<&Entry> {
        let e = self.entries.get(cursor.pos)?;
        cursor.pos = self.entries.next_pos(cursor.pos);
        Some(e)
    }

    #[inline]
    fn read_backward(&self, cursor: &mut IndexCursor) -> Option<&Entry> {
        let pos = self.entries.prev_pos(cursor.pos)?;
        cursor.pos = pos;
        self.entries.get(pos)
    }
}

impl<const UNIQUE: bool> IndexOps for TreeIndex<UNIQUE> {
    fn add_entry(&mut self, key: IndexKey, addr: u64) -> bool {
        if UNIQUE {
            let pos = self.entries.lower_bound(&key);
            if let Some(e) = self.entries.get(pos) {
                if compare_keys(&e.key, &key) == Ordering::Equal {
                    return false;
                }
            }
        } else if self.entries.find_exact(&key, addr).is_some() {
            return false;
        }
        self.entries.insert(Entry { key, addr });
        true
    }

    fn delete_entry(&mut self, key: &[Value], addr: u64) -> bool {
        match self.entries.find_exact(key, addr) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    fn replace_entry_no_key_change(&mut self, key: &[Value], new_addr: u64, old_addr: u64) -> bool {
        let pos = match self.entries.find_exact(key, old_addr) {
            Some(pos) => pos,
            None => return false,
        };
        if UNIQUE {
            // order of unique entries does not depend on address
            if let Some(e) = self.entries.get_mut(pos) {
                e.addr = new_addr;
            }
        } else {
            let mut e = self.entries.remove(pos);
            e.addr = new_addr;
            self.entries.insert(e);
        }
        true
    }

    #[inline]
    fn exists(&self, key: &[Value], addr: u64) -> bool {
        self.entries.find_exact(key, addr).is_some()
    }

    #[inline]
    fn has_key(&self, key: &[Value]) -> bool {
        self.entries
            .get(self.entries.lower_bound(key))
            .map(|e| compare_prefix(&e.key, key) == Ordering::Equal)
            .unwrap_or(false)
    }

    #[inline]
    fn size(&self) -> usize {
        self.entries.len
    }

    fn move_to_key(&self, key: &[Value], cursor: &mut IndexCursor) -> bool {
        cursor.reset(true);
        cursor.pos = self.entries.lower_bound(key);
        cursor.key = Some(key.iter().cloned().collect());
        self.entries
            .get(cursor.pos)
            .map(|e| compare_prefix(&e.key, key) == Ordering::Equal)
            .unwrap_or(false)
    }

    fn next_value_at_key(&self, cursor: &mut IndexCursor) -> Option<u64> {
        let e = self.entries.get(cursor.pos)?;
        match &cursor.key {
            Some(key) if compare_prefix(&e.key, key) == Ordering::Equal => (),
            _ => return None,
        }
        let addr = e.addr;
        cursor.pos = self.entries.next_pos(cursor.pos);
        Some(addr)
    }

    fn move_to_key_or_greater(&self, key: &[Value], cursor: &mut IndexCursor) {
        cursor.reset(true);
        cursor.pos = self.entries.lower_bound(key);
    }

    fn move_to_greater_than_key(&self, key: &[Value], cursor: &mut IndexCursor) {
        cursor.reset(true);
        cursor.pos = self.entries.upper_bound(key);
    }

    fn move_to_less_than_key(&self, key: &[Value], cursor: &mut IndexCursor) {
        cursor.reset(false);
        cursor.pos = self.entries.lower_bound(key);
    }

    fn move_to_before_prior_entry(&self, cursor: &mut IndexCursor) {
        cursor.forward = false;
        cursor.key = None;
    }

    fn move_to_end(&self, forward: bool, cursor: &mut IndexCursor) {
        cursor.reset(forward);
        cursor.pos = if forward { (0, 0) } else { self.entries.end() };
    }

    fn next_value(&self, cursor: &mut IndexCursor) -> Option<u64> {
        let e = if cursor.forward {
            self.read_forward(cursor)?
        } else {
            self.read_backward(cursor)?
        };
        Some(e.addr)
    }

    fn current_key(&self, cursor: &IndexCursor) -> Option<IndexKey> {
        // key of the entry returned by last call of next_value
        let pos = if cursor.forward {
            self.entries.prev_pos(cursor.pos)?
        } else {
            cursor.pos
        };
        self.entries.get(pos).map(|e| e.key.clone())
    }

    #[inline]
    fn is_ordered(&self) -> bool {
        true
    }

    fn counter_let(&self, key: &[Value], inclusive: bool) -> usize {
        let pos = if inclusive {
            self.entries.upper_bound(key)
        } else {
            self.entries.lower_bound(key)
        };
        self.entries.rank(pos)
    }

    fn counter_get(&self, key: &[Value], inclusive: bool) -> usize {
        self.entries.len - self.counter_let(key, !inclusive)
    }
}
