pub mod hash;
pub mod key;
pub mod tree;

pub use hash::{HashMultiIndex, HashUniqueIndex};
pub use key::{compare_keys, compare_prefix, IndexKey};
pub use tree::{TreeIndex, TreeMultiIndex, TreeUniqueIndex};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tessera_datatype::{Value, ValueType};
use tessera_expr::{ColumnSource, EvalInput, Expr};

/// Contract shared by all index kinds.
/// Lookups never fail on missing keys, they report through return values.
/// Range positioning and rank counting are only meaningful for
/// ordered indexes, calling them on a hash index is a logic error.
pub trait IndexOps {
    /// Adds an entry. Returns false if a unique index already contains
    /// the key or the exact entry already exists.
    fn add_entry(&mut self, key: IndexKey, addr: u64) -> bool;

    fn delete_entry(&mut self, key: &[Value], addr: u64) -> bool;

    /// Points the entry of a moved tuple to its new address.
    fn replace_entry_no_key_change(&mut self, key: &[Value], new_addr: u64, old_addr: u64)
        -> bool;

    fn exists(&self, key: &[Value], addr: u64) -> bool;

    fn has_key(&self, key: &[Value]) -> bool;

    fn size(&self) -> usize;

    /// Positions cursor at the first entry matching key.
    fn move_to_key(&self, key: &[Value], cursor: &mut IndexCursor) -> bool;

    /// Next entry matching the key of last `move_to_key`.
    fn next_value_at_key(&self, cursor: &mut IndexCursor) -> Option<u64>;

    fn next_value(&self, cursor: &mut IndexCursor) -> Option<u64>;

    #[inline]
    fn is_ordered(&self) -> bool {
        false
    }

    fn move_to_key_or_greater(&self, _key: &[Value], _cursor: &mut IndexCursor) {
        fatal!("range scan is not supported by hash index")
    }

    fn move_to_greater_than_key(&self, _key: &[Value], _cursor: &mut IndexCursor) {
        fatal!("range scan is not supported by hash index")
    }

    fn move_to_less_than_key(&self, _key: &[Value], _cursor: &mut IndexCursor) {
        fatal!("range scan is not supported by hash index")
    }

    /// Turns cursor around so that it reads backward from the entry
    /// before its current position.
    fn move_to_before_prior_entry(&self, _cursor: &mut IndexCursor) {
        fatal!("range scan is not supported by hash index")
    }

    fn move_to_end(&self, _forward: bool, _cursor: &mut IndexCursor) {
        fatal!("range scan is not supported by hash index")
    }

    /// Key of the entry last returned by the cursor.
    fn current_key(&self, _cursor: &IndexCursor) -> Option<IndexKey> {
        None
    }

    /// Number of entries whose key is less than (or equal to) search key.
    fn counter_let(&self, _key: &[Value], _inclusive: bool) -> usize {
        fatal!("counting is not supported by hash index")
    }

    /// Number of entries whose key is greater than (or equal to) search key.
    fn counter_get(&self, _key: &[Value], _inclusive: bool) -> usize {
        fatal!("counting is not supported by hash index")
    }
}

/// Cursor state of one index scan, owned by the scanning executor.
#[derive(Debug, Clone)]
pub struct IndexCursor {
    pub(crate) pos: tree::Pos,
    pub(crate) forward: bool,
    pub(crate) key: Option<IndexKey>,
    pub(crate) matches: SmallVec<[u64; 4]>,
    pub(crate) match_idx: usize,
}

impl Default for IndexCursor {
    #[inline]
    fn default() -> Self {
        IndexCursor {
            pos: (0, 0),
            forward: true,
            key: None,
            matches: SmallVec::new(),
            match_idx: 0,
        }
    }
}

impl IndexCursor {
    #[inline]
    pub(crate) fn reset(&mut self, forward: bool) {
        self.pos = (0, 0);
        self.forward = forward;
        self.key = None;
        self.matches.clear();
        self.match_idx = 0;
    }

    #[inline]
    pub(crate) fn next_match(&mut self) -> Option<u64> {
        let a = self.matches.get(self.match_idx).copied()?;
        self.match_idx += 1;
        Some(a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    #[serde(rename = "HASH_TABLE")]
    Hash,
    #[serde(rename = "BALANCED_TREE")]
    Tree,
}

/// Definition of a table index.
#[derive(Debug, Clone)]
pub struct IndexScheme {
    pub name: String,
    pub index_type: IndexType,
    pub unique: bool,
    /// Tree index supports rank counting.
    pub countable: bool,
    /// Indexed columns, used if `exprs` is empty.
    pub columns: Vec<usize>,
    /// Indexed expressions evaluated against the row.
    pub exprs: Vec<Expr>,
    /// Type of each key component.
    pub key_types: Vec<ValueType>,
    /// Whether each key component accepts null.
    pub key_nullable: Vec<bool>,
}

impl IndexScheme {
    #[inline]
    pub fn new(name: impl Into<String>, index_type: IndexType, unique: bool, columns: Vec<usize>) -> Self {
        IndexScheme {
            name: name.into(),
            index_type,
            unique,
            countable: index_type == IndexType::Tree,
            columns,
            exprs: vec![],
            key_types: vec![],
            key_nullable: vec![],
        }
    }

    #[inline]
    pub fn with_exprs(mut self, exprs: Vec<Expr>) -> Self {
        self.exprs = exprs;
        self
    }

    #[inline]
    pub fn key_width(&self) -> usize {
        if self.exprs.is_empty() {
            self.columns.len()
        } else {
            self.exprs.len()
        }
    }
}

enum IndexKind {
    HashUnique(HashUniqueIndex),
    HashMulti(HashMultiIndex),
    TreeUnique(TreeUniqueIndex),
    TreeMulti(TreeMultiIndex),
}

/// TableIndex wraps one index kind selected by its scheme,
/// derives keys from rows and keeps operation counters.
pub struct TableIndex {
    scheme: IndexScheme,
    kind: IndexKind,
    inserts: u64,
    deletes: u64,
    updates: u64,
}

impl TableIndex {
    pub fn new(scheme: IndexScheme) -> Self {
        let kind = match (scheme.index_type, scheme.unique) {
            (IndexType::Hash, true) => IndexKind::HashUnique(HashUniqueIndex::new()),
            (IndexType::Hash, false) => IndexKind::HashMulti(HashMultiIndex::new()),
            (IndexType::Tree, true) => IndexKind::TreeUnique(TreeUniqueIndex::new()),
            (IndexType::Tree, false) => IndexKind::TreeMulti(TreeMultiIndex::new()),
        };
        TableIndex {
            scheme,
            kind,
            inserts: 0,
            deletes: 0,
            updates: 0,
        }
    }

    #[inline]
    fn ops(&self) -> &dyn IndexOps {
        match &self.kind {
            IndexKind::HashUnique(i) => i,
            IndexKind::HashMulti(i) => i,
            IndexKind::TreeUnique(i) => i,
            IndexKind::TreeMulti(i) => i,
        }
    }

    #[inline]
    fn ops_mut(&mut self) -> &mut dyn IndexOps {
        match &mut self.kind {
            IndexKind::HashUnique(i) => i,
            IndexKind::HashMulti(i) => i,
            IndexKind::TreeUnique(i) => i,
            IndexKind::TreeMulti(i) => i,
        }
    }

    #[inline]
    pub fn scheme(&self) -> &IndexScheme {
        &self.scheme
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.scheme.name
    }

    #[inline]
    pub fn is_unique(&self) -> bool {
        self.scheme.unique
    }

    #[inline]
    pub fn is_countable(&self) -> bool {
        self.scheme.countable && self.ops().is_ordered()
    }

    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.ops().is_ordered()
    }

    #[inline]
    pub fn key_types(&self) -> &[ValueType] {
        &self.scheme.key_types
    }

    #[inline]
    pub fn key_width(&self) -> usize {
        self.scheme.key_width()
    }

    /// Whether the key depends on given column.
    pub fn depends_on_column(&self, col: usize) -> bool {
        if self.scheme.exprs.is_empty() {
            self.scheme.columns.contains(&col)
        } else {
            self.scheme.exprs.iter().any(|e| expr_reads_column(e, col))
        }
    }

    /// Derives the key of a row.
    pub fn key_of(&self, row: &dyn ColumnSource) -> Result<IndexKey> {
        if self.scheme.exprs.is_empty() {
            return Ok(self
                .scheme
                .columns
                .iter()
                .map(|c| row.column_value(*c))
                .collect());
        }
        let input = EvalInput::with_outer(&[], row);
        let mut key = IndexKey::new();
        for (i, e) in self.scheme.exprs.iter().enumerate() {
            let v = e.eval(&input)?;
            let v = match self.scheme.key_types.get(i) {
                Some(ty) => v.cast_as(*ty)?,
                None => v,
            };
            key.push(v);
        }
        Ok(key)
    }

    #[inline]
    pub fn add_entry(&mut self, key: IndexKey, addr: u64) -> bool {
        let res = self.ops_mut().add_entry(key, addr);
        if res {
            self.inserts += 1;
        }
        res
    }

    #[inline]
    pub fn delete_entry(&mut self, key: &[Value], addr: u64) -> bool {
        let res = self.ops_mut().delete_entry(key, addr);
        if res {
            self.deletes += 1;
        }
        res
    }

    #[inline]
    pub fn replace_entry_no_key_change(&mut self, key: &[Value], new_addr: u64, old_addr: u64) -> bool {
        let res = self
            .ops_mut()
            .replace_entry_no_key_change(key, new_addr, old_addr);
        if res {
            self.updates += 1;
        }
        res
    }

    #[inline]
    pub fn exists(&self, key: &[Value], addr: u64) -> bool {
        self.ops().exists(key, addr)
    }

    #[inline]
    pub fn has_key(&self, key: &[Value]) -> bool {
        self.ops().has_key(key)
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.ops().size()
    }

    /// Address of the only entry with given key.
    #[inline]
    pub fn unique_matching_tuple(&self, key: &[Value]) -> Option<u64> {
        let mut cursor = IndexCursor::default();
        if self.ops().move_to_key(key, &mut cursor) {
            self.ops().next_value_at_key(&mut cursor)
        } else {
            None
        }
    }

    #[inline]
    pub fn move_to_key(&self, key: &[Value], cursor: &mut IndexCursor) -> bool {
        self.ops().move_to_key(key, cursor)
    }

    #[inline]
    pub fn move_to_key_or_greater(&self, key: &[Value], cursor: &mut IndexCursor) {
        self.ops().move_to_key_or_greater(key, cursor)
    }

    #[inline]
    pub fn move_to_greater_than_key(&self, key: &[Value], cursor: &mut IndexCursor) {
        self.ops().move_to_greater_than_key(key, cursor)
    }

    #[inline]
    pub fn move_to_less_than_key(&self, key: &[Value], cursor: &mut IndexCursor) {
        self.ops().move_to_less_than_key(key, cursor)
    }

    #[inline]
    pub fn move_to_before_prior_entry(&self, cursor: &mut IndexCursor) {
        self.ops().move_to_before_prior_entry(cursor)
    }

    #[inline]
    pub fn move_to_end(&self, forward: bool, cursor: &mut IndexCursor) {
        self.ops().move_to_end(forward, cursor)
    }

    #[inline]
    pub fn next_value(&self, cursor: &mut IndexCursor) -> Option<u64> {
        self.ops().next_value(cursor)
    }

    #[inline]
    pub fn next_value_at_key(&self, cursor: &mut IndexCursor) -> Option<u64> {
        self.ops().next_value_at_key(cursor)
    }

    #[inline]
    pub fn current_key(&self, cursor: &IndexCursor) -> Option<IndexKey> {
        self.ops().current_key(cursor)
    }

    #[inline]
    pub fn counter_let(&self, key: &[Value], inclusive: bool) -> usize {
        self.ops().counter_let(key, inclusive)
    }

    #[inline]
    pub fn counter_get(&self, key: &[Value], inclusive: bool) -> usize {
        self.ops().counter_get(key, inclusive)
    }

    /// Insert, delete and update counts since creation.
    #[inline]
    pub fn stats(&self) -> (u64, u64, u64) {
        (self.inserts, self.deletes, self.updates)
    }
}

fn expr_reads_column(e: &Expr, col: usize) -> bool {
    use tessera_expr::ExprKind;
    match &e.kind {
        ExprKind::TupleValue { column_idx, .. } => *column_idx == col,
        ExprKind::TupleAddress | ExprKind::Constant(_) | ExprKind::Parameter(_) => false,
        ExprKind::Compare { lhs, rhs, .. }
        | ExprKind::Conj { lhs, rhs, .. }
        | ExprKind::Arith { lhs, rhs, .. } => {
            expr_reads_column(lhs, col) || expr_reads_column(rhs, col)
        }
        ExprKind::Not(arg) | ExprKind::IsNull(arg) | ExprKind::Cast(arg) => {
            expr_reads_column(arg, col)
        }
    }
}
