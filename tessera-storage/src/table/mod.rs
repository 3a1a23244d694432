mod block;
mod temp;
mod undo_action;

pub use block::BUCKET_COUNT;
pub use temp::{RowSet, TempTable, TEMP_TABLE_BLOCK_SIZE};
pub use undo_action::{DeleteUndo, InsertUndo, UpdateUndo};

use crate::big_alloc::BigMemoryAllocator;
use crate::config::StorageConfig;
use crate::error::{ConstraintKind, Error, Result};
use crate::index::{IndexKey, IndexScheme, TableIndex};
use crate::object::{ObjectAllocator, ObjectStore};
use crate::pool::PoolArena;
use crate::schema::TupleSchema;
use crate::tuple::{object_refs, TableTuple, TupleFlags, TupleMut, TUPLE_HEADER_SIZE};
use crate::undo::UndoQuantum;
use block::{BlockMemory, TupleBlock};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use tessera_datatype::Value;

/// Address of a row in persistent storage. Zero is never a valid address.
pub type TupleAddress = u64;

/// Compaction starts when this many blocks worth of slots are free.
const COMPACTION_FREE_BLOCKS: usize = 3;
const COMPACTION_MAX_LOAD: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub u32);

/// PersistentTable stores rows in fixed-size blocks and keeps
/// its indexes in sync with every mutation.
///
/// Row storage is addressed by [`TupleAddress`]. An address stays valid
/// until the row is deleted or the table is compacted, compaction only
/// runs when no undo action of this table is pending.
pub struct PersistentTable {
    id: TableId,
    name: String,
    column_names: Vec<String>,
    schema: TupleSchema,
    indexes: Vec<TableIndex>,
    primary_key: Option<usize>,
    partition_column: Option<usize>,
    tuple_limit: Option<usize>,
    blocks: BTreeMap<u64, TupleBlock>,
    with_space: BTreeSet<u64>,
    buckets: Vec<BTreeSet<u64>>,
    block_size: usize,
    tuple_length: usize,
    tuples_per_block: usize,
    next_base: u64,
    active_tuples: usize,
    pending_delete: usize,
    /// Undo actions registered but neither undone nor released.
    pending_undo: usize,
    big_alloc: Option<&'static BigMemoryAllocator>,
    compaction_enabled: bool,
}

impl PersistentTable {
    pub fn new(
        id: TableId,
        name: impl Into<String>,
        column_names: Vec<String>,
        schema: TupleSchema,
        config: &StorageConfig,
    ) -> Self {
        let name = name.into();
        debug_assert_eq!(column_names.len(), schema.column_count());
        let tuple_length = TUPLE_HEADER_SIZE + schema.tuple_length();
        let block_size = config.table_block_size.max(tuple_length);
        let big_alloc = if config.use_big_allocator {
            match BigMemoryAllocator::global() {
                Ok(alloc) if alloc.block_size() == block_size => Some(alloc),
                Ok(alloc) => {
                    log::warn!(
                        "table {} block size {} differs from big block size {}, use pooled blocks",
                        name,
                        block_size,
                        alloc.block_size()
                    );
                    None
                }
                Err(e) => {
                    log::warn!("big memory allocator unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };
        PersistentTable {
            id,
            name,
            column_names,
            schema,
            indexes: vec![],
            primary_key: None,
            partition_column: None,
            tuple_limit: config.default_tuple_limit,
            blocks: BTreeMap::new(),
            with_space: BTreeSet::new(),
            buckets: vec![BTreeSet::new(); BUCKET_COUNT],
            block_size,
            tuple_length,
            tuples_per_block: block_size / tuple_length,
            next_base: block_size as u64,
            active_tuples: 0,
            pending_delete: 0,
            pending_undo: 0,
            big_alloc,
            compaction_enabled: config.compaction_enabled,
        }
    }

    #[inline]
    pub fn id(&self) -> TableId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[inline]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }

    #[inline]
    pub fn schema(&self) -> &TupleSchema {
        &self.schema
    }

    #[inline]
    pub fn indexes(&self) -> &[TableIndex] {
        &self.indexes
    }

    #[inline]
    pub fn index(&self, name: &str) -> Option<&TableIndex> {
        self.indexes.iter().find(|i| i.name() == name)
    }

    #[inline]
    pub fn primary_key_index(&self) -> Option<&TableIndex> {
        self.primary_key.map(|i| &self.indexes[i])
    }

    #[inline]
    pub fn partition_column(&self) -> Option<usize> {
        self.partition_column
    }

    #[inline]
    pub fn set_partition_column(&mut self, col: Option<usize>) {
        self.partition_column = col;
    }

    #[inline]
    pub fn tuple_limit(&self) -> Option<usize> {
        self.tuple_limit
    }

    #[inline]
    pub fn set_tuple_limit(&mut self, limit: Option<usize>) {
        self.tuple_limit = limit;
    }

    #[inline]
    pub fn active_tuple_count(&self) -> usize {
        self.active_tuples
    }

    #[inline]
    pub fn pending_delete_count(&self) -> usize {
        self.pending_delete
    }

    #[inline]
    pub fn pending_undo_count(&self) -> usize {
        self.pending_undo
    }

    /// Slots of all blocks, occupied or not.
    #[inline]
    pub fn allocated_tuple_count(&self) -> usize {
        self.blocks.len() * self.tuples_per_block
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn tuples_per_block(&self) -> usize {
        self.tuples_per_block
    }

    /// Adds an index and fills it with existing rows.
    /// Key types are derived from the schema if the scheme leaves them empty.
    pub fn add_index(&mut self, mut scheme: IndexScheme, objects: &dyn ObjectStore) -> Result<()> {
        if self.index(&scheme.name).is_some() {
            return Err(Error::InvalidArgument);
        }
        if scheme.exprs.is_empty() {
            if scheme
                .columns
                .iter()
                .any(|c| *c >= self.schema.column_count())
            {
                return Err(Error::InvalidArgument);
            }
            scheme.key_types = scheme
                .columns
                .iter()
                .map(|c| self.schema.column_type(*c))
                .collect();
            scheme.key_nullable = scheme
                .columns
                .iter()
                .map(|c| self.schema.column_allow_null(*c))
                .collect();
        } else if scheme.key_types.is_empty() {
            scheme.key_types = scheme.exprs.iter().map(|e| e.ty).collect();
            scheme.key_nullable = vec![true; scheme.exprs.len()];
        }
        let mut index = TableIndex::new(scheme);
        let addrs: Vec<_> = self.iter_addresses().collect();
        for addr in addrs {
            let key = index.key_of(&self.tuple_at(addr, objects))?;
            if !index.add_entry(key, addr) {
                return Err(Error::constraint(
                    ConstraintKind::Unique,
                    &self.name,
                    format!("existing rows violate unique index {}", index.name()),
                ));
            }
        }
        self.indexes.push(index);
        Ok(())
    }

    /// Marks an existing unique index as primary key.
    pub fn set_primary_key(&mut self, index_name: &str) -> Result<()> {
        match self.indexes.iter().position(|i| i.name() == index_name) {
            Some(pos) if self.indexes[pos].is_unique() => {
                self.primary_key = Some(pos);
                Ok(())
            }
            _ => Err(Error::InvalidArgument),
        }
    }

    /// Positions of indexes whose keys depend on any of given columns.
    pub fn indexes_to_update(&self, columns: &[usize]) -> Vec<usize> {
        self.indexes
            .iter()
            .enumerate()
            .filter(|(_, idx)| columns.iter().any(|c| idx.depends_on_column(*c)))
            .map(|(i, _)| i)
            .collect()
    }

    /// Inserts a row and all its index entries.
    /// A failed insert leaves neither a row nor any index entry behind.
    pub fn insert_tuple(
        &mut self,
        values: &[Value],
        arena: &mut PoolArena,
        undo: Option<&mut UndoQuantum>,
    ) -> Result<TupleAddress> {
        let row = self.prepare_row(values)?;
        if let Some(limit) = self.tuple_limit {
            if self.active_tuples >= limit {
                return Err(Error::constraint(
                    ConstraintKind::RowLimit,
                    &self.name,
                    format!(
                        "Table {} exceeds table maximum row count {}",
                        self.name, limit
                    ),
                ));
            }
        }
        let keys = self.index_keys(&row)?;
        for (idx, key) in self.indexes.iter().zip(&keys) {
            if idx.is_unique() && idx.has_key(key) {
                return Err(self.unique_violation(idx, key));
            }
        }
        let addr = self.allocate_tuple(arena)?;
        let data = row_mut(&mut self.blocks, addr);
        let mut tuple = TupleMut::new(data, &self.schema);
        if let Err(e) = tuple.set_values(&row, arena) {
            self.free_tuple(addr, arena);
            return Err(e);
        }
        tuple.set_flags(TupleFlags::ACTIVE);
        for (idx, key) in self.indexes.iter_mut().zip(keys) {
            if !idx.add_entry(key, addr) {
                fatal!(
                    "failed to insert into index {} of table {}",
                    idx.name(),
                    self.name
                )
            }
        }
        self.active_tuples += 1;
        if let Some(q) = undo {
            q.register_undo_action(Box::new(InsertUndo {
                table: self.id,
                addr,
            }));
            self.pending_undo += 1;
            q.register_interest(self.id);
        }
        Ok(addr)
    }

    /// Replaces all columns of an active row.
    ///
    /// `indexes_to_update` narrows the indexes that are checked for key
    /// change, all indexes are checked if it is None.
    pub fn update_tuple(
        &mut self,
        addr: TupleAddress,
        values: &[Value],
        indexes_to_update: Option<&[usize]>,
        arena: &mut PoolArena,
        undo: Option<&mut UndoQuantum>,
    ) -> Result<()> {
        let row = self.prepare_row(values)?;
        let old_bytes: Box<[u8]> = Box::from(self.active_row(addr)?);
        let old_values = TableTuple::new(&old_bytes, &self.schema, &*arena).values();
        let candidates: Vec<usize> = match indexes_to_update {
            Some(positions) => positions.to_vec(),
            None => (0..self.indexes.len()).collect(),
        };
        let mut changed: Vec<(usize, IndexKey, IndexKey)> = vec![];
        for pos in candidates {
            let idx = &self.indexes[pos];
            let old_key = idx.key_of(&old_values)?;
            let new_key = idx.key_of(&row)?;
            if old_key != new_key {
                if idx.is_unique() && idx.has_key(&new_key) {
                    return Err(self.unique_violation(idx, &new_key));
                }
                changed.push((pos, old_key, new_key));
            }
        }
        let mut new_bytes = old_bytes.clone();
        {
            let mut tuple = TupleMut::new(&mut new_bytes, &self.schema);
            for (i, v) in row.iter().enumerate() {
                // unchanged out-of-line value keeps its object
                if !self.schema.column(i).inlined && old_values[i] == *v {
                    continue;
                }
                tuple.set_value(i, v, arena)?;
            }
        }
        for (pos, old_key, _) in &changed {
            if !self.indexes[*pos].delete_entry(old_key, addr) {
                fatal!(
                    "failed to delete from index {} of table {}",
                    self.indexes[*pos].name(),
                    self.name
                )
            }
        }
        let revert_indexes = !changed.is_empty();
        for (pos, _, new_key) in changed {
            if !self.indexes[pos].add_entry(new_key, addr) {
                fatal!(
                    "failed to update index {} of table {}",
                    self.indexes[pos].name(),
                    self.name
                )
            }
        }
        row_mut(&mut self.blocks, addr).copy_from_slice(&new_bytes);
        match undo {
            Some(q) => {
                q.register_undo_action(Box::new(UpdateUndo {
                    table: self.id,
                    addr,
                    old_bytes,
                    new_bytes,
                    revert_indexes,
                }));
                self.pending_undo += 1;
                q.register_interest(self.id);
            }
            None => self.release_update(&old_bytes, &new_bytes, arena),
        }
        Ok(())
    }

    /// Deletes an active row. Index entries are removed immediately,
    /// storage is kept until the undo quantum is released.
    pub fn delete_tuple(
        &mut self,
        addr: TupleAddress,
        arena: &mut PoolArena,
        undo: Option<&mut UndoQuantum>,
    ) -> Result<()> {
        self.active_row(addr)?;
        self.delete_from_indexes(addr, arena);
        match undo {
            Some(q) => {
                TupleMut::new(row_mut(&mut self.blocks, addr), &self.schema)
                    .set_flags(TupleFlags::PENDING_DELETE);
                self.active_tuples -= 1;
                self.pending_delete += 1;
                q.register_undo_action(Box::new(DeleteUndo {
                    table: self.id,
                    addr,
                }));
                self.pending_undo += 1;
                q.register_interest(self.id);
            }
            None => self.delete_tuple_storage(addr, arena),
        }
        Ok(())
    }

    /// Deletes every row. Without undo the blocks and indexes are
    /// dropped in bulk.
    pub fn delete_all_tuples(
        &mut self,
        arena: &mut PoolArena,
        undo: Option<&mut UndoQuantum>,
    ) -> Result<()> {
        if let Some(q) = undo {
            let addrs: Vec<_> = self.iter_addresses().collect();
            for addr in addrs {
                self.delete_tuple(addr, arena, Some(&mut *q))?;
            }
            return Ok(());
        }
        if self.pending_undo > 0 {
            fatal!(
                "truncate table {} with {} pending undo actions",
                self.name,
                self.pending_undo
            )
        }
        let bases: Vec<u64> = self.blocks.keys().copied().collect();
        for base in bases {
            if let Some(block) = self.blocks.get_mut(&base) {
                let slots: Vec<usize> = block.active_slots().collect();
                for slot in slots {
                    TupleMut::new(block.row_mut(slot), &self.schema).free_objects(arena);
                }
            }
            self.release_block(base, arena);
        }
        for idx in &mut self.indexes {
            *idx = TableIndex::new(idx.scheme().clone());
        }
        self.active_tuples = 0;
        Ok(())
    }

    /// Finds the stored row equal to given values, through the
    /// primary key if there is one.
    pub fn lookup_tuple(&self, values: &[Value], objects: &dyn ObjectStore) -> Result<Option<TupleAddress>> {
        let row = self.cast_row(values)?;
        if let Some(pk) = self.primary_key_index() {
            let key = pk.key_of(&row)?;
            return Ok(pk.unique_matching_tuple(&key).filter(|addr| {
                self.tuple_at(*addr, objects).values() == row
            }));
        }
        Ok(self
            .iter_addresses()
            .find(|addr| self.tuple_at(*addr, objects).values() == row))
    }

    /// Active row at given address.
    #[inline]
    pub fn tuple<'a>(&'a self, addr: TupleAddress, objects: &'a dyn ObjectStore) -> Option<TableTuple<'a>> {
        let t = self.tuple_at_checked(addr, objects)?;
        if t.is_active() {
            Some(t)
        } else {
            None
        }
    }

    /// Addresses of active rows in block order.
    #[inline]
    pub fn iter_addresses(&self) -> impl Iterator<Item = TupleAddress> + '_ {
        self.blocks
            .values()
            .flat_map(|b| b.active_slots().map(move |s| b.address_of(s)))
    }

    #[inline]
    pub fn tuples<'a>(&'a self, objects: &'a dyn ObjectStore) -> impl Iterator<Item = TableTuple<'a>> + 'a {
        self.iter_addresses()
            .map(move |addr| self.tuple_at(addr, objects))
    }

    /// Whether enough slots are free to be worth compacting.
    pub fn compaction_predicate(&self) -> bool {
        let allocated = self.allocated_tuple_count();
        if allocated == 0 {
            return false;
        }
        let used = self.active_tuples + self.pending_delete;
        allocated - used > COMPACTION_FREE_BLOCKS * self.tuples_per_block
            && (used as f64 / allocated as f64) < COMPACTION_MAX_LOAD
    }

    /// Called after an undo quantum that touched this table is released.
    pub fn notify_quantum_release(&mut self, arena: &mut PoolArena, allow_compaction: bool) {
        if self.compaction_enabled && allow_compaction && self.compaction_predicate() {
            self.do_forced_compaction(arena);
        }
    }

    /// Merges sparse blocks by moving every row of the lightest block into
    /// the heaviest block with space, until compaction is no longer worth it.
    /// Returns number of moved rows.
    /// Nothing is moved while undo actions of this table are pending,
    /// they refer to rows by address.
    pub fn do_forced_compaction(&mut self, arena: &mut PoolArena) -> usize {
        if self.pending_undo > 0 {
            log::debug!(
                "skip compaction of table {} with {} pending undo actions",
                self.name,
                self.pending_undo
            );
            return 0;
        }
        let blocks_before = self.blocks.len();
        let mut moved = 0;
        while self.compaction_predicate() {
            let (src, dst) = match self.compaction_pair() {
                Some(pair) => pair,
                None => break,
            };
            let slots: Vec<usize> = match self.blocks.get(&src) {
                Some(b) => b.active_slots().collect(),
                None => break,
            };
            for slot in slots {
                if !self.blocks.get(&dst).map_or(false, TupleBlock::has_space) {
                    break;
                }
                self.move_tuple(src, slot, dst, arena);
                moved += 1;
            }
            self.update_block_state(src);
            self.update_block_state(dst);
            if self.blocks.get(&src).map_or(false, TupleBlock::is_empty) {
                self.release_block(src, arena);
            }
        }
        log::debug!(
            "compacted table {}: moved {} tuples, blocks {} -> {}",
            self.name,
            moved,
            blocks_before,
            self.blocks.len()
        );
        moved
    }

    pub(crate) fn undo_insert(&mut self, addr: TupleAddress, arena: &mut PoolArena) {
        if self.active_row(addr).is_err() {
            fatal!("undo insert of inactive tuple {} in table {}", addr, self.name)
        }
        self.undo_action_done();
        self.delete_from_indexes(addr, arena);
        self.delete_tuple_storage(addr, arena);
    }

    pub(crate) fn undo_delete(&mut self, addr: TupleAddress, objects: &dyn ObjectStore) {
        let flags = TableTuple::new(row_of(&self.blocks, addr), &self.schema, objects).flags();
        if !flags.contains(TupleFlags::PENDING_DELETE) {
            fatal!("undo delete of tuple {} not pending delete", addr)
        }
        self.undo_action_done();
        TupleMut::new(row_mut(&mut self.blocks, addr), &self.schema).set_flags(TupleFlags::ACTIVE);
        self.pending_delete -= 1;
        self.active_tuples += 1;
        let keys = match self.index_keys_at(addr, objects) {
            Ok(keys) => keys,
            Err(e) => fatal!("failed to derive index key on undo delete: {}", e),
        };
        for (idx, key) in self.indexes.iter_mut().zip(keys) {
            if !idx.add_entry(key, addr) {
                fatal!("failed to restore entry of index {}", idx.name())
            }
        }
    }

    /// Release of an insert or update keeps the row where it is.
    #[inline]
    pub(crate) fn release_in_place(&mut self) {
        self.undo_action_done();
    }

    pub(crate) fn release_delete(&mut self, addr: TupleAddress, arena: &mut PoolArena) {
        self.undo_action_done();
        self.delete_tuple_storage(addr, arena);
    }

    pub(crate) fn undo_update(
        &mut self,
        addr: TupleAddress,
        old_bytes: &[u8],
        new_bytes: &[u8],
        revert_indexes: bool,
        arena: &mut PoolArena,
    ) {
        self.undo_action_done();
        if revert_indexes {
            for idx in &mut self.indexes {
                let (old_key, new_key) = {
                    let old = TableTuple::new(old_bytes, &self.schema, &*arena).with_address(addr);
                    let new = TableTuple::new(new_bytes, &self.schema, &*arena).with_address(addr);
                    match (idx.key_of(&old), idx.key_of(&new)) {
                        (Ok(o), Ok(n)) => (o, n),
                        _ => fatal!("failed to derive index key on undo update"),
                    }
                };
                if old_key != new_key
                    && (!idx.delete_entry(&new_key, addr) || !idx.add_entry(old_key, addr))
                {
                    fatal!("failed to revert entry of index {}", idx.name())
                }
            }
        }
        free_unshared_objects(new_bytes, old_bytes, &self.schema, arena);
        row_mut(&mut self.blocks, addr).copy_from_slice(old_bytes);
    }

    pub(crate) fn release_update(&mut self, old_bytes: &[u8], new_bytes: &[u8], arena: &mut PoolArena) {
        free_unshared_objects(old_bytes, new_bytes, &self.schema, arena);
    }

    fn undo_action_done(&mut self) {
        match self.pending_undo.checked_sub(1) {
            Some(n) => self.pending_undo = n,
            None => fatal!("no pending undo action in table {}", self.name),
        }
    }

    /// Casts and checks values against columns.
    fn prepare_row(&self, values: &[Value]) -> Result<Vec<Value>> {
        let row = self.cast_row(values)?;
        for (i, v) in row.iter().enumerate() {
            if v.is_null() && !self.schema.column_allow_null(i) {
                return Err(Error::constraint(
                    ConstraintKind::NotNull,
                    &self.name,
                    format!("column {} is not nullable", self.column_names[i]),
                ));
            }
        }
        Ok(row)
    }

    fn cast_row(&self, values: &[Value]) -> Result<Vec<Value>> {
        if values.len() != self.schema.column_count() {
            return Err(Error::InvalidArgument);
        }
        let mut row = Vec::with_capacity(values.len());
        for (col, v) in self.schema.columns().iter().zip(values) {
            let v = v.cast_as(col.ty)?;
            v.check_object_length(col.length as usize)?;
            row.push(v);
        }
        Ok(row)
    }

    fn unique_violation(&self, idx: &TableIndex, key: &[Value]) -> Error {
        let key: Vec<String> = key.iter().map(|v| v.to_string()).collect();
        Error::constraint(
            ConstraintKind::Unique,
            &self.name,
            format!("duplicate key ({}) in index {}", key.join(", "), idx.name()),
        )
    }

    fn index_keys(&self, row: &Vec<Value>) -> Result<SmallVec<[IndexKey; 4]>> {
        self.indexes.iter().map(|idx| idx.key_of(row)).collect()
    }

    fn index_keys_at(&self, addr: TupleAddress, objects: &dyn ObjectStore) -> Result<SmallVec<[IndexKey; 4]>> {
        let t = self.tuple_at(addr, objects);
        self.indexes.iter().map(|idx| idx.key_of(&t)).collect()
    }

    fn delete_from_indexes(&mut self, addr: TupleAddress, objects: &dyn ObjectStore) {
        let keys = match self.index_keys_at(addr, objects) {
            Ok(keys) => keys,
            Err(e) => fatal!("failed to derive index key of stored tuple: {}", e),
        };
        for (idx, key) in self.indexes.iter_mut().zip(keys) {
            if !idx.delete_entry(&key, addr) {
                fatal!(
                    "failed to delete tuple {} from index {} of table {}",
                    addr,
                    idx.name(),
                    self.name
                )
            }
        }
    }

    /// Returns row bytes if the row is active.
    fn active_row(&self, addr: TupleAddress) -> Result<&[u8]> {
        let (base, slot) = self.locate(addr).ok_or(Error::TupleNotFound)?;
        let block = &self.blocks[&base];
        if block.flags(slot).contains(TupleFlags::ACTIVE) {
            Ok(block.row(slot))
        } else {
            Err(Error::TupleNotFound)
        }
    }

    #[inline]
    fn tuple_at<'a>(&'a self, addr: TupleAddress, objects: &'a dyn ObjectStore) -> TableTuple<'a> {
        TableTuple::new(row_of(&self.blocks, addr), &self.schema, objects).with_address(addr)
    }

    #[inline]
    fn tuple_at_checked<'a>(&'a self, addr: TupleAddress, objects: &'a dyn ObjectStore) -> Option<TableTuple<'a>> {
        let (base, slot) = self.locate(addr)?;
        let row = self.blocks[&base].row(slot);
        Some(TableTuple::new(row, &self.schema, objects).with_address(addr))
    }

    #[inline]
    fn locate(&self, addr: TupleAddress) -> Option<(u64, usize)> {
        let (base, block) = self.blocks.range(..=addr).next_back()?;
        if block.contains(addr) && (addr - base) as usize % self.tuple_length == 0 {
            Some((*base, block.slot_of(addr)))
        } else {
            None
        }
    }

    /// Frees objects and the slot of a row, and the block if it becomes empty.
    fn delete_tuple_storage(&mut self, addr: TupleAddress, arena: &mut PoolArena) {
        let (base, slot) = match self.locate(addr) {
            Some(pos) => pos,
            None => fatal!("tuple {} not found in table {}", addr, self.name),
        };
        let block = match self.blocks.get_mut(&base) {
            Some(b) => b,
            None => fatal!("block {} not found in table {}", base, self.name),
        };
        let flags = block.flags(slot);
        if flags.contains(TupleFlags::PENDING_DELETE) {
            self.pending_delete -= 1;
        } else if flags.contains(TupleFlags::ACTIVE) {
            self.active_tuples -= 1;
        } else {
            fatal!("delete of free slot {} in table {}", addr, self.name)
        }
        TupleMut::new(block.row_mut(slot), &self.schema).free_objects(arena);
        block.free_slot(slot);
        if block.is_empty() {
            self.release_block(base, arena);
        } else {
            self.update_block_state(base);
        }
    }

    /// Returns a slot without touching counters, for failed inserts.
    fn free_tuple(&mut self, addr: TupleAddress, arena: &mut PoolArena) {
        if let Some((base, slot)) = self.locate(addr) {
            if let Some(block) = self.blocks.get_mut(&base) {
                TupleMut::new(block.row_mut(slot), &self.schema).free_objects(arena);
                block.free_slot(slot);
                if block.is_empty() {
                    self.release_block(base, arena);
                } else {
                    self.update_block_state(base);
                }
            }
        }
    }

    fn allocate_tuple(&mut self, arena: &mut PoolArena) -> Result<TupleAddress> {
        let base = match self.with_space.iter().next() {
            Some(base) => *base,
            None => self.allocate_block(arena)?,
        };
        let block = match self.blocks.get_mut(&base) {
            Some(b) => b,
            None => fatal!("block {} not found in table {}", base, self.name),
        };
        let slot = match block.allocate_slot() {
            Some(slot) => slot,
            None => fatal!("block {} with space has no free slot", base),
        };
        let addr = block.address_of(slot);
        self.update_block_state(base);
        Ok(addr)
    }

    fn allocate_block(&mut self, arena: &mut PoolArena) -> Result<u64> {
        let mem = match self.big_alloc {
            Some(alloc) => BlockMemory::Big(alloc.allocate()?),
            None => BlockMemory::Pooled(arena.allocate_object(self.block_size)),
        };
        let base = self.next_base;
        self.next_base += self.block_size as u64;
        self.blocks
            .insert(base, TupleBlock::new(base, mem, self.tuple_length));
        self.update_block_state(base);
        Ok(base)
    }

    fn release_block(&mut self, base: u64, arena: &mut PoolArena) {
        self.with_space.remove(&base);
        if let Some(block) = self.blocks.remove(&base) {
            if let Some(bucket) = block.bucket {
                self.buckets[bucket].remove(&base);
            }
            match block.mem {
                BlockMemory::Pooled(mem) => arena.free_object(self.block_size, mem),
                BlockMemory::Big(mem) => drop(mem),
            }
        }
    }

    /// Refreshes with-space set and bucket of a block after its
    /// occupancy changed.
    fn update_block_state(&mut self, base: u64) {
        let block = match self.blocks.get_mut(&base) {
            Some(b) => b,
            None => return,
        };
        if block.has_space() {
            self.with_space.insert(base);
        } else {
            self.with_space.remove(&base);
        }
        let bucket = block.compute_bucket();
        if bucket != block.bucket {
            if let Some(old) = block.bucket {
                self.buckets[old].remove(&base);
            }
            if let Some(new) = bucket {
                self.buckets[new].insert(base);
            }
            block.bucket = bucket;
        }
    }

    /// Lightest block as source and heaviest other block with space as target.
    fn compaction_pair(&self) -> Option<(u64, u64)> {
        let src = self.buckets.iter().find_map(|b| b.iter().next().copied())?;
        let dst = self
            .buckets
            .iter()
            .rev()
            .find_map(|b| b.iter().find(|base| **base != src).copied())?;
        Some((src, dst))
    }

    fn move_tuple(&mut self, src: u64, slot: usize, dst: u64, arena: &PoolArena) {
        let (old_addr, bytes) = match self.blocks.get(&src) {
            Some(b) => (b.address_of(slot), Box::<[u8]>::from(b.row(slot))),
            None => fatal!("source block {} not found", src),
        };
        let block = match self.blocks.get_mut(&dst) {
            Some(b) => b,
            None => fatal!("target block {} not found", dst),
        };
        let new_slot = match block.allocate_slot() {
            Some(s) => s,
            None => fatal!("target block {} is full", dst),
        };
        let new_addr = block.address_of(new_slot);
        block.row_mut(new_slot).copy_from_slice(&bytes);
        let tuple = TableTuple::new(&bytes, &self.schema, arena);
        for idx in &mut self.indexes {
            let key = match idx.key_of(&tuple) {
                Ok(key) => key,
                Err(e) => fatal!("failed to derive index key on compaction: {}", e),
            };
            if !idx.replace_entry_no_key_change(&key, new_addr, old_addr) {
                fatal!("failed to relocate entry of index {}", idx.name())
            }
        }
        if let Some(b) = self.blocks.get_mut(&src) {
            // objects now belong to the moved row
            b.free_slot(slot);
        }
    }
}

#[inline]
fn row_of(blocks: &BTreeMap<u64, TupleBlock>, addr: TupleAddress) -> &[u8] {
    match blocks.range(..=addr).next_back() {
        Some((_, b)) if b.contains(addr) => b.row(b.slot_of(addr)),
        _ => fatal!("invalid tuple address {}", addr),
    }
}

#[inline]
fn row_mut(blocks: &mut BTreeMap<u64, TupleBlock>, addr: TupleAddress) -> &mut [u8] {
    match blocks.range_mut(..=addr).next_back() {
        Some((_, b)) if b.contains(addr) => {
            let slot = b.slot_of(addr);
            b.row_mut(slot)
        }
        _ => fatal!("invalid tuple address {}", addr),
    }
}

/// Destroys objects referenced by `row` but not by `other`.
fn free_unshared_objects(row: &[u8], other: &[u8], schema: &TupleSchema, arena: &mut PoolArena) {
    let keep = object_refs(other, schema);
    for r in object_refs(row, schema) {
        if !keep.contains(&r) {
            arena.destroy_object(r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexType;
    use crate::schema::ColumnSpec;
    use crate::catalog::Catalog;
    use crate::undo::{UndoEnv, UndoQuantum};
    use tessera_datatype::ValueType;
    use tessera_expr::ColumnSource;

    const SMALL_BLOCK: usize = 1024;

    fn small_config() -> StorageConfig {
        StorageConfig {
            table_block_size: SMALL_BLOCK,
            ..Default::default()
        }
    }

    fn test_table(arena: &PoolArena) -> PersistentTable {
        let schema = TupleSchema::new(&[
            ColumnSpec::fixed(ValueType::Integer).not_null(),
            ColumnSpec::new(ValueType::Varchar, 100, true),
            ColumnSpec::fixed(ValueType::BigInt),
        ]);
        let mut table = PersistentTable::new(
            TableId(1),
            "T1",
            vec!["ID".into(), "NAME".into(), "V".into()],
            schema,
            &small_config(),
        );
        table
            .add_index(IndexScheme::new("PK", IndexType::Hash, true, vec![0]), arena)
            .unwrap();
        table
            .add_index(IndexScheme::new("IDX_V", IndexType::Tree, false, vec![2]), arena)
            .unwrap();
        table.set_primary_key("PK").unwrap();
        table
    }

    fn row(id: i32, name: &str, v: i64) -> Vec<Value> {
        vec![Value::Integer(id), Value::varchar(name), Value::BigInt(v)]
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut arena = PoolArena::new();
        let mut table = test_table(&arena);
        let a1 = table.insert_tuple(&row(1, "a", 10), &mut arena, None).unwrap();
        let a2 = table.insert_tuple(&row(2, "b", 10), &mut arena, None).unwrap();
        assert_ne!(a1, 0);
        assert_eq!(table.active_tuple_count(), 2);
        assert_eq!(arena.object_count(), 2);
        assert_eq!(table.tuple(a2, &arena).unwrap().values(), row(2, "b", 10));
        assert_eq!(table.lookup_tuple(&row(1, "a", 10), &arena).unwrap(), Some(a1));
        assert_eq!(table.lookup_tuple(&row(1, "x", 10), &arena).unwrap(), None);
        assert_eq!(table.index("IDX_V").unwrap().size(), 2);
        let all: Vec<_> = table.tuples(&arena).map(|t| t.value(0)).collect();
        assert_eq!(all, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_failed_insert_not_indexed() {
        let mut arena = PoolArena::new();
        let mut table = test_table(&arena);
        table.insert_tuple(&row(1, "a", 10), &mut arena, None).unwrap();
        let err = table
            .insert_tuple(&row(1, "b", 20), &mut arena, None)
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
        let err = table
            .insert_tuple(&[Value::Null, Value::Null, Value::BigInt(30)], &mut arena, None)
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::NotNull));
        assert_eq!(table.active_tuple_count(), 1);
        assert_eq!(table.index("IDX_V").unwrap().size(), 1);
        assert!(!table.index("IDX_V").unwrap().has_key(&[Value::BigInt(20)]));
        assert_eq!(arena.object_count(), 1);
    }

    #[test]
    fn test_tuple_limit() {
        let mut arena = PoolArena::new();
        let mut table = test_table(&arena);
        table.set_tuple_limit(Some(1));
        table.insert_tuple(&row(1, "a", 10), &mut arena, None).unwrap();
        let err = table
            .insert_tuple(&row(2, "b", 10), &mut arena, None)
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::RowLimit));
        assert!(err.to_string().contains("exceeds table maximum row count 1"));
    }

    #[test]
    fn test_update_changes_indexes() {
        let mut arena = PoolArena::new();
        let mut table = test_table(&arena);
        let a1 = table.insert_tuple(&row(1, "a", 10), &mut arena, None).unwrap();
        table.insert_tuple(&row(2, "b", 20), &mut arena, None).unwrap();
        let err = table
            .update_tuple(a1, &row(2, "a", 10), None, &mut arena, None)
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
        let positions = table.indexes_to_update(&[2]);
        assert_eq!(positions, vec![1]);
        table
            .update_tuple(a1, &row(1, "a", 30), Some(&positions), &mut arena, None)
            .unwrap();
        let idx = table.index("IDX_V").unwrap();
        assert!(!idx.has_key(&[Value::BigInt(10)]));
        assert_eq!(idx.unique_matching_tuple(&[Value::BigInt(30)]), Some(a1));
        // unchanged out-of-line value keeps its object
        assert_eq!(arena.object_count(), 2);
        table
            .update_tuple(a1, &row(1, "changed", 30), None, &mut arena, None)
            .unwrap();
        assert_eq!(arena.object_count(), 2);
        assert_eq!(table.tuple(a1, &arena).unwrap().value(1), Value::varchar("changed"));
    }

    #[test]
    fn test_undo_dml() {
        let mut catalog = Catalog::new(small_config());
        let mut arena = PoolArena::new();
        let id = catalog.register_table(test_table(&arena));
        let table = catalog.table_mut(id).unwrap();
        let a1 = table.insert_tuple(&row(1, "a", 10), &mut arena, None).unwrap();

        let mut q = UndoQuantum::new(1);
        let a2 = table
            .insert_tuple(&row(2, "b", 20), &mut arena, Some(&mut q))
            .unwrap();
        table
            .update_tuple(a1, &row(1, "c", 11), None, &mut arena, Some(&mut q))
            .unwrap();
        table.delete_tuple(a2, &mut arena, Some(&mut q)).unwrap();
        assert_eq!(table.active_tuple_count(), 1);
        assert_eq!(table.pending_delete_count(), 1);
        assert!(table.tuple(a2, &arena).is_none());
        q.undo(&mut UndoEnv {
            catalog: &mut catalog,
            arena: &mut arena,
            allow_compaction: false,
        });
        let table = catalog.table(id).unwrap();
        assert_eq!(table.active_tuple_count(), 1);
        assert_eq!(table.pending_delete_count(), 0);
        assert_eq!(table.tuple(a1, &arena).unwrap().values(), row(1, "a", 10));
        assert!(table.index("IDX_V").unwrap().has_key(&[Value::BigInt(10)]));
        assert!(!table.index("IDX_V").unwrap().has_key(&[Value::BigInt(11)]));
        assert!(!table.index("PK").unwrap().has_key(&[Value::Integer(2)]));
        assert_eq!(arena.object_count(), 1);
    }

    #[test]
    fn test_release_delete_frees_storage() {
        let mut catalog = Catalog::new(small_config());
        let mut arena = PoolArena::new();
        let id = catalog.register_table(test_table(&arena));
        let table = catalog.table_mut(id).unwrap();
        let a1 = table.insert_tuple(&row(1, "a", 10), &mut arena, None).unwrap();
        let mut q = UndoQuantum::new(1);
        table
            .update_tuple(a1, &row(1, "b", 10), None, &mut arena, Some(&mut q))
            .unwrap();
        table.delete_tuple(a1, &mut arena, Some(&mut q)).unwrap();
        assert_eq!(arena.object_count(), 2);
        q.release(&mut UndoEnv {
            catalog: &mut catalog,
            arena: &mut arena,
            allow_compaction: true,
        });
        let table = catalog.table(id).unwrap();
        assert_eq!(table.pending_delete_count(), 0);
        assert_eq!(table.block_count(), 0);
        assert_eq!(arena.object_count(), 0);
    }

    #[test]
    fn test_delete_all_tuples() {
        let mut arena = PoolArena::new();
        let mut table = test_table(&arena);
        for i in 0..100 {
            table
                .insert_tuple(&row(i, "x", i as i64), &mut arena, None)
                .unwrap();
        }
        assert!(table.block_count() > 1);
        table.delete_all_tuples(&mut arena, None).unwrap();
        assert_eq!(table.active_tuple_count(), 0);
        assert_eq!(table.block_count(), 0);
        assert_eq!(table.index("PK").unwrap().size(), 0);
        assert_eq!(arena.object_count(), 0);
        table.insert_tuple(&row(1, "a", 1), &mut arena, None).unwrap();
        assert_eq!(table.active_tuple_count(), 1);
    }

    #[test]
    fn test_compaction() {
        let mut arena = PoolArena::new();
        let mut table = test_table(&arena);
        let n = table.tuples_per_block() as i32 * 8;
        let mut addrs = vec![];
        for i in 0..n {
            addrs.push(
                table
                    .insert_tuple(&row(i, "name", i as i64), &mut arena, None)
                    .unwrap(),
            );
        }
        assert_eq!(table.block_count(), 8);
        // keep every fourth row
        for (i, addr) in addrs.iter().enumerate() {
            if i % 4 != 0 {
                table.delete_tuple(*addr, &mut arena, None).unwrap();
            }
        }
        let remaining = table.active_tuple_count();
        assert!(table.compaction_predicate());
        let moved = table.do_forced_compaction(&mut arena);
        assert!(moved > 0);
        assert!(table.block_count() < 8);
        assert!(!table.compaction_predicate());
        assert_eq!(table.active_tuple_count(), remaining);
        assert_eq!(table.index("PK").unwrap().size(), remaining);
        for t in table.tuples(&arena).collect::<Vec<_>>() {
            let id = t.value(0);
            let addr = t.address().unwrap();
            assert_eq!(table.index("PK").unwrap().unique_matching_tuple(&[id.clone()]), Some(addr));
            assert_eq!(t.value(1), Value::varchar("name"));
        }
    }

    #[test]
    fn test_no_compaction_with_pending_undo() {
        let mut catalog = Catalog::new(small_config());
        let mut arena = PoolArena::new();
        let id = catalog.register_table(test_table(&arena));
        let table = catalog.table_mut(id).unwrap();
        let n = table.tuples_per_block() as i32 * 8;
        let mut addrs = vec![];
        for i in 0..n {
            addrs.push(
                table
                    .insert_tuple(&row(i, "name", i as i64), &mut arena, None)
                    .unwrap(),
            );
        }
        for (i, addr) in addrs.iter().enumerate() {
            if i % 4 != 0 {
                table.delete_tuple(*addr, &mut arena, None).unwrap();
            }
        }
        let mut q = UndoQuantum::new(1);
        for (i, addr) in addrs.iter().enumerate().filter(|(i, _)| i % 4 == 0) {
            let i = i as i32;
            table
                .update_tuple(*addr, &row(i, "name", i as i64 + 1000), None, &mut arena, Some(&mut q))
                .unwrap();
        }
        assert!(table.compaction_predicate());
        assert_eq!(table.pending_undo_count(), n as usize / 4);
        assert_eq!(table.do_forced_compaction(&mut arena), 0);
        assert_eq!(table.block_count(), 8);

        q.undo(&mut UndoEnv {
            catalog: &mut catalog,
            arena: &mut arena,
            allow_compaction: false,
        });
        let table = catalog.table_mut(id).unwrap();
        assert_eq!(table.pending_undo_count(), 0);
        for (i, addr) in addrs.iter().enumerate().filter(|(i, _)| i % 4 == 0) {
            let t = table.tuple(*addr, &arena).unwrap();
            assert_eq!(t.value(2), Value::BigInt(i as i64));
        }
        assert!(!table.index("IDX_V").unwrap().has_key(&[Value::BigInt(1000)]));
        // nothing pending any more
        assert!(table.do_forced_compaction(&mut arena) > 0);
        assert!(table.block_count() < 8);
    }
}
