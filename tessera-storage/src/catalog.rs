use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::index::{IndexScheme, IndexType};
use crate::pool::PoolArena;
use crate::schema::{ColumnSpec, TupleSchema};
use crate::table::{PersistentTable, TableId};
use fnv::FnvHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Definition of one column of a persistent table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(flatten)]
    pub spec: ColumnSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    #[serde(rename = "type")]
    pub index_type: IndexType,
    #[serde(default)]
    pub unique: bool,
    pub columns: Vec<String>,
    /// Defaults to true for tree index.
    #[serde(default)]
    pub countable: Option<bool>,
}

/// Definition of a persistent table, as delivered by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    /// Name of the unique index acting as primary key.
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub partition_column: Option<String>,
    #[serde(default)]
    pub tuple_limit: Option<usize>,
}

/// Catalog owns all persistent tables of one partition.
/// Tables keep creation order.
pub struct Catalog {
    tables: IndexMap<TableId, PersistentTable>,
    names: FnvHashMap<String, TableId>,
    next_id: u32,
    config: StorageConfig,
}

impl Catalog {
    #[inline]
    pub fn new(config: StorageConfig) -> Self {
        Catalog {
            tables: IndexMap::new(),
            names: FnvHashMap::default(),
            next_id: 1,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Creates an empty table with its indexes.
    pub fn create_table(&mut self, def: &TableDef) -> Result<TableId> {
        if self.names.contains_key(&def.name) || def.columns.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let column_names: Vec<String> = def.columns.iter().map(|c| c.name.clone()).collect();
        let column_of = |name: &str| {
            column_names
                .iter()
                .position(|c| c == name)
                .ok_or(Error::InvalidArgument)
        };
        let specs: Vec<ColumnSpec> = def.columns.iter().map(|c| c.spec).collect();
        let mut schemes = Vec::with_capacity(def.indexes.len());
        for idx in &def.indexes {
            let columns = idx
                .columns
                .iter()
                .map(|c| column_of(c.as_str()))
                .collect::<Result<Vec<_>>>()?;
            let mut scheme = IndexScheme::new(idx.name.clone(), idx.index_type, idx.unique, columns);
            if let Some(countable) = idx.countable {
                scheme.countable = countable;
            }
            schemes.push(scheme);
        }
        let partition_column = match &def.partition_column {
            Some(name) => Some(column_of(name.as_str())?),
            None => None,
        };
        let id = TableId(self.next_id);
        let mut table = PersistentTable::new(
            id,
            def.name.clone(),
            column_names.clone(),
            TupleSchema::new(&specs),
            &self.config,
        );
        // new table has no rows to read objects from
        let objects = PoolArena::new();
        for scheme in schemes {
            table.add_index(scheme, &objects)?;
        }
        if let Some(pk) = &def.primary_key {
            table.set_primary_key(pk)?;
        }
        table.set_partition_column(partition_column);
        if def.tuple_limit.is_some() {
            table.set_tuple_limit(def.tuple_limit);
        }
        log::debug!(
            "create table {} id {} with {} columns and {} indexes",
            def.name,
            id.0,
            def.columns.len(),
            def.indexes.len()
        );
        Ok(self.register_table(table))
    }

    /// Adds a table built by the caller.
    pub fn register_table(&mut self, table: PersistentTable) -> TableId {
        let id = table.id();
        if self.tables.contains_key(&id) || self.names.contains_key(table.name()) {
            fatal!("table {} with id {} registered twice", table.name(), id.0)
        }
        self.next_id = self.next_id.max(id.0 + 1);
        self.names.insert(table.name().to_string(), id);
        self.tables.insert(id, table);
        id
    }

    /// Removes the table. Callers must ensure no undo action refers to it.
    pub fn drop_table(&mut self, id: TableId) -> Option<PersistentTable> {
        let table = self.tables.shift_remove(&id)?;
        self.names.remove(table.name());
        Some(table)
    }

    #[inline]
    pub fn table(&self, id: TableId) -> Option<&PersistentTable> {
        self.tables.get(&id)
    }

    #[inline]
    pub fn table_mut(&mut self, id: TableId) -> Option<&mut PersistentTable> {
        self.tables.get_mut(&id)
    }

    #[inline]
    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).copied()
    }

    #[inline]
    pub fn table_by_name(&self, name: &str) -> Option<&PersistentTable> {
        self.table_id(name).and_then(|id| self.table(id))
    }

    #[inline]
    pub fn table_by_name_mut(&mut self, name: &str) -> Option<&mut PersistentTable> {
        let id = self.table_id(name)?;
        self.table_mut(id)
    }

    #[inline]
    pub fn tables(&self) -> impl Iterator<Item = &PersistentTable> {
        self.tables.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Table referenced by a pending undo action, which must exist.
    #[inline]
    pub(crate) fn table_for_undo(&mut self, id: TableId) -> &mut PersistentTable {
        match self.tables.get_mut(&id) {
            Some(t) => t,
            None => fatal!("table {} dropped with pending undo actions", id.0),
        }
    }
}
