use crate::config::TempTableLimits;
use crate::error::{Error, Result};
use crate::pool::TempPool;
use crate::schema::TupleSchema;
use crate::tuple::{TableTuple, TupleFlags, TupleMut, TUPLE_HEADER_SIZE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_datatype::Value;

pub const TEMP_TABLE_BLOCK_SIZE: usize = 128 * 1024;

/// Rows of a table in host-exchange form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// TempTable holds intermediate or final rows of one fragment execution.
/// It has no index, rows are only appended or cleared all at once.
/// Out-of-line values live in its own pool, so rows can be copied in
/// while other tables are being read.
pub struct TempTable {
    name: String,
    column_names: Vec<String>,
    schema: TupleSchema,
    row_length: usize,
    rows_per_block: usize,
    blocks: Vec<Box<[u8]>>,
    row_count: usize,
    pool: TempPool,
    limits: Option<Arc<TempTableLimits>>,
    charged: usize,
}

impl TempTable {
    pub fn new(
        name: impl Into<String>,
        column_names: Vec<String>,
        schema: TupleSchema,
        limits: Option<Arc<TempTableLimits>>,
    ) -> Self {
        let row_length = TUPLE_HEADER_SIZE + schema.tuple_length();
        TempTable {
            name: name.into(),
            column_names,
            schema,
            row_length,
            rows_per_block: (TEMP_TABLE_BLOCK_SIZE / row_length).max(1),
            blocks: vec![],
            row_count: 0,
            pool: TempPool::new(),
            limits,
            charged: 0,
        }
    }

    /// Empty table of the same shape and memory limits.
    #[inline]
    pub fn empty_copy(&self, name: impl Into<String>) -> Self {
        TempTable::new(
            name,
            self.column_names.clone(),
            self.schema.clone(),
            self.limits.clone(),
        )
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
    pub fn schema(&self) -> &TupleSchema {
        &self.schema
    }

    #[inline]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Bytes charged to the temp table limits.
    #[inline]
    pub fn allocated_memory(&self) -> usize {
        self.charged
    }

    /// Appends one row. Values are cast to column types.
    pub fn insert_values(&mut self, values: &[Value]) -> Result<()> {
        if values.len() != self.schema.column_count() {
            return Err(Error::InvalidArgument);
        }
        if self.row_count == self.blocks.len() * self.rows_per_block {
            let bytes = self.rows_per_block * self.row_length;
            self.charge(bytes)?;
            self.blocks.push(vec![0u8; bytes].into_boxed_slice());
        }
        let (block, start) = self.position(self.row_count);
        let row = &mut self.blocks[block][start..start + self.row_length];
        let mut tuple = TupleMut::new(row, &self.schema);
        tuple.set_values(values, &mut self.pool)?;
        tuple.set_flags(TupleFlags::ACTIVE);
        self.row_count += 1;
        let pool_bytes = self.pool.allocated_memory();
        let block_bytes = self.blocks.len() * self.rows_per_block * self.row_length;
        if pool_bytes + block_bytes > self.charged {
            self.charge(pool_bytes + block_bytes - self.charged)?;
        }
        Ok(())
    }

    #[inline]
    pub fn insert_tuple(&mut self, tuple: &TableTuple<'_>) -> Result<()> {
        self.insert_values(&tuple.values())
    }

    #[inline]
    pub fn tuple(&self, idx: usize) -> TableTuple<'_> {
        debug_assert!(idx < self.row_count);
        let (block, start) = self.position(idx);
        TableTuple::new(
            &self.blocks[block][start..start + self.row_length],
            &self.schema,
            &self.pool,
        )
    }

    #[inline]
    pub fn row_values(&self, idx: usize) -> Vec<Value> {
        self.tuple(idx).values()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = TableTuple<'_>> + '_ {
        (0..self.row_count).map(move |i| self.tuple(i))
    }

    #[inline]
    pub fn rows(&self) -> Vec<Vec<Value>> {
        self.iter().map(|t| t.values()).collect()
    }

    /// Removes all rows and releases their memory charge.
    /// The first block is kept for reuse.
    pub fn delete_all_tuples(&mut self) {
        self.row_count = 0;
        self.blocks.truncate(1);
        if let Some(b) = self.blocks.first_mut() {
            b.fill(0);
        }
        self.pool.purge();
        let keep = self.blocks.len() * self.rows_per_block * self.row_length
            + self.pool.allocated_memory();
        if self.charged > keep {
            self.release(self.charged - keep);
        }
    }

    pub fn to_row_set(&self) -> RowSet {
        RowSet {
            columns: self.column_names.clone(),
            rows: self.rows(),
        }
    }

    /// Serializes all rows for the host.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let res = bincode::serde::encode_to_vec(self.to_row_set(), bincode::config::standard())?;
        Ok(res)
    }

    /// Appends rows serialized by [`TempTable::encode`]. Returns number of rows loaded.
    pub fn decode_from(&mut self, data: &[u8]) -> Result<usize> {
        let (rs, _): (RowSet, usize) =
            bincode::serde::decode_from_slice(data, bincode::config::standard())?;
        if rs.columns.len() != self.schema.column_count() {
            return Err(Error::InvalidFormat);
        }
        for row in &rs.rows {
            self.insert_values(row)?;
        }
        Ok(rs.rows.len())
    }

    #[inline]
    fn position(&self, idx: usize) -> (usize, usize) {
        (
            idx / self.rows_per_block,
            (idx % self.rows_per_block) * self.row_length,
        )
    }

    #[inline]
    fn charge(&mut self, bytes: usize) -> Result<()> {
        self.charged += bytes;
        match &self.limits {
            Some(limits) => limits.increase_allocated(bytes),
            None => Ok(()),
        }
    }

    #[inline]
    fn release(&mut self, bytes: usize) {
        self.charged -= bytes;
        if let Some(limits) = &self.limits {
            limits.reduce_allocated(bytes);
        }
    }
}

impl Drop for TempTable {
    #[inline]
    fn drop(&mut self) {
        if self.charged > 0 {
            self.release(self.charged);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSpec;
    use tessera_datatype::ValueType;

    fn test_schema() -> TupleSchema {
        TupleSchema::new(&[
            ColumnSpec::fixed(ValueType::BigInt),
            ColumnSpec::new(ValueType::Varchar, 1000, true),
        ])
    }

    fn names() -> Vec<String> {
        vec!["ID".into(), "NAME".into()]
    }

    #[test]
    fn test_temp_table_rows() {
        let mut t = TempTable::new("TMP", names(), test_schema(), None);
        let n = t.rows_per_block * 2 + 5;
        for i in 0..n {
            t.insert_values(&[Value::Integer(i as i32), Value::varchar(&format!("row{}", i))])
                .unwrap();
        }
        assert_eq!(t.row_count(), n);
        assert_eq!(t.tuple(n - 1).value(0), Value::BigInt(n as i64 - 1));
        assert_eq!(
            t.row_values(7),
            vec![Value::BigInt(7), Value::varchar("row7")]
        );
        assert_eq!(t.iter().count(), n);
        assert!(t.insert_values(&[Value::Null]).is_err());
        t.delete_all_tuples();
        assert!(t.is_empty());
        t.insert_values(&[Value::Null, Value::Null]).unwrap();
        assert!(t.tuple(0).is_null(1));
    }

    #[test]
    fn test_temp_table_limits() {
        let limits = Arc::new(TempTableLimits::new(TEMP_TABLE_BLOCK_SIZE as i64 * 2, -1));
        {
            let mut t = TempTable::new("TMP", names(), test_schema(), Some(Arc::clone(&limits)));
            let mut res = Ok(());
            for i in 0..100_000 {
                res = t.insert_values(&[Value::BigInt(i), Value::varchar("abcdefgh")]);
                if res.is_err() {
                    break;
                }
            }
            assert!(matches!(res, Err(Error::TempTableMemoryLimit { .. })));
            assert!(limits.allocated() > 0);
            t.delete_all_tuples();
            assert_eq!(limits.allocated(), t.allocated_memory() as i64);
            assert!(t.allocated_memory() < TEMP_TABLE_BLOCK_SIZE * 4);
        }
        assert_eq!(limits.allocated(), 0);
    }

    #[test]
    fn test_temp_table_encode() {
        let mut t = TempTable::new("TMP", names(), test_schema(), None);
        t.insert_values(&[Value::BigInt(1), Value::varchar("a")])
            .unwrap();
        t.insert_values(&[Value::BigInt(2), Value::Null]).unwrap();
        let data = t.encode().unwrap();
        let mut t2 = t.empty_copy("TMP2");
        assert_eq!(t2.decode_from(&data).unwrap(), 2);
        assert_eq!(t2.rows(), t.rows());
        assert!(t2.decode_from(&data[..3]).is_err());
    }
}
