use crate::error::Result;
use crate::object::{ObjectAllocator, ObjectRef, ObjectStore};
use crate::schema::{ColumnInfo, TupleSchema};
use bitflags::bitflags;
use smallvec::SmallVec;
use std::fmt;
use tessera_datatype::{
    Value, ValueType, BOOLEAN_NULL, DOUBLE_NULL, INT16_NULL, INT32_NULL, INT64_NULL, INT8_NULL,
};
use tessera_expr::ColumnSource;

/// Every table row starts with one flag byte.
pub const TUPLE_HEADER_SIZE: usize = 1;
/// Length byte of a null inlined object.
const INLINED_NULL: u8 = 0xff;

bitflags! {
    pub struct TupleFlags: u8 {
        const ACTIVE = 0x01;
        /// Deleted inside an unreleased undo quantum, storage
        /// is kept until the quantum is released.
        const PENDING_DELETE = 0x04;
    }
}

/// TableTuple is a read-only view of one row.
/// `data` covers the header byte followed by the column area.
#[derive(Clone, Copy)]
pub struct TableTuple<'a> {
    data: &'a [u8],
    schema: &'a TupleSchema,
    objects: &'a dyn ObjectStore,
    address: Option<u64>,
}

impl<'a> TableTuple<'a> {
    #[inline]
    pub fn new(data: &'a [u8], schema: &'a TupleSchema, objects: &'a dyn ObjectStore) -> Self {
        debug_assert_eq!(data.len(), TUPLE_HEADER_SIZE + schema.tuple_length());
        TableTuple {
            data,
            schema,
            objects,
            address: None,
        }
    }

    #[inline]
    pub fn with_address(mut self, address: u64) -> Self {
        self.address = Some(address);
        self
    }

    #[inline]
    pub fn schema(&self) -> &'a TupleSchema {
        self.schema
    }

    #[inline]
    pub fn flags(&self) -> TupleFlags {
        TupleFlags::from_bits_truncate(self.data[0])
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.flags().contains(TupleFlags::ACTIVE)
    }

    /// Raw row bytes including header.
    #[inline]
    pub fn raw(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.schema.column_count()
    }

    #[inline]
    pub fn value(&self, idx: usize) -> Value {
        read_value(
            &self.data[TUPLE_HEADER_SIZE..],
            self.schema.column(idx),
            self.objects,
        )
    }

    #[inline]
    pub fn is_null(&self, idx: usize) -> bool {
        self.value(idx).is_null()
    }

    #[inline]
    pub fn values(&self) -> Vec<Value> {
        (0..self.column_count()).map(|i| self.value(i)).collect()
    }

    /// Out-of-line objects referenced by this row.
    #[inline]
    pub fn object_refs(&self) -> SmallVec<[ObjectRef; 4]> {
        object_refs(self.data, self.schema)
    }
}

impl ColumnSource for TableTuple<'_> {
    #[inline]
    fn column_value(&self, idx: usize) -> Value {
        self.value(idx)
    }

    #[inline]
    fn address(&self) -> Option<u64> {
        self.address
    }
}

impl fmt::Debug for TableTuple<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values()).finish()
    }
}

/// TupleMut writes into one row.
pub struct TupleMut<'a> {
    data: &'a mut [u8],
    schema: &'a TupleSchema,
}

impl<'a> TupleMut<'a> {
    #[inline]
    pub fn new(data: &'a mut [u8], schema: &'a TupleSchema) -> Self {
        debug_assert_eq!(data.len(), TUPLE_HEADER_SIZE + schema.tuple_length());
        TupleMut { data, schema }
    }

    #[inline]
    pub fn set_flags(&mut self, flags: TupleFlags) {
        self.data[0] = flags.bits();
    }

    #[inline]
    pub fn flags(&self) -> TupleFlags {
        TupleFlags::from_bits_truncate(self.data[0])
    }

    /// Casts value to column type and stores it. An uninlined value is
    /// copied into a new object; the previous object of the column is
    /// left to the caller.
    pub fn set_value(
        &mut self,
        idx: usize,
        value: &Value,
        alloc: &mut dyn ObjectAllocator,
    ) -> Result<()> {
        let col = self.schema.column(idx);
        let v = value.cast_as(col.ty)?;
        v.check_object_length(col.length as usize)?;
        write_value(&mut self.data[TUPLE_HEADER_SIZE..], col, &v, alloc);
        Ok(())
    }

    /// Writes all columns. Objects are allocated only after every
    /// value passed its cast and length checks.
    pub fn set_values(&mut self, values: &[Value], alloc: &mut dyn ObjectAllocator) -> Result<()> {
        debug_assert_eq!(values.len(), self.schema.column_count());
        let mut casted = Vec::with_capacity(values.len());
        for (col, v) in self.schema.columns().iter().zip(values) {
            let v = v.cast_as(col.ty)?;
            v.check_object_length(col.length as usize)?;
            casted.push(v);
        }
        for (col, v) in self.schema.columns().iter().zip(&casted) {
            write_value(&mut self.data[TUPLE_HEADER_SIZE..], col, v, alloc);
        }
        Ok(())
    }

    /// Destroys all out-of-line objects of the row.
    pub fn free_objects(&mut self, alloc: &mut dyn ObjectAllocator) {
        for r in object_refs(self.data, self.schema) {
            alloc.destroy_object(r);
        }
        for &idx in self.schema.uninlined_columns() {
            let off = TUPLE_HEADER_SIZE + self.schema.column(idx as usize).offset as usize;
            self.data[off..off + 8].fill(0);
        }
    }
}

/// Collects non-null object references of an encoded row.
pub fn object_refs(row: &[u8], schema: &TupleSchema) -> SmallVec<[ObjectRef; 4]> {
    schema
        .uninlined_columns()
        .iter()
        .filter_map(|&idx| {
            let off = TUPLE_HEADER_SIZE + schema.column(idx as usize).offset as usize;
            let raw: u64 = bytemuck::pod_read_unaligned(&row[off..off + 8]);
            let r = ObjectRef::from_raw(raw);
            if r.is_null() {
                None
            } else {
                Some(r)
            }
        })
        .collect()
}

/// Decodes one column from the column area of a row.
pub fn read_value(cols: &[u8], col: &ColumnInfo, objects: &dyn ObjectStore) -> Value {
    let off = col.offset as usize;
    match col.ty {
        ValueType::TinyInt => {
            let v = cols[off] as i8;
            if v == INT8_NULL {
                Value::Null
            } else {
                Value::TinyInt(v)
            }
        }
        ValueType::SmallInt => {
            let v: i16 = bytemuck::pod_read_unaligned(&cols[off..off + 2]);
            if v == INT16_NULL {
                Value::Null
            } else {
                Value::SmallInt(v)
            }
        }
        ValueType::Integer => {
            let v: i32 = bytemuck::pod_read_unaligned(&cols[off..off + 4]);
            if v == INT32_NULL {
                Value::Null
            } else {
                Value::Integer(v)
            }
        }
        ValueType::BigInt | ValueType::Timestamp => {
            let v: i64 = bytemuck::pod_read_unaligned(&cols[off..off + 8]);
            if v == INT64_NULL {
                Value::Null
            } else if col.ty == ValueType::Timestamp {
                Value::Timestamp(v)
            } else {
                Value::BigInt(v)
            }
        }
        ValueType::Double => {
            let v: f64 = bytemuck::pod_read_unaligned(&cols[off..off + 8]);
            if v <= DOUBLE_NULL {
                Value::Null
            } else {
                Value::Double(v)
            }
        }
        ValueType::Boolean => {
            let v = cols[off] as i8;
            if v == BOOLEAN_NULL {
                Value::Null
            } else {
                Value::Boolean(v != 0)
            }
        }
        ValueType::Address => {
            let v: u64 = bytemuck::pod_read_unaligned(&cols[off..off + 8]);
            if v == INT64_NULL as u64 {
                Value::Null
            } else {
                Value::Address(v)
            }
        }
        ValueType::Varchar | ValueType::Varbinary => {
            let bytes = if col.inlined {
                let len = cols[off];
                if len == INLINED_NULL {
                    return Value::Null;
                }
                &cols[off + 1..off + 1 + len as usize]
            } else {
                let raw: u64 = bytemuck::pod_read_unaligned(&cols[off..off + 8]);
                let r = ObjectRef::from_raw(raw);
                if r.is_null() {
                    return Value::Null;
                }
                objects.object(r)
            };
            if col.ty == ValueType::Varchar {
                Value::varchar(&String::from_utf8_lossy(bytes))
            } else {
                Value::varbinary(bytes)
            }
        }
        ValueType::Null => Value::Null,
    }
}

/// Encodes one column, the value must already have column type or be null.
fn write_value(cols: &mut [u8], col: &ColumnInfo, v: &Value, alloc: &mut dyn ObjectAllocator) {
    let off = col.offset as usize;
    match (col.ty, v) {
        (ValueType::TinyInt, Value::TinyInt(i)) => cols[off] = *i as u8,
        (ValueType::TinyInt, _) => cols[off] = INT8_NULL as u8,
        (ValueType::SmallInt, v) => {
            let i = match v {
                Value::SmallInt(i) => *i,
                _ => INT16_NULL,
            };
            cols[off..off + 2].copy_from_slice(bytemuck::bytes_of(&i));
        }
        (ValueType::Integer, v) => {
            let i = match v {
                Value::Integer(i) => *i,
                _ => INT32_NULL,
            };
            cols[off..off + 4].copy_from_slice(bytemuck::bytes_of(&i));
        }
        (ValueType::BigInt | ValueType::Timestamp, v) => {
            let i = v.integral().unwrap_or(INT64_NULL);
            cols[off..off + 8].copy_from_slice(bytemuck::bytes_of(&i));
        }
        (ValueType::Double, v) => {
            let f = match v {
                Value::Double(f) => *f,
                _ => DOUBLE_NULL,
            };
            cols[off..off + 8].copy_from_slice(bytemuck::bytes_of(&f));
        }
        (ValueType::Boolean, v) => {
            cols[off] = match v {
                Value::Boolean(b) => *b as u8,
                _ => BOOLEAN_NULL as u8,
            }
        }
        (ValueType::Address, v) => {
            let a = v.as_address().unwrap_or(INT64_NULL as u64);
            cols[off..off + 8].copy_from_slice(bytemuck::bytes_of(&a));
        }
        (ValueType::Varchar | ValueType::Varbinary, v) => {
            let bytes = v.as_bytes();
            if col.inlined {
                match bytes {
                    Some(bs) => {
                        cols[off] = bs.len() as u8;
                        cols[off + 1..off + 1 + bs.len()].copy_from_slice(bs);
                    }
                    None => cols[off] = INLINED_NULL,
                }
            } else {
                let r = match bytes {
                    Some(bs) => alloc.create_object(bs),
                    None => ObjectRef::NULL,
                };
                cols[off..off + 8].copy_from_slice(bytemuck::bytes_of(&r.raw()));
            }
        }
        (ValueType::Null, _) => (),
    }
}
