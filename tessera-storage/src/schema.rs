use serde::{Deserialize, Serialize};
use tessera_datatype::ValueType;

/// Object columns declared shorter than this are stored inside the row,
/// prefixed by one length byte. Longer ones keep only an object reference.
pub const UNINLINEABLE_OBJECT_LENGTH: u32 = 64;
/// Row slot of an uninlined object column holds one object reference.
pub const OBJECT_REF_SIZE: usize = 8;

/// Declared shape of one column, as given by catalog or plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    #[serde(rename = "type")]
    pub ty: ValueType,
    /// Declared byte length for object types. Ignored for fixed-size types.
    #[serde(default)]
    pub length: u32,
    #[serde(default = "default_allow_null")]
    pub allow_null: bool,
}

#[inline]
fn default_allow_null() -> bool {
    true
}

impl ColumnSpec {
    #[inline]
    pub fn new(ty: ValueType, length: u32, allow_null: bool) -> Self {
        ColumnSpec {
            ty,
            length,
            allow_null,
        }
    }

    /// Nullable column of fixed-size type.
    #[inline]
    pub fn fixed(ty: ValueType) -> Self {
        let length = ty.fixed_size().unwrap_or(0) as u32;
        ColumnSpec::new(ty, length, true)
    }

    #[inline]
    pub fn not_null(mut self) -> Self {
        self.allow_null = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnInfo {
    pub ty: ValueType,
    pub length: u32,
    pub offset: u32,
    pub allow_null: bool,
    pub inlined: bool,
}

/// TupleSchema describes the byte layout of a row.
/// Offsets are relative to the first column, the row header is
/// accounted by the table that owns the rows.
#[derive(Debug, Clone)]
pub struct TupleSchema {
    columns: Box<[ColumnInfo]>,
    uninlined: Box<[u16]>,
    tuple_length: usize,
}

impl TupleSchema {
    pub fn new(specs: &[ColumnSpec]) -> Self {
        let mut columns = Vec::with_capacity(specs.len());
        let mut uninlined = vec![];
        for (idx, spec) in specs.iter().enumerate() {
            let inlined = !spec.ty.is_object() || spec.length < UNINLINEABLE_OBJECT_LENGTH;
            if !inlined {
                uninlined.push(idx as u16);
            }
            columns.push(ColumnInfo {
                ty: spec.ty,
                length: spec.length,
                offset: 0,
                allow_null: spec.allow_null,
                inlined,
            });
        }
        let mut schema = TupleSchema {
            columns: columns.into_boxed_slice(),
            uninlined: uninlined.into_boxed_slice(),
            tuple_length: 0,
        };
        schema.fix_offsets(0);
        schema
    }

    /// Replaces metadata of one column and recomputes offsets of
    /// every column on its right.
    pub fn set_column(&mut self, idx: usize, spec: ColumnSpec) {
        let inlined = !spec.ty.is_object() || spec.length < UNINLINEABLE_OBJECT_LENGTH;
        let col = &mut self.columns[idx];
        col.ty = spec.ty;
        col.length = spec.length;
        col.allow_null = spec.allow_null;
        col.inlined = inlined;
        self.uninlined = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.inlined)
            .map(|(i, _)| i as u16)
            .collect();
        self.fix_offsets(idx);
    }

    fn fix_offsets(&mut self, from: usize) {
        let mut offset = if from == 0 {
            0
        } else {
            let prev = &self.columns[from - 1];
            prev.offset as usize + column_storage_size(prev)
        };
        for col in &mut self.columns[from..] {
            col.offset = offset as u32;
            offset += column_storage_size(col);
        }
        self.tuple_length = offset;
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn column(&self, idx: usize) -> &ColumnInfo {
        &self.columns[idx]
    }

    #[inline]
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    #[inline]
    pub fn column_type(&self, idx: usize) -> ValueType {
        self.columns[idx].ty
    }

    #[inline]
    pub fn column_length(&self, idx: usize) -> u32 {
        self.columns[idx].length
    }

    #[inline]
    pub fn column_allow_null(&self, idx: usize) -> bool {
        self.columns[idx].allow_null
    }

    /// Byte length of the column area of a row.
    #[inline]
    pub fn tuple_length(&self) -> usize {
        self.tuple_length
    }

    #[inline]
    pub fn uninlined_columns(&self) -> &[u16] {
        &self.uninlined
    }

    /// Column specs that reproduce this schema.
    #[inline]
    pub fn specs(&self) -> Vec<ColumnSpec> {
        self.columns
            .iter()
            .map(|c| ColumnSpec::new(c.ty, c.length, c.allow_null))
            .collect()
    }
}

/// Two schemas are equal if their layouts are interchangeable.
/// Declared object lengths only matter through offsets.
impl PartialEq for TupleSchema {
    fn eq(&self, other: &Self) -> bool {
        self.columns.len() == other.columns.len()
            && self.uninlined.len() == other.uninlined.len()
            && self.columns.iter().zip(other.columns.iter()).all(|(a, b)| {
                a.ty == b.ty && a.allow_null == b.allow_null && a.offset == b.offset
            })
    }
}

impl Eq for TupleSchema {}

/// Returns byte footprint of a column inside the row.
pub fn column_storage_size(col: &ColumnInfo) -> usize {
    if let Some(size) = col.ty.fixed_size() {
        return size;
    }
    if !col.ty.is_object() {
        fatal!("no storage size for column of type {}", col.ty.name())
    }
    if col.length == 0 {
        fatal!("zero length for object column of type {}", col.ty.name())
    }
    if col.inlined {
        1 + col.length as usize
    } else {
        OBJECT_REF_SIZE
    }
}
