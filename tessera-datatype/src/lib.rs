pub mod error;
pub mod value;

pub use error::{Error, Result};
pub use value::*;

use serde::{Deserialize, Serialize};

/// Null of each fixed-size type is encoded as the minimum value
/// of its underlying representation, so the valid range of a
/// signed integral column is `[MIN + 1, MAX]`.
pub const INT8_NULL: i8 = i8::MIN;
pub const INT16_NULL: i16 = i16::MIN;
pub const INT32_NULL: i32 = i32::MIN;
pub const INT64_NULL: i64 = i64::MIN;
pub const DOUBLE_NULL: f64 = -1.7E+308;
pub const BOOLEAN_NULL: i8 = i8::MIN;

/// Type of a column or value in the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueType {
    #[serde(rename = "NULL")]
    Null,
    #[serde(rename = "TINYINT")]
    TinyInt,
    #[serde(rename = "SMALLINT")]
    SmallInt,
    #[serde(rename = "INTEGER")]
    Integer,
    #[serde(rename = "BIGINT")]
    BigInt,
    #[serde(rename = "FLOAT")]
    Double,
    #[serde(rename = "TIMESTAMP")]
    Timestamp,
    #[serde(rename = "BOOLEAN")]
    Boolean,
    #[serde(rename = "VARCHAR")]
    Varchar,
    #[serde(rename = "VARBINARY")]
    Varbinary,
    /// Address of a tuple in persistent storage.
    /// Used as pseudo column driving update and delete.
    #[serde(rename = "ADDRESS")]
    Address,
}

impl ValueType {
    /// Returns storage footprint of fixed-size type.
    /// Variable-length types return None because their
    /// footprint depends on declared length and inlining.
    #[inline]
    pub fn fixed_size(self) -> Option<usize> {
        use ValueType::*;
        let size = match self {
            TinyInt | Boolean => 1,
            SmallInt => 2,
            Integer => 4,
            BigInt | Double | Timestamp | Address => 8,
            Null | Varchar | Varbinary => return None,
        };
        Some(size)
    }

    #[inline]
    pub fn is_object(self) -> bool {
        matches!(self, ValueType::Varchar | ValueType::Varbinary)
    }

    #[inline]
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            ValueType::TinyInt | ValueType::SmallInt | ValueType::Integer | ValueType::BigInt
        )
    }

    #[inline]
    pub fn is_numeric(self) -> bool {
        self.is_integral() || self == ValueType::Double
    }

    /// Returns valid range of integral type, excluding its null sentinel.
    #[inline]
    pub fn integral_range(self) -> Option<(i64, i64)> {
        use ValueType::*;
        let range = match self {
            TinyInt => (INT8_NULL as i64 + 1, i8::MAX as i64),
            SmallInt => (INT16_NULL as i64 + 1, i16::MAX as i64),
            Integer => (INT32_NULL as i64 + 1, i32::MAX as i64),
            BigInt | Timestamp => (INT64_NULL + 1, i64::MAX),
            _ => return None,
        };
        Some(range)
    }

    #[inline]
    pub fn name(self) -> &'static str {
        use ValueType::*;
        match self {
            Null => "NULL",
            TinyInt => "TINYINT",
            SmallInt => "SMALLINT",
            Integer => "INTEGER",
            BigInt => "BIGINT",
            Double => "FLOAT",
            Timestamp => "TIMESTAMP",
            Boolean => "BOOLEAN",
            Varchar => "VARCHAR",
            Varbinary => "VARBINARY",
            Address => "ADDRESS",
        }
    }
}
