use crate::error::{Error, Result};
use crate::{ValueType, INT64_NULL};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Value is the owned representation of a single column value
/// flowing through expressions, index keys and aggregation.
/// Null carries no type: the column it is written to decides
/// how it is encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    /// Microseconds since unix epoch.
    Timestamp(i64),
    Boolean(bool),
    Varchar(Arc<str>),
    Varbinary(Arc<[u8]>),
    Address(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl Value {
    #[inline]
    pub fn varchar(s: &str) -> Self {
        Value::Varchar(Arc::from(s))
    }

    #[inline]
    pub fn varbinary(b: &[u8]) -> Self {
        Value::Varbinary(Arc::from(b))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true only for boolean true.
    /// Null and false are both treated as not satisfying a predicate.
    #[inline]
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Boolean(true))
    }

    #[inline]
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Boolean(false))
    }

    #[inline]
    pub fn value_type(&self) -> ValueType {
        use Value::*;
        match self {
            Null => ValueType::Null,
            TinyInt(_) => ValueType::TinyInt,
            SmallInt(_) => ValueType::SmallInt,
            Integer(_) => ValueType::Integer,
            BigInt(_) => ValueType::BigInt,
            Double(_) => ValueType::Double,
            Timestamp(_) => ValueType::Timestamp,
            Boolean(_) => ValueType::Boolean,
            Varchar(_) => ValueType::Varchar,
            Varbinary(_) => ValueType::Varbinary,
            Address(_) => ValueType::Address,
        }
    }

    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.value_type().name()
    }

    /// Returns integral value widened to i64.
    /// Timestamp is treated as integral.
    #[inline]
    pub fn integral(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(*v as i64),
            Value::SmallInt(v) => Some(*v as i64),
            Value::Integer(v) => Some(*v as i64),
            Value::BigInt(v) | Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::TinyInt(_)
                | Value::SmallInt(_)
                | Value::Integer(_)
                | Value::BigInt(_)
                | Value::Double(_)
        )
    }

    #[inline]
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Value::Double(f) => Ok(*f),
            other => other
                .integral()
                .map(|i| i as f64)
                .ok_or(Error::TypeMismatch(other.type_name(), ValueType::Double)),
        }
    }

    #[inline]
    pub fn to_i64(&self) -> Result<i64> {
        self.integral()
            .ok_or(Error::TypeMismatch(self.type_name(), ValueType::BigInt))
    }

    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Varchar(s) => Some(s.as_bytes()),
            Value::Varbinary(b) => Some(b),
            _ => None,
        }
    }

    #[inline]
    pub fn as_address(&self) -> Option<u64> {
        match self {
            Value::Address(a) => Some(*a),
            _ => None,
        }
    }

    /// Compares two values with SQL ordering where null sorts first.
    /// Numeric values of different widths compare by value;
    /// any other pair of distinct types is incomparable.
    pub fn compare(&self, rhs: &Value) -> Result<Ordering> {
        use Value::*;
        let ord = match (self, rhs) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Double(l), r) if r.is_numeric() => cmp_f64(*l, r.to_f64()?),
            (l, Double(r)) if l.is_numeric() => cmp_f64(l.to_f64()?, *r),
            (Varchar(l), Varchar(r)) => l.as_bytes().cmp(r.as_bytes()),
            (Varbinary(l), Varbinary(r)) => l.as_ref().cmp(r.as_ref()),
            (Boolean(l), Boolean(r)) => l.cmp(r),
            (Address(l), Address(r)) => l.cmp(r),
            (l, r) => match (l.integral(), r.integral()) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => return Err(Error::Incomparable(l.type_name(), r.type_name())),
            },
        };
        Ok(ord)
    }

    /// Casts value to given type with range check.
    /// Out-of-range integral conversion reports overflow or underflow
    /// by the sign of the value, so callers building search keys can
    /// reinterpret the bound instead of failing.
    pub fn cast_as(&self, ty: ValueType) -> Result<Value> {
        use Value::*;
        if self.is_null() {
            return Ok(Null);
        }
        let mismatch = || Error::TypeMismatch(self.type_name(), ty);
        let res = match ty {
            ValueType::TinyInt => TinyInt(self.narrow_integral(ty)? as i8),
            ValueType::SmallInt => SmallInt(self.narrow_integral(ty)? as i16),
            ValueType::Integer => Integer(self.narrow_integral(ty)? as i32),
            ValueType::BigInt => BigInt(self.narrow_integral(ty)?),
            ValueType::Timestamp => Timestamp(self.narrow_integral(ty)?),
            ValueType::Double => match self {
                Double(f) => Double(*f),
                other => Double(other.integral().ok_or_else(mismatch)? as f64),
            },
            ValueType::Boolean => match self {
                Boolean(b) => Boolean(*b),
                other => Boolean(other.integral().ok_or_else(mismatch)? != 0),
            },
            ValueType::Varchar => match self {
                Varchar(s) => Varchar(Arc::clone(s)),
                Varbinary(_) | Address(_) => return Err(mismatch()),
                other => Varchar(Arc::from(other.to_string().as_str())),
            },
            ValueType::Varbinary => match self {
                Varbinary(b) => Varbinary(Arc::clone(b)),
                _ => return Err(mismatch()),
            },
            ValueType::Address => match self {
                Address(a) => Address(*a),
                BigInt(i) if *i >= 0 => Address(*i as u64),
                _ => return Err(mismatch()),
            },
            ValueType::Null => return Err(mismatch()),
        };
        Ok(res)
    }

    #[inline]
    fn narrow_integral(&self, ty: ValueType) -> Result<i64> {
        let (min, max) = match ty.integral_range() {
            Some(range) => range,
            None => return Err(Error::TypeMismatch(self.type_name(), ty)),
        };
        let v = match self {
            Value::Double(f) => {
                if *f >= max as f64 + 1.0 {
                    return Err(Error::NumericOverflow);
                }
                if *f <= min as f64 - 1.0 {
                    return Err(Error::NumericUnderflow);
                }
                *f as i64
            }
            Value::Boolean(b) => *b as i64,
            other => other
                .integral()
                .ok_or(Error::TypeMismatch(other.type_name(), ty))?,
        };
        if v > max {
            Err(Error::NumericOverflow)
        } else if v < min {
            Err(Error::NumericUnderflow)
        } else {
            Ok(v)
        }
    }

    /// Checks length of variable-length value against declared column length.
    #[inline]
    pub fn check_object_length(&self, max: usize) -> Result<()> {
        if let Some(bs) = self.as_bytes() {
            if bs.len() > max {
                return Err(Error::StringTooLong { len: bs.len(), max });
            }
        }
        Ok(())
    }

    #[inline]
    pub fn add(&self, rhs: &Value) -> Result<Value> {
        self.arith(rhs, ArithOp::Add)
    }

    #[inline]
    pub fn sub(&self, rhs: &Value) -> Result<Value> {
        self.arith(rhs, ArithOp::Sub)
    }

    #[inline]
    pub fn mul(&self, rhs: &Value) -> Result<Value> {
        self.arith(rhs, ArithOp::Mul)
    }

    #[inline]
    pub fn div(&self, rhs: &Value) -> Result<Value> {
        self.arith(rhs, ArithOp::Div)
    }

    /// Integral arithmetic is computed as BIGINT and double arithmetic
    /// as FLOAT. Any operand being null yields null.
    fn arith(&self, rhs: &Value, op: ArithOp) -> Result<Value> {
        if self.is_null() || rhs.is_null() {
            return Ok(Value::Null);
        }
        if matches!(self, Value::Double(_)) || matches!(rhs, Value::Double(_)) {
            let l = self.to_f64()?;
            let r = rhs.to_f64()?;
            let res = match op {
                ArithOp::Add => l + r,
                ArithOp::Sub => l - r,
                ArithOp::Mul => l * r,
                ArithOp::Div => {
                    if r == 0.0 {
                        return Err(Error::DivideByZero);
                    }
                    l / r
                }
            };
            if !res.is_finite() {
                return Err(if res > 0.0 {
                    Error::NumericOverflow
                } else {
                    Error::NumericUnderflow
                });
            }
            return Ok(Value::Double(res));
        }
        let l = self.to_i64()? as i128;
        let r = rhs.to_i64()? as i128;
        let res = match op {
            ArithOp::Add => l + r,
            ArithOp::Sub => l - r,
            ArithOp::Mul => l * r,
            ArithOp::Div => {
                if r == 0 {
                    return Err(Error::DivideByZero);
                }
                l / r
            }
        };
        if res > i64::MAX as i128 {
            Err(Error::NumericOverflow)
        } else if res <= INT64_NULL as i128 {
            Err(Error::NumericUnderflow)
        } else {
            Ok(Value::BigInt(res as i64))
        }
    }

    #[inline]
    fn type_rank(&self) -> u8 {
        use Value::*;
        match self {
            Null => 0,
            TinyInt(_) | SmallInt(_) | Integer(_) | BigInt(_) | Double(_) => 1,
            Timestamp(_) => 2,
            Boolean(_) => 3,
            Varchar(_) => 4,
            Varbinary(_) => 5,
            Address(_) => 6,
        }
    }
}

#[inline]
fn cmp_f64(l: f64, r: f64) -> Ordering {
    l.partial_cmp(&r).unwrap_or_else(|| l.total_cmp(&r))
}

impl PartialEq for Value {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Total order used by index keys and sort buffers.
/// Incomparable types are ordered by type rank, which never
/// happens for keys built against a single key schema.
impl Ord for Value {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
            .unwrap_or_else(|_| self.type_rank().cmp(&other.type_rank()))
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Double(f) => {
                // integral doubles must hash like equal integers.
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    1u8.hash(state);
                    (*f as i64).hash(state);
                } else {
                    2u8.hash(state);
                    f.to_bits().hash(state);
                }
            }
            Value::Boolean(b) => {
                4u8.hash(state);
                b.hash(state);
            }
            Value::Varchar(s) => {
                5u8.hash(state);
                s.as_bytes().hash(state);
            }
            Value::Varbinary(b) => {
                6u8.hash(state);
                b.as_ref().hash(state);
            }
            Value::Address(a) => {
                7u8.hash(state);
                a.hash(state);
            }
            other => {
                1u8.hash(state);
                other.integral().unwrap_or_default().hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::TinyInt(v) => write!(f, "{}", v),
            Value::SmallInt(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) | Value::Timestamp(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Varchar(s) => f.write_str(s),
            Value::Varbinary(b) => {
                for byte in b.iter() {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
            Value::Address(a) => write!(f, "@{:x}", a),
        }
    }
}

impl From<i8> for Value {
    #[inline]
    fn from(v: i8) -> Self {
        Value::TinyInt(v)
    }
}

impl From<i16> for Value {
    #[inline]
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    #[inline]
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<i64> for Value {
    #[inline]
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(v: &str) -> Self {
        Value::varchar(v)
    }
}

impl From<String> for Value {
    #[inline]
    fn from(v: String) -> Self {
        Value::Varchar(Arc::from(v))
    }
}

impl From<&[u8]> for Value {
    #[inline]
    fn from(v: &[u8]) -> Self {
        Value::varbinary(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        v.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_value_compare_across_widths() {
        assert_eq!(
            Value::TinyInt(5).compare(&Value::BigInt(5)).unwrap(),
            Ordering::Equal
        );
        assert_eq!(
            Value::Integer(3).compare(&Value::Double(3.5)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::Null.compare(&Value::BigInt(i64::MAX)).unwrap(),
            Ordering::Less
        );
        assert!(Value::varchar("a").compare(&Value::Integer(1)).is_err());
        assert_eq!(
            Value::varchar("abc").compare(&Value::varchar("abd")).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_value_cast_range() {
        assert_eq!(
            Value::BigInt(100).cast_as(ValueType::TinyInt).unwrap(),
            Value::TinyInt(100)
        );
        assert_eq!(
            Value::BigInt(1000).cast_as(ValueType::TinyInt),
            Err(Error::NumericOverflow)
        );
        assert_eq!(
            Value::BigInt(-128).cast_as(ValueType::TinyInt),
            Err(Error::NumericUnderflow)
        );
        assert_eq!(
            Value::Double(1e20).cast_as(ValueType::BigInt),
            Err(Error::NumericOverflow)
        );
        assert_eq!(
            Value::Double(-3.7).cast_as(ValueType::Integer).unwrap(),
            Value::Integer(-3)
        );
        assert_eq!(
            Value::Integer(42).cast_as(ValueType::Varchar).unwrap(),
            Value::varchar("42")
        );
        assert!(Value::varbinary(b"x").cast_as(ValueType::Varchar).is_err());
        assert!(Value::Null.cast_as(ValueType::Integer).unwrap().is_null());
    }

    #[test]
    fn test_value_arith() {
        assert_eq!(
            Value::Integer(2).add(&Value::TinyInt(3)).unwrap(),
            Value::BigInt(5)
        );
        assert_eq!(
            Value::BigInt(i64::MAX).add(&Value::BigInt(1)),
            Err(Error::NumericOverflow)
        );
        assert_eq!(
            Value::BigInt(-i64::MAX).sub(&Value::BigInt(1)),
            Err(Error::NumericUnderflow)
        );
        assert_eq!(
            Value::BigInt(7).div(&Value::BigInt(0)),
            Err(Error::DivideByZero)
        );
        assert_eq!(
            Value::Double(1.5).mul(&Value::Integer(2)).unwrap(),
            Value::Double(3.0)
        );
        assert!(Value::Null.add(&Value::Integer(1)).unwrap().is_null());
    }

    #[test]
    fn test_value_hash_consistent_with_eq() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let i: i32 = rng.gen_range(-1000..1000);
            let a = Value::Integer(i);
            let b = Value::BigInt(i as i64);
            let c = Value::Double(i as f64);
            assert_eq!(a, b);
            assert_eq!(a, c);
            assert_eq!(hash_of(&a), hash_of(&b));
            assert_eq!(hash_of(&a), hash_of(&c));
        }
        assert_ne!(hash_of(&Value::Double(0.5)), hash_of(&Value::BigInt(0)));
    }

    #[test]
    fn test_check_object_length() {
        assert!(Value::varchar("abcd").check_object_length(4).is_ok());
        assert_eq!(
            Value::varchar("abcde").check_object_length(4),
            Err(Error::StringTooLong { len: 5, max: 4 })
        );
    }
}
