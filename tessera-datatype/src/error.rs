use crate::ValueType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("numeric value out of range: overflow")]
    NumericOverflow,
    #[error("numeric value out of range: underflow")]
    NumericUnderflow,
    #[error("attempted to divide by zero")]
    DivideByZero,
    #[error("type mismatch: {0:?} to {1:?}")]
    TypeMismatch(&'static str, ValueType),
    #[error("incomparable types: {0} and {1}")]
    Incomparable(&'static str, &'static str),
    #[error("value too long: length {len} exceeds {max}")]
    StringTooLong { len: usize, max: usize },
    #[error("invalid format")]
    InvalidFormat,
}

impl Error {
    /// Returns true if the error is caused by range check of a numeric value.
    #[inline]
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Error::NumericOverflow | Error::NumericUnderflow)
    }
}
