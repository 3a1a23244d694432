use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    NotNull,
    Unique,
    Partitioning,
    RowLimit,
}

impl ConstraintKind {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintKind::NotNull => "NOT_NULL",
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::Partitioning => "PARTITIONING",
            ConstraintKind::RowLimit => "ROW_LIMIT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("constraint {} violated on table {table}: {detail}", kind.name())]
    ConstraintFailure {
        kind: ConstraintKind,
        table: String,
        detail: String,
    },
    #[error("temp table memory {allocated} exceeds limit {limit}")]
    TempTableMemoryLimit { allocated: i64, limit: i64 },
    #[error("{0}")]
    Data(#[from] tessera_datatype::Error),
    #[error("{0}")]
    Expr(#[from] tessera_expr::Error),
    #[error("tuple not found")]
    TupleNotFound,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("invalid format")]
    InvalidFormat,
    #[error("insufficient memory({0})")]
    InsufficientMemory(usize),
}

impl Error {
    #[inline]
    pub fn constraint(kind: ConstraintKind, table: &str, detail: impl Into<String>) -> Self {
        Error::ConstraintFailure {
            kind,
            table: table.to_string(),
            detail: detail.into(),
        }
    }

    #[inline]
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            Error::ConstraintFailure { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<bincode::error::EncodeError> for Error {
    #[inline]
    fn from(_src: bincode::error::EncodeError) -> Self {
        Error::InvalidFormat
    }
}

impl From<bincode::error::DecodeError> for Error {
    #[inline]
    fn from(_src: bincode::error::DecodeError) -> Self {
        Error::InvalidFormat
    }
}

/// Payload of a panic raised by a violated storage invariant.
/// Memory state is undefined after such a violation, so it is
/// never converted into a recoverable error.
#[derive(Debug, Clone)]
pub struct FatalError {
    pub message: String,
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.message, self.file, self.line)
    }
}

impl std::error::Error for FatalError {}

/// Logs the message and aborts current execution with a [`FatalError`] payload.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::__log::error!("fatal: {}", message);
        std::panic::panic_any($crate::error::FatalError {
            message,
            file: file!(),
            line: line!(),
        })
    }};
}
