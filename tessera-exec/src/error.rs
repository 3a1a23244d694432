use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Storage(#[from] tessera_storage::error::Error),
    #[error("{0}")]
    Expr(#[from] tessera_expr::Error),
    #[error("{0}")]
    Data(#[from] tessera_datatype::Error),
    #[error("{0}")]
    Plan(#[from] tessera_plan::Error),
    #[error("SQL exception: {0}")]
    SqlException(String),
    #[error("Table not exists '{0}'")]
    TableNotExists(String),
    #[error("Index not exists '{1}' on table '{0}'")]
    IndexNotExists(String, String),
    #[error("Plan fragment not loaded {0}")]
    FragmentNotLoaded(i64),
    #[error("invalid plan node {0}: {1}")]
    InvalidPlanNode(i32, String),
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}

impl Error {
    #[inline]
    pub fn sql(msg: impl Into<String>) -> Self {
        Error::SqlException(msg.into())
    }

    /// Constraint violated by a modification, if any.
    #[inline]
    pub fn constraint_kind(&self) -> Option<tessera_storage::error::ConstraintKind> {
        match self {
            Error::Storage(e) => e.constraint_kind(),
            _ => None,
        }
    }
}
