use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{0}")]
    Data(#[from] tessera_datatype::Error),
    #[error("missing {0} tuple for column reference")]
    MissingTuple(&'static str),
    #[error("tuple index {0} out of range")]
    TupleIndexOutOfRange(usize),
    #[error("parameter index {0} out of range")]
    ParamOutOfRange(usize),
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
}
