use crate::node::{PlanNodeId, PlanNodeType};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid plan document: {0}")]
    InvalidDocument(String),
    #[error("plan node {0} not found")]
    NodeNotFound(PlanNodeId),
    #[error("plan node {node} misses field {field}")]
    MissingField {
        node: PlanNodeId,
        field: &'static str,
    },
    #[error("plan node {node}: {detail}")]
    InvalidNode { node: PlanNodeId, detail: String },
    #[error("inline node {1:?} not supported in plan node {0}")]
    UnsupportedInlineNode(PlanNodeId, PlanNodeType),
    #[error("no output schema defined for plan node {0}")]
    NoOutputSchema(PlanNodeId),
    #[error("plan fragment has no node")]
    EmptyFragment,
    #[error("{0}")]
    Expr(#[from] tessera_expr::Error),
}

impl From<serde_json::Error> for Error {
    #[inline]
    fn from(src: serde_json::Error) -> Self {
        Error::InvalidDocument(src.to_string())
    }
}

impl Error {
    #[inline]
    pub(crate) fn invalid(node: PlanNodeId, detail: impl Into<String>) -> Self {
        Error::InvalidNode {
            node,
            detail: detail.into(),
        }
    }
}
