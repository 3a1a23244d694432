pub mod error;
pub mod eval;
pub mod expr;
mod json;

pub use error::{Error, Result};
pub use eval::{ColumnSource, EvalInput};
pub use expr::*;
