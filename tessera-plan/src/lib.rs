//! Plan fragments shipped by the host: plan node definitions, their
//! JSON form and the fragment that owns a tree of nodes.
pub mod error;
pub mod fragment;
mod json;
pub mod node;

pub use error::{Error, Result};
pub use fragment::PlanFragment;
pub use node::*;
