#[macro_use]
pub mod error;
pub mod big_alloc;
pub mod catalog;
pub mod config;
pub mod index;
pub mod object;
pub mod pool;
pub mod schema;
pub mod table;
pub mod tuple;
pub mod undo;

#[doc(hidden)]
pub use log as __log;

pub mod prelude {
    pub use crate::catalog::*;
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::index::{IndexCursor, IndexKey, IndexScheme, IndexType, TableIndex};
    pub use crate::object::{ObjectAllocator, ObjectRef, ObjectStore};
    pub use crate::pool::{PoolArena, TempPool};
    pub use crate::schema::*;
    pub use crate::table::*;
    pub use crate::tuple::{TableTuple, TupleFlags};
    pub use crate::undo::*;
}
