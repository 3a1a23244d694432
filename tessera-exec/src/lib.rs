//! Execution engine of one partition: owns the catalog and undo log,
//! binds plan fragments to executors and runs them on request of the host.
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod exec;
pub mod topend;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use topend::Topend;
