//! arkmig-dm library - Data Manipulation
//!
//! Streams table batches from a repository through a configured chain of
//! manipulators (value setters, regex replacers, row duplicators, value
//! mappers, record filters and referential-integrity reconcilers) and writes
//! the result to a sink.

pub mod db;
pub mod logger;
pub mod manipulator;
pub mod memory;
pub mod reconcile;
pub mod repository;
pub mod runner;

pub use logger::{MigrationLogger, RecordingLogger, TracingLogger};
pub use manipulator::{build_chain, DataManipulator, ManipulatorChain};
pub use memory::MemoryRepository;
pub use reconcile::{KeyCache, KeyCacheConfig, ReconcileContext};
pub use repository::{BatchSink, BatchStream, DataQueryer, DataRepository};
pub use runner::{TableRunner, TableSummary};
