//! tabula-core - document model: dependency graph, recalculation and cell store.

pub mod config;
pub mod document;
pub mod error;
pub mod storage;

pub use config::EngineConfig;
pub use document::{CellId, CellState, Document, SheetId, ValueCache};
pub use error::{CoreError, Result};

pub use tabula_engine::engine::{CellAddress, CellRef, ErrorKind, Value};
