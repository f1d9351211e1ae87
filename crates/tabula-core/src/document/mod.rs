//! Document state and recalculation (UI-agnostic).

mod eval;
mod io;
mod ops;
mod state;

pub use state::{CellId, CellState, Document, SheetId, ValueCache};
