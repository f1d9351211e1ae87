//! tabula-engine - formula language: addresses, parsing, evaluation and builtins.

pub mod builtins;
pub mod engine;

pub use builtins::{Arity, CallContext, FunctionRegistry, Volatility};
pub use engine::{CellAddress, CellRange, ErrorKind, Expr, FormulaError, Value};
