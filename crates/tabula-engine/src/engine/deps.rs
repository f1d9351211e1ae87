//! Dependency extraction from parsed formulas.
//!
//! Walks the AST to find every cell and range reference the formula reads.
//! This is used to build the dependency graph for dirty propagation and cycle
//! detection. References inside string literals never show up here because
//! the tokenizer already folded them into `Text` nodes.

use super::ast::Expr;
use super::cell_ref::{CellAddress, CellRange};

/// A precedent read by a formula.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Reference {
    Cell(CellAddress),
    Range(CellRange),
}

impl Reference {
    pub fn sheet(&self) -> Option<&str> {
        match self {
            Reference::Cell(addr) => addr.sheet.as_deref(),
            Reference::Range(range) => range.sheet(),
        }
    }
}

/// Every reference in the formula, in source order, duplicates removed.
pub fn extract_dependencies(expr: &Expr) -> Vec<Reference> {
    let mut refs: Vec<Reference> = Vec::new();
    expr.walk(&mut |node| {
        let reference = match node {
            Expr::Cell(addr) => Reference::Cell(addr.clone()),
            Expr::Range(range) => Reference::Range(range.clone()),
            _ => return,
        };
        if !refs.contains(&reference) {
            refs.push(reference);
        }
    });
    refs
}

/// Upper-cased names of every function the formula calls.
pub fn called_functions(expr: &Expr) -> Vec<String> {
    let mut names = Vec::new();
    expr.walk(&mut |node| {
        if let Expr::Call { name, .. } = node {
            let upper = name.to_ascii_uppercase();
            if !names.contains(&upper) {
                names.push(upper);
            }
        }
    });
    names
}
