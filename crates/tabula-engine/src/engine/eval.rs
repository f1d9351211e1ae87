//! Formula evaluation.
//!
//! Walks a parsed [`Expr`] post-order, resolving references through a
//! [`CellSource`] and dispatching calls through a [`FunctionRegistry`].
//! References read *settled* values from the source; the evaluator never
//! re-evaluates another cell's formula inline.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::cell_ref::{CellAddress, CellRange};
use super::error::FormulaError;
use super::parser::parse_formula;
use super::token::is_cell_shaped;
use super::value::{
    ErrorKind, Matrix, Value, compare_values, to_number, to_text, values_equal,
};
use crate::builtins::{CallContext, FunctionRegistry, checked_pow};

/// Ranges with more cells than this evaluate to `#REF!`.
pub const DEFAULT_MAX_RANGE_CELLS: usize = 1_000_000;

/// Read access to cell values, supplied by the host.
pub trait CellSource {
    /// Settled value of a cell; unwritten cells are `Blank`.
    fn cell_value(&self, addr: &CellAddress) -> Value;

    /// True for a cell that was cleared while still referenced. Direct
    /// references to it are `#REF!`; inside a range it reads as blank.
    fn is_cleared(&self, _addr: &CellAddress) -> bool {
        false
    }

    /// Whether a sheet-qualified reference can resolve. `None` is the
    /// current sheet.
    fn has_sheet(&self, _sheet: Option<&str>) -> bool {
        true
    }
}

pub struct Evaluator<'a> {
    registry: &'a FunctionRegistry,
    ctx: CallContext,
    max_range_cells: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(registry: &'a FunctionRegistry) -> Self {
        Evaluator {
            registry,
            ctx: CallContext::at_local_now(),
            max_range_cells: DEFAULT_MAX_RANGE_CELLS,
        }
    }

    pub fn with_context(mut self, ctx: CallContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_max_range_cells(mut self, limit: usize) -> Self {
        self.max_range_cells = limit;
        self
    }

    /// Evaluate a formula to the value a cell holds: a blank result reads as
    /// 0 and a single-cell block is unwrapped.
    pub fn evaluate(&self, expr: &Expr, cells: &dyn CellSource) -> Value {
        match self.eval(expr, cells).into_scalar() {
            Value::Blank => Value::Number(0.0),
            value => value,
        }
    }

    fn eval(&self, expr: &Expr, cells: &dyn CellSource) -> Value {
        match expr {
            Expr::Number(n) => Value::Number(*n),
            Expr::Text(s) => Value::Text(s.clone()),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Cell(addr) => self.cell(addr, cells),
            Expr::Range(range) => self.range(range, cells),
            Expr::Name(name) => {
                // Cell-shaped names are addresses that failed to resolve.
                if is_cell_shaped(name) {
                    Value::Error(ErrorKind::InvalidReference)
                } else {
                    Value::Error(ErrorKind::NameNotFound)
                }
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, cells).into_scalar();
                match to_number(&value) {
                    Ok(n) => match op {
                        UnaryOp::Plus => Value::Number(n),
                        UnaryOp::Minus => Value::Number(-n),
                    },
                    Err(e) => Value::Error(e),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let left = self.eval(lhs, cells).into_scalar();
                if left.is_error() {
                    return left;
                }
                let right = self.eval(rhs, cells).into_scalar();
                if right.is_error() {
                    return right;
                }
                binary(*op, &left, &right)
            }
            Expr::Call { name, args } => {
                let Some(function) = self.registry.get(name) else {
                    log::trace!("unknown function {}", name);
                    return Value::Error(ErrorKind::NameNotFound);
                };
                let values = args.iter().map(|arg| self.eval(arg, cells)).collect();
                function.call(values, &self.ctx)
            }
        }
    }

    fn cell(&self, addr: &CellAddress, cells: &dyn CellSource) -> Value {
        if !cells.has_sheet(addr.sheet.as_deref()) || cells.is_cleared(addr) {
            return Value::Error(ErrorKind::InvalidReference);
        }
        cells.cell_value(addr)
    }

    fn range(&self, range: &CellRange, cells: &dyn CellSource) -> Value {
        if !cells.has_sheet(range.sheet()) {
            return Value::Error(ErrorKind::InvalidReference);
        }
        match range.cell_count() {
            Some(count) if count <= self.max_range_cells => {}
            _ => return Value::Error(ErrorKind::InvalidReference),
        }
        let values = range
            .cells()
            .map(|cell| cells.cell_value(&range.address_at(cell)))
            .collect();
        match Matrix::new(range.rows(), range.cols(), values) {
            Some(m) => Value::Matrix(m),
            None => Value::Error(ErrorKind::InvalidReference),
        }
    }
}

/// Values of different kinds never compare equal; a blank matches anything
/// it coerces to.
fn same_kind(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Blank, _)
            | (_, Value::Blank)
            | (Value::Number(_), Value::Number(_))
            | (Value::Text(_), Value::Text(_))
            | (Value::Bool(_), Value::Bool(_))
    )
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    let arithmetic = |f: fn(f64, f64) -> Result<f64, ErrorKind>| -> Value {
        match (to_number(left), to_number(right)) {
            (Ok(a), Ok(b)) => f(a, b).map(Value::from).unwrap_or_else(Value::Error),
            (Err(e), _) | (_, Err(e)) => Value::Error(e),
        }
    };
    match op {
        BinaryOp::Add => arithmetic(|a, b| Ok(a + b)),
        BinaryOp::Sub => arithmetic(|a, b| Ok(a - b)),
        BinaryOp::Mul => arithmetic(|a, b| Ok(a * b)),
        BinaryOp::Div => arithmetic(|a, b| {
            if b == 0.0 {
                Err(ErrorKind::DivideByZero)
            } else {
                Ok(a / b)
            }
        }),
        BinaryOp::Pow => arithmetic(checked_pow),
        BinaryOp::Concat => match (to_text(left), to_text(right)) {
            (Ok(a), Ok(b)) => Value::Text(a + &b),
            (Err(e), _) | (_, Err(e)) => Value::Error(e),
        },
        BinaryOp::Eq => Value::Bool(same_kind(left, right) && values_equal(left, right)),
        BinaryOp::Ne => Value::Bool(!(same_kind(left, right) && values_equal(left, right))),
        BinaryOp::Lt => Value::Bool(compare_values(left, right).is_lt()),
        BinaryOp::Gt => Value::Bool(compare_values(left, right).is_gt()),
        BinaryOp::Le => Value::Bool(compare_values(left, right).is_le()),
        BinaryOp::Ge => Value::Bool(compare_values(left, right).is_ge()),
    }
}

/// Parse and evaluate a one-off formula (with or without a leading `=`).
pub fn evaluate_formula(
    source: &str,
    registry: &FunctionRegistry,
    cells: &dyn CellSource,
) -> Result<Value, FormulaError> {
    let expr = parse_formula(source)?;
    Ok(Evaluator::new(registry).evaluate(&expr, cells))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cell::ValueGrid;
    use crate::engine::cell_ref::CellRef;

    fn eval_str(source: &str, grid: &ValueGrid) -> Value {
        let registry = FunctionRegistry::with_builtins();
        evaluate_formula(source, &registry, grid).unwrap()
    }

    fn eval(source: &str) -> Value {
        eval_str(source, &ValueGrid::new())
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(eval("=1+2*3"), Value::Number(7.0));
        assert_eq!(eval("(1+2)*3"), Value::Number(9.0));
        assert_eq!(eval("2^3^2"), Value::Number(64.0));
        assert_eq!(eval("-2^2"), Value::Number(4.0));
        assert_eq!(eval("10/4"), Value::Number(2.5));
        assert_eq!(eval("\"3\"+1"), Value::Number(4.0));
    }

    #[test]
    fn test_arithmetic_errors() {
        assert_eq!(eval("1/0"), Value::Error(ErrorKind::DivideByZero));
        assert_eq!(eval("\"abc\"*2"), Value::Error(ErrorKind::TypeMismatch));
        assert_eq!(eval("(1/0)&\"x\""), Value::Error(ErrorKind::DivideByZero));
    }

    #[test]
    fn test_concat_coerces_to_text() {
        assert_eq!(eval("\"a\"&1.5&TRUE"), Value::text("a1.5TRUE"));
        assert_eq!(eval("0.1+0.2&\"\""), Value::text("0.3"));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("10>5"), Value::Bool(true));
        assert_eq!(eval("\"abc\"=\"ABC\""), Value::Bool(true));
        assert_eq!(eval("FALSE<TRUE"), Value::Bool(true));
        assert_eq!(eval("1=\"1\""), Value::Bool(false));
        assert_eq!(eval("1<>\"1\""), Value::Bool(true));
        assert_eq!(eval("A1=0"), Value::Bool(true));
        assert_eq!(eval("A1=\"\""), Value::Bool(true));
    }

    #[test]
    fn test_functions() {
        assert_eq!(eval("IF(10>5,\"Yes\",\"No\")"), Value::text("Yes"));
        assert_eq!(eval("AVERAGE()"), Value::Error(ErrorKind::DivideByZero));
        assert_eq!(eval("AVERAGE(A1:A5)"), Value::Error(ErrorKind::DivideByZero));
        assert_eq!(eval("NOPE(1)"), Value::Error(ErrorKind::NameNotFound));
        assert_eq!(eval("IFERROR(1/0, \"oops\")"), Value::text("oops"));
    }

    #[test]
    fn test_references_read_grid() {
        let grid = ValueGrid::new();
        grid.set(CellRef::new(0, 0), 10.0);
        grid.set(CellRef::new(0, 1), 20.0);
        grid.set(CellRef::new(0, 2), 30.0);
        assert_eq!(eval_str("SUM(A1:A3)", &grid), Value::Number(60.0));
        assert_eq!(eval_str("A1*2+A2", &grid), Value::Number(40.0));
        assert_eq!(eval_str("INDEX(A1:A3, 2)", &grid), Value::Number(20.0));
    }

    #[test]
    fn test_blank_results_read_as_zero() {
        assert_eq!(eval("B7"), Value::Number(0.0));
        assert_eq!(eval("B7&\"\""), Value::text(""));
    }

    #[test]
    fn test_multi_cell_result_is_type_mismatch() {
        assert_eq!(eval("A1:B2"), Value::Error(ErrorKind::TypeMismatch));
        assert_eq!(eval("A1:A1"), Value::Number(0.0));
    }

    #[test]
    fn test_unresolvable_names() {
        assert_eq!(eval("rate*2"), Value::Error(ErrorKind::NameNotFound));
        assert_eq!(eval("ABCD1"), Value::Error(ErrorKind::InvalidReference));
        assert_eq!(eval("Other!A1"), Value::Error(ErrorKind::InvalidReference));
    }

    #[test]
    fn test_range_limit() {
        let registry = FunctionRegistry::with_builtins();
        let expr = parse_formula("SUM(A1:J10)").unwrap();
        let grid = ValueGrid::new();
        let small = Evaluator::new(&registry).with_max_range_cells(50);
        assert_eq!(small.evaluate(&expr, &grid), Value::Error(ErrorKind::InvalidReference));
        let large = Evaluator::new(&registry).with_max_range_cells(100);
        assert_eq!(large.evaluate(&expr, &grid), Value::Number(0.0));
    }

    #[test]
    fn test_volatile_functions_use_context_clock() {
        let registry = FunctionRegistry::with_builtins();
        let now = chrono::NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|d| d.and_hms_opt(18, 0, 0))
            .unwrap();
        let evaluator = Evaluator::new(&registry).with_context(CallContext::new(now));
        let expr = parse_formula("NOW()-TODAY()").unwrap();
        assert_eq!(evaluator.evaluate(&expr, &ValueGrid::new()), Value::Number(0.75));
    }

    #[test]
    fn test_parse_errors_surface_as_formula_errors() {
        let registry = FunctionRegistry::with_builtins();
        let result = evaluate_formula("=1+", &registry, &ValueGrid::new());
        assert!(matches!(result, Err(FormulaError::UnexpectedEnd { .. })));
    }
}
