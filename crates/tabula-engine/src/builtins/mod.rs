//! Built-in spreadsheet functions and the registry that dispatches them.
//!
//! Conventions:
//! - Spreadsheet-facing names are ALL CAPS (e.g. `SUM`, `VLOOKUP`); lookups
//!   are case-insensitive.
//! - Every builtin is a plain `fn(&[Value], &CallContext) -> Value` listed in
//!   [`BUILTINS`] together with its arity, argument policy and volatility.
//!   If you add a new builtin, add a row there.
//! - Implementations are pure given their arguments; only rows marked
//!   volatile may look at the clock or the RNG.

mod conditional;
mod date;
mod logical;
mod lookup;
mod math;
mod text;

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::engine::{ErrorKind, Matrix, Value, parse_numeric_text, to_number, to_text};

pub use date::{date_to_serial, serial_to_date};
pub(crate) use math::checked_pow;

/// Per-call environment handed to function implementations.
#[derive(Clone, Debug)]
pub struct CallContext {
    /// Wall-clock time frozen for the whole evaluation.
    pub now: NaiveDateTime,
}

impl CallContext {
    pub fn new(now: NaiveDateTime) -> Self {
        CallContext { now }
    }

    pub fn at_local_now() -> Self {
        CallContext::new(chrono::Local::now().naive_local())
    }
}

/// Allowed argument counts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Between(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::Between(lo, hi) => (lo..=hi).contains(&count),
            Arity::AtLeast(n) => count >= n,
        }
    }
}

/// What a function accepts, applied by the evaluator before the call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgPolicy {
    /// Ranges arrive as matrices for the callee to flatten; a scalar error
    /// argument short-circuits the call.
    Aggregate,
    /// Every argument must be a scalar: 1x1 ranges are unwrapped, larger ones
    /// are a TypeMismatch. Errors short-circuit.
    Scalar,
    /// Ranges stay intact for positional access; scalar errors short-circuit.
    Lookup,
    /// Arguments are passed through untouched, errors included.
    Raw,
}

impl ArgPolicy {
    pub fn apply(self, args: Vec<Value>) -> Result<Vec<Value>, ErrorKind> {
        match self {
            ArgPolicy::Raw => Ok(args),
            ArgPolicy::Aggregate | ArgPolicy::Lookup => {
                if let Some(err) = args.iter().find_map(Value::error) {
                    return Err(err);
                }
                Ok(args)
            }
            ArgPolicy::Scalar => args
                .into_iter()
                .map(|arg| match arg.into_scalar() {
                    Value::Error(e) => Err(e),
                    scalar => Ok(scalar),
                })
                .collect(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Volatility {
    Stable,
    /// Recomputed on every recalculation pass.
    Volatile,
}

pub type FunctionImpl = Arc<dyn Fn(&[Value], &CallContext) -> Value + Send + Sync>;

/// A registered function.
#[derive(Clone)]
pub struct FunctionSpec {
    pub name: String,
    pub arity: Arity,
    pub policy: ArgPolicy,
    pub volatility: Volatility,
    implementation: FunctionImpl,
}

impl FunctionSpec {
    pub fn new(
        name: &str,
        arity: Arity,
        policy: ArgPolicy,
        volatility: Volatility,
        implementation: FunctionImpl,
    ) -> Self {
        FunctionSpec {
            name: name.to_ascii_uppercase(),
            arity,
            policy,
            volatility,
            implementation,
        }
    }

    pub fn is_volatile(&self) -> bool {
        self.volatility == Volatility::Volatile
    }

    /// Check arity, apply the argument policy and run the implementation.
    pub fn call(&self, args: Vec<Value>, ctx: &CallContext) -> Value {
        if !self.arity.accepts(args.len()) {
            return Value::Error(ErrorKind::TypeMismatch);
        }
        match self.policy.apply(args) {
            Ok(args) => (self.implementation)(&args, ctx),
            Err(e) => Value::Error(e),
        }
    }
}

impl fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("policy", &self.policy)
            .field("volatility", &self.volatility)
            .finish_non_exhaustive()
    }
}

/// A row in the builtin table.
pub struct Builtin {
    pub name: &'static str,
    pub arity: Arity,
    pub policy: ArgPolicy,
    pub volatility: Volatility,
    #[allow(dead_code)]
    pub description: &'static str,
    pub func: fn(&[Value], &CallContext) -> Value,
}

macro_rules! builtin {
    ($name:literal, $arity:expr, $policy:ident, $func:path, $desc:literal) => {
        Builtin {
            name: $name,
            arity: $arity,
            policy: ArgPolicy::$policy,
            volatility: Volatility::Stable,
            description: $desc,
            func: $func,
        }
    };
    ($name:literal, $arity:expr, $policy:ident, $func:path, $desc:literal, volatile) => {
        Builtin {
            name: $name,
            arity: $arity,
            policy: ArgPolicy::$policy,
            volatility: Volatility::Volatile,
            description: $desc,
            func: $func,
        }
    };
}

use Arity::{AtLeast, Between, Exact};

pub const BUILTINS: &[Builtin] = &[
    // Numeric aggregates
    builtin!("SUM", AtLeast(0), Aggregate, math::sum, "Sum of numeric values"),
    builtin!("AVERAGE", AtLeast(0), Aggregate, math::average, "Mean of numeric values"),
    builtin!("COUNT", AtLeast(0), Raw, math::count, "Count of numeric values"),
    builtin!("COUNTA", AtLeast(0), Raw, math::counta, "Count of non-empty values"),
    builtin!("MAX", AtLeast(0), Aggregate, math::max, "Largest numeric value"),
    builtin!("MIN", AtLeast(0), Aggregate, math::min, "Smallest numeric value"),
    builtin!("PRODUCT", AtLeast(0), Aggregate, math::product, "Product of numeric values"),
    builtin!("ROUND", Between(1, 2), Scalar, math::round, "Round half away from zero"),
    builtin!("ABS", Exact(1), Scalar, math::abs, "Absolute value"),
    builtin!("POWER", Exact(2), Scalar, math::power, "Raise to a power"),
    builtin!("SQRT", Exact(1), Scalar, math::sqrt, "Square root"),
    builtin!("MOD", Exact(2), Scalar, math::modulo, "Remainder with the divisor's sign"),
    builtin!("RAND", Exact(0), Scalar, math::rand, "Uniform random number in [0, 1)", volatile),
    builtin!("RANDBETWEEN", Exact(2), Scalar, math::randbetween, "Random integer in [low, high]", volatile),
    // Logical
    builtin!("IF", Between(2, 3), Raw, logical::if_fn, "Choose a branch by condition"),
    builtin!("AND", AtLeast(1), Aggregate, logical::and, "True if every argument is true"),
    builtin!("OR", AtLeast(1), Aggregate, logical::or, "True if any argument is true"),
    builtin!("NOT", Exact(1), Scalar, logical::not, "Logical negation"),
    builtin!("IFS", AtLeast(2), Raw, logical::ifs, "First value whose condition is true"),
    builtin!("IFERROR", Exact(2), Raw, logical::iferror, "Fallback when the value is an error"),
    builtin!("IFNA", Exact(2), Raw, logical::ifna, "Fallback when the value is #N/A"),
    // Lookup
    builtin!("VLOOKUP", Between(3, 4), Lookup, lookup::vlookup, "Look up a row by its first column"),
    builtin!("HLOOKUP", Between(3, 4), Lookup, lookup::hlookup, "Look up a column by its first row"),
    builtin!("INDEX", Between(2, 3), Lookup, lookup::index, "Value at a row/column position"),
    builtin!("MATCH", Between(2, 3), Lookup, lookup::match_fn, "Position of a value in a vector"),
    // Text
    builtin!("CONCAT", AtLeast(1), Aggregate, text::concat, "Join values as text"),
    builtin!("CONCATENATE", AtLeast(1), Aggregate, text::concat, "Join values as text"),
    builtin!("LEFT", Between(1, 2), Scalar, text::left, "Leading characters"),
    builtin!("RIGHT", Between(1, 2), Scalar, text::right, "Trailing characters"),
    builtin!("MID", Exact(3), Scalar, text::mid, "Characters from a position"),
    builtin!("LEN", Exact(1), Scalar, text::len, "Number of characters"),
    builtin!("TRIM", Exact(1), Scalar, text::trim, "Strip and collapse spaces"),
    builtin!("UPPER", Exact(1), Scalar, text::upper, "Upper-case text"),
    builtin!("LOWER", Exact(1), Scalar, text::lower, "Lower-case text"),
    builtin!("PROPER", Exact(1), Scalar, text::proper, "Capitalize each word"),
    builtin!("SUBSTITUTE", Between(3, 4), Scalar, text::substitute, "Replace occurrences of text"),
    // Date
    builtin!("TODAY", Exact(0), Scalar, date::today, "Current date serial", volatile),
    builtin!("NOW", Exact(0), Scalar, date::now, "Current date-time serial", volatile),
    builtin!("DATE", Exact(3), Scalar, date::date, "Serial for a year/month/day"),
    builtin!("YEAR", Exact(1), Scalar, date::year, "Year of a date"),
    builtin!("MONTH", Exact(1), Scalar, date::month, "Month of a date"),
    builtin!("DAY", Exact(1), Scalar, date::day, "Day of a date"),
    builtin!("DATEDIF", Exact(3), Scalar, date::datedif, "Difference between dates in D, M or Y"),
    // Conditional aggregates
    builtin!("SUMIF", Between(2, 3), Lookup, conditional::sumif, "Sum where criteria match"),
    builtin!("COUNTIF", Exact(2), Lookup, conditional::countif, "Count where criteria match"),
    builtin!("AVERAGEIF", Between(2, 3), Lookup, conditional::averageif, "Mean where criteria match"),
];

/// Name -> function table. One registry is shared by every evaluation in a
/// document; hosts extend it through [`FunctionRegistry::register`].
#[derive(Clone, Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionSpec>,
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        FunctionRegistry::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = FunctionRegistry::empty();
        for builtin in BUILTINS {
            let func = builtin.func;
            registry.insert(FunctionSpec::new(
                builtin.name,
                builtin.arity,
                builtin.policy,
                builtin.volatility,
                Arc::new(func),
            ));
        }
        registry
    }

    /// Register (or replace) a host-defined function. Custom functions get
    /// ranges as matrices and never see error arguments.
    pub fn register<F>(&mut self, name: &str, arity: Arity, volatility: Volatility, implementation: F)
    where
        F: Fn(&[Value], &CallContext) -> Value + Send + Sync + 'static,
    {
        self.insert(FunctionSpec::new(
            name,
            arity,
            ArgPolicy::Aggregate,
            volatility,
            Arc::new(implementation),
        ));
    }

    pub fn insert(&mut self, spec: FunctionSpec) {
        if self.functions.contains_key(&spec.name) {
            log::debug!("replacing function {}", spec.name);
        }
        self.functions.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.get(&name.to_ascii_uppercase())
    }

    pub fn is_volatile(&self, name: &str) -> bool {
        self.get(name).is_some_and(FunctionSpec::is_volatile)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Every argument value, ranges flattened row-major. The flag tells whether
/// the value came out of a range.
pub(crate) fn flatten(args: &[Value]) -> impl Iterator<Item = (&Value, bool)> {
    args.iter().flat_map(|arg| {
        let (items, from_range): (&[Value], bool) = match arg {
            Value::Matrix(m) => (m.values(), true),
            scalar => (std::slice::from_ref(scalar), false),
        };
        items.iter().map(move |v| (v, from_range))
    })
}

/// Aggregate numeric coercion: numbers count, numeric-looking text counts,
/// booleans count only when passed directly, everything else is skipped.
/// Errors anywhere abort the aggregate.
pub(crate) fn collect_numbers(args: &[Value]) -> Result<Vec<f64>, ErrorKind> {
    let mut out = Vec::new();
    for (value, from_range) in flatten(args) {
        match value {
            Value::Number(n) => out.push(*n),
            Value::Text(s) => {
                if let Some(n) = parse_numeric_text(s) {
                    out.push(n);
                }
            }
            Value::Bool(b) if !from_range => out.push(if *b { 1.0 } else { 0.0 }),
            Value::Error(e) => return Err(*e),
            _ => {}
        }
    }
    Ok(out)
}

pub(crate) fn number_arg(args: &[Value], index: usize) -> Result<f64, ErrorKind> {
    args.get(index).map_or(Err(ErrorKind::TypeMismatch), to_number)
}

pub(crate) fn number_arg_or(args: &[Value], index: usize, default: f64) -> Result<f64, ErrorKind> {
    match args.get(index) {
        Some(value) => to_number(value),
        None => Ok(default),
    }
}

pub(crate) fn text_arg(args: &[Value], index: usize) -> Result<String, ErrorKind> {
    args.get(index).map_or(Err(ErrorKind::TypeMismatch), to_text)
}

/// A matrix argument, treating a scalar as a 1x1 block.
pub(crate) fn matrix_arg(args: &[Value], index: usize) -> Result<Matrix, ErrorKind> {
    match args.get(index) {
        Some(Value::Matrix(m)) => Ok(m.clone()),
        Some(Value::Error(e)) => Err(*e),
        Some(scalar) => Matrix::new(1, 1, vec![scalar.clone()]).ok_or(ErrorKind::TypeMismatch),
        None => Err(ErrorKind::TypeMismatch),
    }
}

/// Convert a numeric result, mapping NaN/infinity to TypeMismatch.
pub(crate) fn number_result(n: Result<f64, ErrorKind>) -> Value {
    match n {
        Ok(n) => Value::from(n),
        Err(e) => Value::Error(e),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::NaiveDate;

    pub fn ctx() -> CallContext {
        let now = NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        CallContext::new(now)
    }

    pub fn call(name: &str, args: Vec<Value>) -> Value {
        let registry = FunctionRegistry::with_builtins();
        registry.get(name).unwrap().call(args, &ctx())
    }

    pub fn n(x: f64) -> Value {
        Value::Number(x)
    }

    pub fn t(s: &str) -> Value {
        Value::text(s)
    }

    pub fn column(values: Vec<Value>) -> Value {
        let rows = values.len();
        Value::Matrix(Matrix::new(rows, 1, values).unwrap())
    }

    pub fn table(rows: Vec<Vec<Value>>) -> Value {
        Value::Matrix(Matrix::from_rows(rows).unwrap())
    }
}
