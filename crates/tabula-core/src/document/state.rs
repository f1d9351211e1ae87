use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tabula_engine::builtins::{CallContext, FunctionRegistry};
use tabula_engine::engine::{CellAddress, CellRef, Expr, FormulaError, Value};

use crate::config::EngineConfig;
use crate::error::{CoreError, Result};

/// Index of a sheet within its document.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SheetId(pub(crate) usize);

/// A cell position qualified by its sheet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId {
    pub sheet: SheetId,
    pub cell: CellRef,
}

impl CellId {
    pub fn new(sheet: SheetId, cell: CellRef) -> Self {
        CellId { sheet, cell }
    }
}

/// Recalculation state of a cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CellState {
    Clean,
    Dirty,
    Evaluating,
    /// Settled on an error value.
    Error,
}

/// What a cell holds once its input has been compiled.
#[derive(Clone, Debug)]
pub(crate) enum Content {
    Literal(Value),
    Formula(Arc<Expr>),
    /// A formula that failed to parse.
    Invalid(FormulaError),
}

#[derive(Clone, Debug)]
pub(crate) struct CellRecord {
    pub raw: String,
    pub content: Content,
    pub value: Value,
    pub state: CellState,
    /// Cells this one reads (range references expanded).
    pub depends_on: HashSet<CellId>,
    /// Calls a volatile function.
    pub volatile: bool,
    /// Cleared while other formulas still referenced it.
    pub cleared: bool,
}

impl CellRecord {
    pub fn tombstone() -> Self {
        CellRecord {
            raw: String::new(),
            content: Content::Literal(Value::Blank),
            value: Value::Blank,
            state: CellState::Clean,
            depends_on: HashSet::new(),
            volatile: false,
            cleared: true,
        }
    }
}

/// Settled values shared with concurrent readers. A cell waiting for
/// recalculation has no entry.
pub type ValueCache = Arc<DashMap<CellId, Value>>;

/// One spreadsheet session: its sheets, cells, dependency graph and
/// function registry.
///
/// Writes go through `&mut self`; a single writer drives recalculation while
/// other threads may read settled values from [`Document::value_cache`].
pub struct Document {
    pub(crate) config: EngineConfig,
    pub(crate) registry: FunctionRegistry,
    /// Sheet names, indexed by `SheetId`
    pub(crate) sheets: Vec<String>,
    pub(crate) cells: HashMap<CellId, CellRecord>,
    /// Reverse dependency map: cell -> cells that depend on it
    pub(crate) dependents: HashMap<CellId, HashSet<CellId>>,
    /// Dirty cells waiting for the next recalculation pass
    pub(crate) pending: Vec<CellId>,
    pub(crate) value_cache: ValueCache,
    /// Fixed clock for volatile functions; `None` reads the local time per pass.
    pub(crate) call_context: Option<CallContext>,
    pub(crate) evaluations: u64,
}

impl Document {
    /// Create an empty document with one sheet and the builtin functions.
    pub fn new() -> Self {
        Document::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let default_sheet = if config.default_sheet.trim().is_empty() {
            EngineConfig::default().default_sheet
        } else {
            config.default_sheet.trim().to_string()
        };
        Document {
            config,
            registry: FunctionRegistry::with_builtins(),
            sheets: vec![default_sheet],
            cells: HashMap::new(),
            dependents: HashMap::new(),
            pending: Vec::new(),
            value_cache: ValueCache::default(),
            call_context: None,
            evaluations: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Shared handle to settled values, readable from other threads.
    pub fn value_cache(&self) -> ValueCache {
        self.value_cache.clone()
    }

    /// Freeze the clock seen by `TODAY`/`NOW`, or unfreeze with `None`.
    pub fn set_call_context(&mut self, ctx: Option<CallContext>) {
        self.call_context = ctx;
    }

    /// Number of formula evaluations performed so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.sheets
    }

    pub fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.sheets
            .iter()
            .position(|s| s.eq_ignore_ascii_case(name))
            .map(SheetId)
    }

    pub fn sheet_name(&self, id: SheetId) -> Option<&str> {
        self.sheets.get(id.0).map(String::as_str)
    }

    pub fn default_sheet(&self) -> SheetId {
        SheetId(0)
    }

    /// Resolve address text (`A1`, `Sheet2!B3`, `'My Sheet'!C4`) against the
    /// default sheet.
    pub fn cell_id(&self, addr: &str) -> Result<CellId> {
        let parsed =
            CellAddress::parse(addr.trim()).map_err(|_| CoreError::InvalidAddress(addr.to_string()))?;
        self.resolve(self.default_sheet(), &parsed)
            .ok_or_else(|| CoreError::UnknownSheet(parsed.sheet.unwrap_or_default()))
    }

    /// Resolve a parsed address as seen from a cell on `sheet`.
    pub(crate) fn resolve(&self, sheet: SheetId, addr: &CellAddress) -> Option<CellId> {
        let sheet = match &addr.sheet {
            Some(name) => self.sheet_id(name)?,
            None => sheet,
        };
        Some(CellId::new(sheet, addr.cell_ref()))
    }

    /// The sheet-qualified address of a cell.
    pub fn address_of(&self, id: CellId) -> CellAddress {
        let addr = CellAddress::new(id.cell.col, id.cell.row);
        match self.sheet_name(id.sheet) {
            Some(name) => addr.with_sheet(name),
            None => addr,
        }
    }

    pub fn cell_state(&self, addr: &str) -> Result<Option<CellState>> {
        let id = self.cell_id(addr)?;
        Ok(self.cells.get(&id).map(|r| r.state))
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
