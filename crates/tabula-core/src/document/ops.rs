use std::collections::HashSet;
use std::sync::Arc;

use tabula_engine::builtins::{Arity, CallContext, Volatility};
use tabula_engine::engine::{
    CellInput, Expr, FormulaError, Reference, Value, called_functions, detect_cycle,
    extract_dependencies, parse_formula,
};

use super::state::{CellId, CellRecord, CellState, Content, SheetId};
use super::Document;
use crate::error::{CoreError, Result};

impl Document {
    /// Add a sheet, or return the existing one with that name (case-insensitive).
    pub fn add_sheet(&mut self, name: &str) -> Result<SheetId> {
        let name = name.trim();
        if name.is_empty() || name.contains(['!', '[', ']']) {
            return Err(CoreError::InvalidSheetName(name.to_string()));
        }
        if let Some(id) = self.sheet_id(name) {
            return Ok(id);
        }
        let id = SheetId(self.sheets.len());
        self.sheets.push(name.to_string());

        // Formulas that referenced this sheet before it existed can now wire up.
        let waiting: Vec<CellId> = self
            .cells
            .iter()
            .filter(|(_, record)| match &record.content {
                Content::Formula(expr) => extract_dependencies(expr)
                    .iter()
                    .any(|r| r.sheet().is_some_and(|s| s.eq_ignore_ascii_case(name))),
                _ => false,
            })
            .map(|(id, _)| *id)
            .collect();
        for cell in waiting {
            self.rewrite(cell);
        }
        Ok(id)
    }

    /// Set cell contents from input text.
    ///
    /// A formula that does not parse is still stored; it evaluates to
    /// `#NAME?` and its parse error is available from [`Document::formula_error`].
    pub fn set_cell(&mut self, addr: &str, input: &str) -> Result<()> {
        let id = self.cell_id(addr)?;
        self.set_cell_at(id, input);
        Ok(())
    }

    pub fn set_cell_at(&mut self, id: CellId, input: &str) {
        self.remove_edges(id);

        let (content, depends_on, volatile) = self.compile(id.sheet, input);
        for dep in &depends_on {
            self.dependents.entry(*dep).or_default().insert(id);
        }
        let value = self
            .cells
            .get(&id)
            .filter(|r| !r.cleared)
            .map(|r| r.value.clone())
            .unwrap_or(Value::Blank);
        self.cells.insert(
            id,
            CellRecord {
                raw: input.to_string(),
                content,
                value,
                state: CellState::Clean,
                depends_on,
                volatile,
                cleared: false,
            },
        );

        self.mark_dirty(id);
        self.mark_dependents_dirty(id);

        // A write can close a loop through cells that are still Clean; the
        // whole loop has to be walked again for it to surface as `#CYCLE!`.
        if let Some(members) = self.loop_closed_by(id) {
            log::debug!(
                "write to {} closes a loop of {} cells",
                self.address_of(id),
                members.len()
            );
            for member in members {
                self.mark_dirty(member);
            }
        }
    }

    /// The loop through `id`, found by following dependents from it.
    fn loop_closed_by(&self, id: CellId) -> Option<Vec<CellId>> {
        let record = self.cells.get(&id)?;
        if record.depends_on.is_empty() || !self.dependents.contains_key(&id) {
            return None;
        }
        detect_cycle(id, |cell| {
            let mut next: Vec<CellId> = self
                .dependents
                .get(&cell)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
            next.sort_unstable();
            next
        })
    }

    /// Clear a cell. A cell other formulas still reference stays behind as a
    /// tombstone so those references report `#REF!`.
    pub fn clear_cell(&mut self, addr: &str) -> Result<()> {
        let id = self.cell_id(addr)?;
        if !self.cells.contains_key(&id) {
            return Ok(());
        }
        self.remove_edges(id);
        self.value_cache.remove(&id);
        if self.dependents.contains_key(&id) {
            self.cells.insert(id, CellRecord::tombstone());
            self.mark_dependents_dirty(id);
        } else {
            self.cells.remove(&id);
        }
        Ok(())
    }

    /// The text last written to a cell; empty for unwritten or cleared cells.
    pub fn get_raw_value(&self, addr: &str) -> Result<String> {
        let id = self.cell_id(addr)?;
        Ok(self.cells.get(&id).map(|r| r.raw.clone()).unwrap_or_default())
    }

    /// How the cell's input was classified.
    pub fn get_input(&self, addr: &str) -> Result<CellInput> {
        let id = self.cell_id(addr)?;
        Ok(self
            .cells
            .get(&id)
            .map(|r| CellInput::from_input(&r.raw))
            .unwrap_or(CellInput::Blank))
    }

    /// The parse error of a stored formula, if it has one.
    pub fn formula_error(&self, addr: &str) -> Result<Option<FormulaError>> {
        let id = self.cell_id(addr)?;
        Ok(self.cells.get(&id).and_then(|r| match &r.content {
            Content::Invalid(e) => Some(e.clone()),
            _ => None,
        }))
    }

    /// Register (or replace) a host function. Formulas already calling it
    /// are recompiled so their volatility and values pick it up.
    pub fn register_function<F>(&mut self, name: &str, arity: Arity, volatility: Volatility, f: F)
    where
        F: Fn(&[Value], &CallContext) -> Value + Send + Sync + 'static,
    {
        self.registry.register(name, arity, volatility, f);
        let upper = name.to_ascii_uppercase();
        let callers: Vec<CellId> = self
            .cells
            .iter()
            .filter(|(_, record)| match &record.content {
                Content::Formula(expr) => called_functions(expr).contains(&upper),
                _ => false,
            })
            .map(|(id, _)| *id)
            .collect();
        for cell in callers {
            self.rewrite(cell);
        }
    }

    /// Recompile a cell from its stored input.
    fn rewrite(&mut self, id: CellId) {
        if let Some(raw) = self.cells.get(&id).map(|r| r.raw.clone()) {
            self.set_cell_at(id, &raw);
        }
    }

    fn compile(&self, sheet: SheetId, raw: &str) -> (Content, HashSet<CellId>, bool) {
        match CellInput::from_input(raw) {
            CellInput::Formula(source) => match parse_formula(&source) {
                Ok(expr) => {
                    let depends_on = self.precedents(sheet, &expr);
                    let volatile = called_functions(&expr)
                        .iter()
                        .any(|name| self.registry.is_volatile(name));
                    (Content::Formula(Arc::new(expr)), depends_on, volatile)
                }
                Err(e) => {
                    log::warn!("formula ={} does not parse: {}", source, e);
                    (Content::Invalid(e), HashSet::new(), false)
                }
            },
            input => (
                Content::Literal(input.literal_value().unwrap_or(Value::Blank)),
                HashSet::new(),
                false,
            ),
        }
    }

    /// Every cell a formula on `sheet` reads. Ranges over the size limit and
    /// references to unknown sheets contribute nothing.
    fn precedents(&self, sheet: SheetId, expr: &Expr) -> HashSet<CellId> {
        let mut out = HashSet::new();
        for reference in extract_dependencies(expr) {
            match reference {
                Reference::Cell(addr) => {
                    if let Some(id) = self.resolve(sheet, &addr) {
                        out.insert(id);
                    }
                }
                Reference::Range(range) => {
                    let target = match range.sheet() {
                        Some(name) => self.sheet_id(name),
                        None => Some(sheet),
                    };
                    let Some(target) = target else { continue };
                    match range.cell_count() {
                        Some(n) if n <= self.config.max_range_cells => {
                            out.extend(range.cells().map(|cell| CellId::new(target, cell)));
                        }
                        _ => {}
                    }
                }
            }
        }
        out
    }

    /// Drop a cell's outgoing edges, and any tombstone left without dependents.
    fn remove_edges(&mut self, id: CellId) {
        let Some(record) = self.cells.get_mut(&id) else {
            return;
        };
        let old = std::mem::take(&mut record.depends_on);
        for dep in old {
            let Some(set) = self.dependents.get_mut(&dep) else {
                continue;
            };
            set.remove(&id);
            if set.is_empty() {
                self.dependents.remove(&dep);
                if self.cells.get(&dep).is_some_and(|r| r.cleared) {
                    self.cells.remove(&dep);
                }
            }
        }
    }

    /// Queue a settled cell for re-evaluation. Its value leaves the shared
    /// cache until it settles again.
    pub(crate) fn mark_dirty(&mut self, id: CellId) {
        if let Some(record) = self.cells.get_mut(&id) {
            if matches!(record.state, CellState::Clean | CellState::Error) {
                record.state = CellState::Dirty;
                self.pending.push(id);
                self.value_cache.remove(&id);
            }
        }
    }

    /// Mark the cells that read `id` directly as dirty.
    pub(crate) fn mark_dependents_dirty(&mut self, id: CellId) {
        let Some(deps) = self.dependents.get(&id) else {
            return;
        };
        let mut deps: Vec<CellId> = deps.iter().copied().collect();
        deps.sort_unstable();
        for dep in deps {
            self.mark_dirty(dep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Document;
    use crate::error::CoreError;
    use tabula_engine::engine::{CellInput, Value};

    #[test]
    fn test_set_cell_rejects_bad_addresses() {
        let mut doc = Document::new();
        assert!(matches!(
            doc.set_cell("A0", "1"),
            Err(CoreError::InvalidAddress(_))
        ));
        assert!(matches!(
            doc.set_cell("Missing!A1", "1"),
            Err(CoreError::UnknownSheet(_))
        ));
    }

    #[test]
    fn test_input_classification() {
        let mut doc = Document::new();
        doc.set_cell("A1", "42").unwrap();
        doc.set_cell("A2", "\"42\"").unwrap();
        doc.set_cell("A3", "true").unwrap();
        doc.set_cell("A4", "=A1").unwrap();
        doc.set_cell("A5", "hello").unwrap();
        assert_eq!(doc.get_input("A1").unwrap(), CellInput::Number(42.0));
        assert_eq!(doc.get_input("A2").unwrap(), CellInput::Text("42".to_string()));
        assert_eq!(doc.get_input("A3").unwrap(), CellInput::Bool(true));
        assert_eq!(doc.get_input("A4").unwrap(), CellInput::Formula("A1".to_string()));
        assert_eq!(doc.get_input("A6").unwrap(), CellInput::Blank);
        assert_eq!(doc.get_computed_value("A2").unwrap(), Value::text("42"));
        assert_eq!(doc.get_computed_value("A5").unwrap(), Value::text("hello"));
    }

    #[test]
    fn test_add_sheet_names() {
        let mut doc = Document::new();
        let data = doc.add_sheet("Data").unwrap();
        assert_eq!(doc.add_sheet("DATA").unwrap(), data);
        assert_eq!(doc.sheet_names(), &["Sheet1".to_string(), "Data".to_string()]);
        assert!(matches!(doc.add_sheet(""), Err(CoreError::InvalidSheetName(_))));
        assert!(matches!(
            doc.add_sheet("a!b"),
            Err(CoreError::InvalidSheetName(_))
        ));
    }

    #[test]
    fn test_rewrite_drops_old_edges() {
        let mut doc = Document::new();
        doc.set_cell("B1", "=A1").unwrap();
        doc.set_cell("B1", "=A2").unwrap();
        let a1 = doc.cell_id("A1").unwrap();
        let a2 = doc.cell_id("A2").unwrap();
        let b1 = doc.cell_id("B1").unwrap();
        assert!(!doc.dependents.contains_key(&a1));
        assert!(doc.dependents[&a2].contains(&b1));
    }

    #[test]
    fn test_tombstone_dropped_with_last_dependent() {
        let mut doc = Document::new();
        doc.set_cell("A1", "5").unwrap();
        doc.set_cell("B1", "=A1").unwrap();
        doc.clear_cell("A1").unwrap();
        assert!(doc.cell_state("A1").unwrap().is_some());

        doc.set_cell("B1", "1").unwrap();
        assert!(doc.cell_state("A1").unwrap().is_none());

        // Unreferenced cells are removed outright.
        doc.clear_cell("B1").unwrap();
        assert!(doc.cell_state("B1").unwrap().is_none());
    }
}
