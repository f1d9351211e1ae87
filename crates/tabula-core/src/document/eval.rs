//! Recalculation: dirty cells are settled depth-first with an explicit work
//! stack, so dependency chains of any length are safe.
//!
//! A cell reached again while it is still `Evaluating` closes a cycle; every
//! cell on that loop settles on `#CYCLE!`. A cell whose value changed queues
//! its direct dependents, and a pass ends when the queue is empty.

use std::sync::Arc;

use tabula_engine::builtins::CallContext;
use tabula_engine::engine::{
    CellAddress, CellSource, ErrorKind, Evaluator, Expr, Value, detect_cycle, parse_formula,
};

use super::state::{CellId, CellState, Content, SheetId};
use super::Document;
use crate::error::{CoreError, Result};

#[derive(Copy, Clone, Debug)]
struct Frame {
    id: CellId,
    /// Dependencies have been pushed.
    expanded: bool,
}

/// Cell reads from formulas living on `sheet`.
struct SheetView<'a> {
    doc: &'a Document,
    sheet: SheetId,
}

impl CellSource for SheetView<'_> {
    fn cell_value(&self, addr: &CellAddress) -> Value {
        match self.doc.resolve(self.sheet, addr) {
            Some(id) => match self.doc.cells.get(&id) {
                Some(record) if record.cleared => Value::Blank,
                Some(record) => record.value.clone(),
                None => Value::Blank,
            },
            None => Value::Error(ErrorKind::InvalidReference),
        }
    }

    fn is_cleared(&self, addr: &CellAddress) -> bool {
        self.doc
            .resolve(self.sheet, addr)
            .and_then(|id| self.doc.cells.get(&id))
            .is_some_and(|record| record.cleared)
    }

    fn has_sheet(&self, sheet: Option<&str>) -> bool {
        sheet.is_none_or(|name| self.doc.sheet_id(name).is_some())
    }
}

impl Document {
    /// The settled value of a cell, recalculating whatever is dirty first.
    pub fn get_computed_value(&mut self, addr: &str) -> Result<Value> {
        let id = self.cell_id(addr)?;
        self.drain_pending();
        Ok(self.settled_value(id))
    }

    /// Top-level recalculation pass: volatile formulas are recomputed even
    /// when nothing they read has changed.
    pub fn recalculate(&mut self) {
        let mut volatile: Vec<CellId> = self
            .cells
            .iter()
            .filter(|(_, record)| record.volatile)
            .map(|(id, _)| *id)
            .collect();
        volatile.sort_unstable();
        if !volatile.is_empty() {
            log::debug!("re-marking {} volatile cells", volatile.len());
        }
        for id in volatile {
            self.mark_dirty(id);
        }
        self.drain_pending();
    }

    /// Evaluate formula text without storing it (formula-bar preview).
    /// `sheet` names the sheet unqualified references resolve against.
    pub fn evaluate_formula(&mut self, source: &str, sheet: Option<&str>) -> Result<Value> {
        let sheet = match sheet {
            Some(name) => self
                .sheet_id(name)
                .ok_or_else(|| CoreError::UnknownSheet(name.to_string()))?,
            None => self.default_sheet(),
        };
        let expr = parse_formula(source)?;
        self.drain_pending();
        let ctx = self.pass_context();
        Ok(self.evaluate_expr(&expr, sheet, &ctx))
    }

    /// The cells forming a dependency cycle through `addr`, if any.
    pub fn cycle_path(&self, addr: &str) -> Result<Option<Vec<CellAddress>>> {
        let start = self.cell_id(addr)?;
        Ok(self
            .loop_through(start)
            .map(|ids| ids.into_iter().map(|id| self.address_of(id)).collect()))
    }

    pub(crate) fn settled_value(&self, id: CellId) -> Value {
        match self.cells.get(&id) {
            Some(record) if !record.cleared => record.value.clone(),
            _ => Value::Blank,
        }
    }

    fn pass_context(&self) -> CallContext {
        self.call_context
            .clone()
            .unwrap_or_else(CallContext::at_local_now)
    }

    fn evaluate_expr(&self, expr: &Expr, sheet: SheetId, ctx: &CallContext) -> Value {
        let view = SheetView { doc: self, sheet };
        Evaluator::new(&self.registry)
            .with_context(ctx.clone())
            .with_max_range_cells(self.config.max_range_cells)
            .evaluate(expr, &view)
    }

    /// Settle every queued dirty cell.
    pub(crate) fn drain_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let ctx = self.pass_context();
        let before = self.evaluations;
        while let Some(id) = self.pending.pop() {
            self.ensure_clean(id, &ctx);
        }
        log::debug!("recalculated {} cells", self.evaluations - before);
    }

    fn state(&self, id: CellId) -> Option<CellState> {
        self.cells.get(&id).map(|r| r.state)
    }

    fn set_state(&mut self, id: CellId, state: CellState) {
        if let Some(record) = self.cells.get_mut(&id) {
            record.state = state;
        }
    }

    /// Depth-first: a cell is evaluated only after its dirty dependencies.
    fn ensure_clean(&mut self, target: CellId, ctx: &CallContext) {
        let mut stack = vec![Frame {
            id: target,
            expanded: false,
        }];

        while let Some(&Frame { id, expanded }) = stack.last() {
            if expanded {
                stack.pop();
                if self.state(id) == Some(CellState::Evaluating) {
                    self.evaluate_cell(id, ctx);
                }
                continue;
            }

            if self.state(id) != Some(CellState::Dirty) {
                stack.pop();
                continue;
            }
            if let Some(frame) = stack.last_mut() {
                frame.expanded = true;
            }
            self.set_state(id, CellState::Evaluating);

            let mut deps: Vec<CellId> = self
                .cells
                .get(&id)
                .map(|r| r.depends_on.iter().copied().collect())
                .unwrap_or_default();
            deps.sort_unstable();
            for dep in deps {
                match self.state(dep) {
                    Some(CellState::Dirty) => stack.push(Frame {
                        id: dep,
                        expanded: false,
                    }),
                    Some(CellState::Evaluating) => {
                        // `dep` is on the current path: every expanded frame
                        // from it to the top of the stack is on the loop.
                        let start = stack
                            .iter()
                            .position(|f| f.expanded && f.id == dep)
                            .unwrap_or(0);
                        let members: Vec<CellId> = stack[start..]
                            .iter()
                            .filter(|f| f.expanded)
                            .map(|f| f.id)
                            .collect();
                        self.settle_cycle(&members);
                        break;
                    }
                    Some(CellState::Error)
                        if self.settled_value(dep)
                            == Value::Error(ErrorKind::CircularReference) =>
                    {
                        // A loop settled in an earlier pass stays settled
                        // while this cell is still part of it.
                        if let Some(members) = self.loop_through(id) {
                            self.settle_cycle(&members);
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn loop_through(&self, start: CellId) -> Option<Vec<CellId>> {
        detect_cycle(start, |id| {
            let mut deps: Vec<CellId> = self
                .cells
                .get(&id)
                .map(|r| r.depends_on.iter().copied().collect())
                .unwrap_or_default();
            deps.sort_unstable();
            deps
        })
    }

    /// Settle every cell on a dependency loop on `#CYCLE!`.
    fn settle_cycle(&mut self, members: &[CellId]) {
        log::debug!(
            "circular reference through {}",
            members
                .iter()
                .map(|id| self.address_of(*id).to_string())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        let error = Value::Error(ErrorKind::CircularReference);
        for id in members {
            self.settle(*id, error.clone(), CellState::Error);
        }
        for id in members {
            let Some(dependents) = self.dependents.get(id) else {
                continue;
            };
            let mut outside: Vec<CellId> = dependents
                .iter()
                .filter(|d| !members.contains(d))
                .copied()
                .collect();
            outside.sort_unstable();
            for d in outside {
                self.mark_dirty(d);
            }
        }
    }

    fn evaluate_cell(&mut self, id: CellId, ctx: &CallContext) {
        let Some(record) = self.cells.get(&id) else {
            return;
        };
        let value = match &record.content {
            Content::Literal(value) => value.clone(),
            Content::Invalid(_) => Value::Error(ErrorKind::NameNotFound),
            Content::Formula(expr) => {
                let expr = Arc::clone(expr);
                self.evaluations += 1;
                let value = self.evaluate_expr(&expr, id.sheet, ctx);
                log::trace!("{} = {:?}", self.address_of(id), value);
                value
            }
        };
        let state = if value.is_error() {
            CellState::Error
        } else {
            CellState::Clean
        };
        if self.settle(id, value, state) {
            self.mark_dependents_dirty(id);
        }
    }

    /// Store a settled value and publish it. Returns whether it changed.
    fn settle(&mut self, id: CellId, value: Value, state: CellState) -> bool {
        let Some(record) = self.cells.get_mut(&id) else {
            return false;
        };
        record.state = state;
        let changed = record.value != value;
        record.value = value.clone();
        self.value_cache.insert(id, value);
        changed
    }
}
