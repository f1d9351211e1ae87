use std::path::Path;

use tabula_engine::engine::Value;

use super::Document;
use super::state::{CellId, SheetId};
use crate::error::Result;
use crate::storage::{SheetEntry, parse_sheet_content, parse_sheet_file};

impl Document {
    /// Load a sheet file into this document as one batch of writes followed
    /// by a single recalculation pass. Returns the number of cells written.
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let entries = parse_sheet_file(path, self.config.max_file_bytes)?;
        let count = self.apply_entries(entries)?;
        log::debug!("loaded {} cells from {}", count, path.display());
        Ok(count)
    }

    /// Like [`Document::load_file`], from sheet file content.
    pub fn load_str(&mut self, content: &str) -> Result<usize> {
        let entries = parse_sheet_content(content)?;
        self.apply_entries(entries)
    }

    fn apply_entries(&mut self, entries: Vec<SheetEntry>) -> Result<usize> {
        // Create every sheet first so cross-sheet formulas wire up on write.
        for entry in &entries {
            if let Some(name) = &entry.sheet {
                self.add_sheet(name)?;
            }
        }
        let count = entries.len();
        for entry in entries {
            let sheet = self.ensure_sheet(entry.sheet.as_deref())?;
            self.set_cell_at(CellId::new(sheet, entry.cell), &entry.input);
        }
        self.recalculate();
        Ok(count)
    }

    /// Every written cell with its settled value, sheet by sheet in
    /// row-major order.
    pub fn cells_in_order(&mut self) -> Vec<(CellId, Value)> {
        self.drain_pending();
        let mut ids: Vec<CellId> = self
            .cells
            .iter()
            .filter(|(_, record)| !record.cleared)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable_by_key(|id: &CellId| (id.sheet, id.cell.row, id.cell.col));
        ids.into_iter()
            .map(|id| (id, self.settled_value(id)))
            .collect()
    }

    fn ensure_sheet(&mut self, name: Option<&str>) -> Result<SheetId> {
        match name {
            Some(name) => self.add_sheet(name),
            None => Ok(self.default_sheet()),
        }
    }
}
