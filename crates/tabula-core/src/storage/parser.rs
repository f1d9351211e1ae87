//! Parser for sheet files.
//!
//! One `CELLREF: VALUE` per line, where VALUE is anything a cell accepts
//! (`=formula`, `"quoted text"`, a number, `TRUE`/`FALSE` or plain text).
//! `[Name]` starts a section for another sheet; `#` lines are comments.

use std::fs;
use std::path::Path;

use tabula_engine::engine::CellRef;

use crate::error::{CoreError, Result};

/// One cell assignment read from a sheet file.
#[derive(Clone, Debug, PartialEq)]
pub struct SheetEntry {
    /// Section the line appeared in; `None` before the first header.
    pub sheet: Option<String>,
    pub cell: CellRef,
    /// Cell input text, ready for `Document::set_cell`.
    pub input: String,
}

/// Parse a sheet file, refusing files larger than `max_bytes`.
pub fn parse_sheet_file(path: &Path, max_bytes: u64) -> Result<Vec<SheetEntry>> {
    let meta = fs::metadata(path)?;
    if meta.len() > max_bytes {
        return Err(CoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Refusing to read {}: sheet file too large ({} bytes, max {})",
                path.display(),
                meta.len(),
                max_bytes
            ),
        )));
    }
    let content = fs::read_to_string(path)?;
    parse_sheet_content(&content)
}

/// Parse sheet file content from a string
pub fn parse_sheet_content(content: &str) -> Result<Vec<SheetEntry>> {
    let mut entries = Vec::new();
    let mut sheet: Option<String> = None;

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[') {
            let name = header.strip_suffix(']').map(str::trim).unwrap_or_default();
            if name.is_empty() {
                return Err(CoreError::Parse {
                    line: line_num + 1,
                    message: "Expected '[SheetName]' header".to_string(),
                });
            }
            sheet = Some(name.to_string());
            continue;
        }

        let Some((cell_str, value_str)) = line.split_once(':') else {
            return Err(CoreError::Parse {
                line: line_num + 1,
                message: "Expected 'CELLREF: VALUE' format".to_string(),
            });
        };

        let cell_str = cell_str.trim();
        let cell = CellRef::from_str(cell_str).ok_or_else(|| CoreError::Parse {
            line: line_num + 1,
            message: format!("Invalid cell reference: {}", cell_str),
        })?;

        entries.push(SheetEntry {
            sheet: sheet.clone(),
            cell,
            input: cell_input(value_str.trim()),
        });
    }

    Ok(entries)
}

/// Quoted text is unescaped; everything else is passed through as typed.
fn cell_input(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        format!("\"{}\"", unescape_text(&value[1..value.len() - 1]))
    } else {
        value.to_string()
    }
}

fn unescape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
