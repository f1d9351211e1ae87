//! Cell reference parsing and formatting.
//!
//! Provides bidirectional conversion between spreadsheet-style references
//! (e.g. `A1`, `$B$2`, `Sheet2!AA100`, `'My Sheet'!C3:D9`) and zero-indexed
//! column/row coordinates.
//!
//! # Examples
//!
//! ```
//! use tabula_engine::engine::{CellAddress, CellRef};
//!
//! let addr = CellAddress::parse("$B3").unwrap();
//! assert_eq!(addr.cell_ref(), CellRef::new(1, 2));
//! assert!(addr.col_absolute);
//! assert_eq!(addr.to_string(), "$B3");
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use super::value::ErrorKind;

/// Highest 1-based column reachable with three letters (`ZZZ`).
pub const MAX_COLUMNS: usize = 18_278;
/// Highest 1-based row number accepted in a reference.
pub const MAX_ROWS: usize = 1_048_576;

/// A position in a sheet by column and row indices (0-indexed).
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    pub fn new(col: usize, row: usize) -> CellRef {
        CellRef { row, col }
    }

    /// Parse a plain cell reference (e.g. "A1", "b2", "AA10").
    /// Returns None if the input is invalid.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(name: &str) -> Option<CellRef> {
        let addr = CellAddress::parse(name).ok()?;
        if addr.sheet.is_some() {
            return None;
        }
        Some(addr.cell_ref())
    }

    /// Convert column index to spreadsheet-style letters (0 -> A, 25 -> Z, 26 -> AA).
    pub fn col_to_letters(col: usize) -> String {
        let mut result = String::new();
        let mut n = col as u128 + 1;
        while n > 0 {
            n -= 1;
            result.insert(0, (b'A' + (n % 26) as u8) as char);
            n /= 26;
        }
        result
    }

    /// Convert spreadsheet letters to a 0-indexed column (A -> 0, AA -> 26).
    pub fn letters_to_col(letters: &str) -> Option<usize> {
        if letters.is_empty() {
            return None;
        }
        let mut acc = 0usize;
        for c in letters.bytes() {
            if !c.is_ascii_alphabetic() {
                return None;
            }
            let digit = (c.to_ascii_uppercase() - b'A') as usize + 1;
            acc = acc.checked_mul(26)?.checked_add(digit)?;
        }
        acc.checked_sub(1)
    }
}

impl std::str::FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellRef::from_str(s).ok_or_else(|| format!("Invalid cell reference: {}", s))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", CellRef::col_to_letters(self.col), self.row + 1)
    }
}

/// A cell reference as written in a formula: optional sheet qualifier plus
/// `$` anchoring on either axis.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CellAddress {
    pub sheet: Option<String>,
    pub col: usize,
    pub row: usize,
    pub col_absolute: bool,
    pub row_absolute: bool,
}

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?<sheet>'(?:[^']|'')+'|[A-Za-z_][A-Za-z0-9_.]*)!)?(?<cabs>\$)?(?<letters>[A-Za-z]{1,3})(?<rabs>\$)?(?<numbers>[0-9]+)$",
        )
        .expect("cell address regex must compile")
    })
}

impl CellAddress {
    /// A relative, unqualified address.
    pub fn new(col: usize, row: usize) -> CellAddress {
        CellAddress {
            sheet: None,
            col,
            row,
            col_absolute: false,
            row_absolute: false,
        }
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> CellAddress {
        self.sheet = Some(sheet.into());
        self
    }

    /// Parse `[Sheet!][$]COL[$]ROW`. Anything malformed (including row 0 or an
    /// empty string) is an InvalidReference.
    pub fn parse(text: &str) -> Result<CellAddress, ErrorKind> {
        let caps = address_re()
            .captures(text.trim())
            .ok_or(ErrorKind::InvalidReference)?;

        let col = CellRef::letters_to_col(&caps["letters"]).ok_or(ErrorKind::InvalidReference)?;
        let row_number = caps["numbers"]
            .parse::<usize>()
            .map_err(|_| ErrorKind::InvalidReference)?;
        if row_number == 0 || row_number > MAX_ROWS {
            return Err(ErrorKind::InvalidReference);
        }

        let sheet = caps.name("sheet").map(|m| unquote_sheet(m.as_str()));

        Ok(CellAddress {
            sheet,
            col,
            row: row_number - 1,
            col_absolute: caps.name("cabs").is_some(),
            row_absolute: caps.name("rabs").is_some(),
        })
    }

    pub fn cell_ref(&self) -> CellRef {
        CellRef::new(self.col, self.row)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", quote_sheet(sheet))?;
        }
        write!(
            f,
            "{}{}{}{}",
            if self.col_absolute { "$" } else { "" },
            CellRef::col_to_letters(self.col),
            if self.row_absolute { "$" } else { "" },
            self.row + 1
        )
    }
}

/// A rectangular block of cells. Always normalized so `start` is the
/// top-left corner and `end` the bottom-right.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    /// Build a normalized range. The sheet qualifier of `start` applies to the
    /// whole range; a conflicting qualifier on `end` is an InvalidReference.
    pub fn new(start: CellAddress, end: CellAddress) -> Result<CellRange, ErrorKind> {
        let sheet = match (start.sheet, end.sheet) {
            (Some(a), Some(b)) if !sheet_eq(Some(&a), Some(&b)) => {
                return Err(ErrorKind::InvalidReference);
            }
            (Some(a), _) => Some(a),
            (None, b) => b,
        };

        let (left, left_abs, right, right_abs) = if start.col <= end.col {
            (start.col, start.col_absolute, end.col, end.col_absolute)
        } else {
            (end.col, end.col_absolute, start.col, start.col_absolute)
        };
        let (top, top_abs, bottom, bottom_abs) = if start.row <= end.row {
            (start.row, start.row_absolute, end.row, end.row_absolute)
        } else {
            (end.row, end.row_absolute, start.row, start.row_absolute)
        };

        Ok(CellRange {
            start: CellAddress {
                sheet,
                col: left,
                row: top,
                col_absolute: left_abs,
                row_absolute: top_abs,
            },
            end: CellAddress {
                sheet: None,
                col: right,
                row: bottom,
                col_absolute: right_abs,
                row_absolute: bottom_abs,
            },
        })
    }

    /// Parse `A1:B10`, `Sheet!A1:B10` or a bare cell (`start == end`).
    pub fn parse(text: &str) -> Result<CellRange, ErrorKind> {
        let text = text.trim();
        match split_range(text) {
            Some((start, end)) => {
                let start = CellAddress::parse(start)?;
                let end = CellAddress::parse(end)?;
                CellRange::new(start, end)
            }
            None => {
                let single = CellAddress::parse(text)?;
                CellRange::new(single.clone(), single)
            }
        }
    }

    pub fn sheet(&self) -> Option<&str> {
        self.start.sheet.as_deref()
    }

    pub fn rows(&self) -> usize {
        self.end.row - self.start.row + 1
    }

    pub fn cols(&self) -> usize {
        self.end.col - self.start.col + 1
    }

    /// Number of cells, or None if it does not fit in `usize`.
    pub fn cell_count(&self) -> Option<usize> {
        self.rows().checked_mul(self.cols())
    }

    /// Every position in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.start.row..=self.end.row)
            .flat_map(move |row| (self.start.col..=self.end.col).map(move |col| CellRef::new(col, row)))
    }

    /// Address of a position inside the range, carrying the range's sheet.
    pub fn address_at(&self, cell: CellRef) -> CellAddress {
        CellAddress {
            sheet: self.start.sheet.clone(),
            col: cell.col,
            row: cell.row,
            col_absolute: false,
            row_absolute: false,
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Split on the range colon, ignoring colons inside a quoted sheet name.
fn split_range(text: &str) -> Option<(&str, &str)> {
    let mut in_quote = false;
    for (i, ch) in text.char_indices() {
        match ch {
            '\'' => in_quote = !in_quote,
            ':' if !in_quote => return Some((&text[..i], &text[i + 1..])),
            _ => {}
        }
    }
    None
}

fn sheet_eq(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        (None, None) => true,
        _ => false,
    }
}

fn unquote_sheet(raw: &str) -> String {
    match raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => inner.replace("''", "'"),
        None => raw.to_string(),
    }
}

/// Quote a sheet name for formula text when it is not a plain identifier.
pub fn quote_sheet(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}
