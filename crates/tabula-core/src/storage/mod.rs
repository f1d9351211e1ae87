//! Sheet file format.

mod parser;

pub use parser::{SheetEntry, parse_sheet_content, parse_sheet_file};
