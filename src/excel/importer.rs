//! Excel importer implementation - Excel (.xlsx) → Table

use crate::error::Cause;
use crate::types::{Row, Table};
use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use std::path::{Path, PathBuf};

/// Reads the first worksheet of an .xlsx file back into a [`Table`].
///
/// Row 0 is the header; every later row becomes a [`Row`] holding only its
/// non-blank cells. Numbers and other typed cells are read back as text.
pub struct ExcelImporter {
    path: PathBuf,
}

impl ExcelImporter {
    /// Create a new Excel importer
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Import the first worksheet
    pub fn import(&self) -> Result<Table, Cause> {
        let mut workbook: Xlsx<_> = open_workbook(&self.path)
            .map_err(|e| Cause::Import(format!("Failed to open Excel file: {}", e)))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| Cause::Import("workbook has no worksheets".to_string()))?
            .map_err(|e| Cause::Import(format!("Failed to read worksheet: {}", e)))?;

        Ok(Self::read_range(&range))
    }

    fn read_range(range: &Range<Data>) -> Table {
        let Some((last_row, last_col)) = range.end() else {
            return Table::new();
        };

        // Positions are absolute so a sheet whose used range starts past A1 still lines up
        let headers: Vec<String> = (0..=last_col)
            .map(|col| {
                range
                    .get_value((0, col))
                    .and_then(cell_text)
                    .unwrap_or_else(|| format!("col_{}", col))
            })
            .collect();

        let mut table = Table::with_columns(headers.iter().cloned());
        for row in 1..=last_row {
            let mut record = Row::new();
            for (col, name) in headers.iter().enumerate() {
                let value = range.get_value((row, col as u32)).and_then(cell_text);
                if value.is_some() {
                    record.set(name.clone(), value);
                }
            }
            table.push_row(record);
        }
        table
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
