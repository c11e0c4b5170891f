//! Excel exporter implementation

use crate::error::Cause;
use crate::types::Table;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Name of the single worksheet unless configured otherwise.
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// Writes one [`Table`] as a single-sheet .xlsx workbook.
pub struct ExcelExporter<'a> {
    table: &'a Table,
    sheet_name: String,
}

impl<'a> ExcelExporter<'a> {
    /// Create a new Excel exporter
    pub fn new(table: &'a Table) -> Self {
        Self {
            table,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
        }
    }

    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    /// Export the table to `output_path`, replacing any existing file.
    ///
    /// The workbook is fully written to a temporary file next to the target and
    /// renamed over it only when complete; on error the target is untouched.
    pub fn export(&self, output_path: &Path) -> Result<PathBuf, Cause> {
        self.stage(output_path)?.commit()
    }

    /// Write the workbook to a temporary file beside `output_path` without
    /// touching the target yet.
    pub fn stage(&self, output_path: &Path) -> Result<StagedOutput, Cause> {
        let write_error = |source: std::io::Error| Cause::Write {
            path: output_path.to_path_buf(),
            source,
        };
        ensure_target_writable(output_path).map_err(write_error)?;

        let buffer = self.to_buffer()?;

        let dir = match output_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = tempfile::Builder::new()
            .prefix(".xml2xlsx-")
            .suffix(".xlsx.tmp")
            .tempfile_in(dir)
            .map_err(write_error)?;
        temp.write_all(&buffer).map_err(write_error)?;
        temp.as_file().sync_all().map_err(write_error)?;

        debug!(
            target_path = %output_path.display(),
            staged = %temp.path().display(),
            bytes = buffer.len(),
            "staged workbook"
        );

        Ok(StagedOutput {
            temp,
            target: output_path.to_path_buf(),
        })
    }

    /// Serialize the workbook into memory.
    pub fn to_buffer(&self) -> Result<Vec<u8>, Cause> {
        let mut workbook = self.build_workbook()?;
        Ok(workbook.save_to_buffer()?)
    }

    fn build_workbook(&self) -> Result<Workbook, Cause> {
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&self.sheet_name)?;

        // A table without columns is an empty sheet: no header, no rows
        if self.table.column_count() > 0 {
            Self::write_header(worksheet, self.table.columns())?;
            self.write_rows(worksheet)?;
        }

        Ok(workbook)
    }

    /// Write column names to row 0
    fn write_header(worksheet: &mut Worksheet, columns: &[String]) -> Result<(), Cause> {
        let header_format = Format::new().set_bold();
        for (col_idx, name) in columns.iter().enumerate() {
            worksheet.write_string_with_format(0, column_number(col_idx)?, name, &header_format)?;
        }
        Ok(())
    }

    /// Write data rows starting at row 1; blank values leave the cell unwritten.
    fn write_rows(&self, worksheet: &mut Worksheet) -> Result<(), Cause> {
        let columns = self.table.columns();
        for (row_idx, row) in self.table.rows().iter().enumerate() {
            let excel_row = u32::try_from(row_idx + 1)
                .map_err(|_| Cause::Export(format!("too many rows ({})", row_idx + 1)))?;

            for (col_idx, name) in columns.iter().enumerate() {
                if let Some(value) = row.get(name) {
                    // Values stay text: "007" and "10.50" must survive as written
                    worksheet.write_string(excel_row, column_number(col_idx)?, value)?;
                }
            }
        }
        Ok(())
    }
}

fn column_number(index: usize) -> Result<u16, Cause> {
    u16::try_from(index).map_err(|_| Cause::Export(format!("too many columns ({})", index + 1)))
}

/// A complete workbook sitting in a temporary file, waiting to be moved into place.
///
/// Dropping it without [`commit`](Self::commit) deletes the temporary file.
pub struct StagedOutput {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedOutput {
    /// Location of the staged workbook.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Final destination.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically rename the staged workbook over the target.
    pub fn commit(self) -> Result<PathBuf, Cause> {
        let StagedOutput { temp, target } = self;
        ensure_target_writable(&target).map_err(|source| Cause::Write {
            path: target.clone(),
            source,
        })?;
        match_target_permissions(&temp, &target);
        temp.persist(&target).map_err(|e| Cause::Write {
            path: target.clone(),
            source: e.error,
        })?;

        info!(path = %target.display(), "wrote workbook");
        Ok(target)
    }
}

/// A rename replaces the target whatever its mode, so a read-only target is refused here.
fn ensure_target_writable(target: &Path) -> std::io::Result<()> {
    match std::fs::metadata(target) {
        Ok(meta) if meta.permissions().readonly() => Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "target file is read-only",
        )),
        _ => Ok(()),
    }
}

/// Temp files are created owner-only; give the output the permissions a plain write would.
#[cfg(unix)]
fn match_target_permissions(temp: &NamedTempFile, target: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let permissions = std::fs::metadata(target)
        .map(|m| m.permissions())
        .unwrap_or_else(|_| std::fs::Permissions::from_mode(0o644));
    if let Err(e) = temp.as_file().set_permissions(permissions) {
        debug!(error = %e, "could not adjust staged file permissions");
    }
}

#[cfg(not(unix))]
fn match_target_permissions(_temp: &NamedTempFile, _target: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Row;
    use tempfile::TempDir;

    fn sample_table() -> Table {
        let mut first = Row::new();
        first.set("id", Some("1".to_string()));
        first.set("amt", Some("10.5".to_string()));
        let mut second = Row::new();
        second.set("id", Some("2".to_string()));
        Table::from_rows(vec![first, second])
    }

    #[test]
    fn test_to_buffer_is_a_zip_container() {
        let table = sample_table();
        let buffer = ExcelExporter::new(&table).to_buffer().unwrap();
        assert!(buffer.starts_with(b"PK"), "xlsx files are zip archives");
    }

    #[test]
    fn test_export_empty_table() {
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("empty.xlsx");

        let table = Table::new();
        let written = ExcelExporter::new(&table).export(&output_path).unwrap();

        assert_eq!(written, output_path);
        assert!(output_path.exists(), "Output file should exist");
    }

    #[test]
    fn test_dropped_stage_leaves_no_files() {
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("never.xlsx");

        let table = sample_table();
        let staged = ExcelExporter::new(&table).stage(&output_path).unwrap();
        assert!(staged.path().exists());
        assert_eq!(staged.target(), output_path.as_path());
        drop(staged);

        assert!(!output_path.exists());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_sheet_name_is_export_error() {
        let table = sample_table();
        let result = ExcelExporter::new(&table)
            .with_sheet_name("bad/name")
            .to_buffer();
        assert!(matches!(result, Err(Cause::Export(_))));
    }

    #[test]
    fn test_missing_directory_is_write_error() {
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("no-such-dir").join("out.xlsx");

        let table = sample_table();
        let result = ExcelExporter::new(&table).export(&output_path);
        match result {
            Err(Cause::Write { path, .. }) => assert_eq!(path, output_path),
            other => panic!("expected write error, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_target_is_write_error() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("locked.xlsx");
        std::fs::write(&output_path, b"locked").unwrap();
        std::fs::set_permissions(&output_path, std::fs::Permissions::from_mode(0o444)).unwrap();

        let table = sample_table();
        let result = ExcelExporter::new(&table).export(&output_path);
        match result {
            Err(Cause::Write { path, source }) => {
                assert_eq!(path, output_path);
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            other => panic!("expected write error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(std::fs::read(&output_path).unwrap(), b"locked");
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }
}
