//! Single-file XML → Excel conversion

use crate::error::{Cause, ConversionError, ConvertResult};
use crate::excel::{ExcelExporter, ExcelImporter, DEFAULT_SHEET_NAME};
use crate::parser;
use crate::types::Table;
use std::path::{Path, PathBuf};
use tracing::info;

/// Extension given to converted files.
pub const OUTPUT_EXTENSION: &str = "xlsx";

/// Sibling output path: the input path with its extension replaced by `.xlsx`.
pub fn output_path_for(input: &Path) -> PathBuf {
    input.with_extension(OUTPUT_EXTENSION)
}

/// Convert `input` with default settings, writing next to it.
///
/// # Example
/// ```no_run
/// use std::path::Path;
///
/// let written = xml2xlsx::convert(Path::new("ledger.xml"))?;
/// assert_eq!(written, Path::new("ledger.xlsx"));
/// # Ok::<(), xml2xlsx::ConversionError>(())
/// ```
pub fn convert(input: &Path) -> ConvertResult<PathBuf> {
    Converter::default().convert(input)
}

/// Conversion settings. Holds no state between calls, so one value can be
/// shared by any number of conversions.
#[derive(Debug, Clone)]
pub struct Converter {
    sheet_name: String,
    verify: bool,
}

impl Default for Converter {
    fn default() -> Self {
        Self {
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            verify: false,
        }
    }
}

impl Converter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the worksheet holding the table.
    pub fn with_sheet_name(mut self, name: impl Into<String>) -> Self {
        self.sheet_name = name.into();
        self
    }

    /// Read the workbook back and compare it to the parsed table before committing it.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn verifies(&self) -> bool {
        self.verify
    }

    /// Convert `input` to its sibling `.xlsx` path.
    pub fn convert(&self, input: &Path) -> ConvertResult<PathBuf> {
        self.convert_to(input, &output_path_for(input))
    }

    /// Convert `input` and write the workbook to `output`, replacing it if present.
    ///
    /// Nothing is written unless the whole conversion succeeds.
    pub fn convert_to(&self, input: &Path, output: &Path) -> ConvertResult<PathBuf> {
        let fail = |cause: Cause| ConversionError::new(input, cause);

        if same_file(input, output) {
            return Err(fail(Cause::OutputIsInput(output.to_path_buf())));
        }

        let table = parser::parse_file(input)?;

        let staged = ExcelExporter::new(&table)
            .with_sheet_name(self.sheet_name.as_str())
            .stage(output)
            .map_err(fail)?;

        if self.verify {
            verify_round_trip(&table, staged.path()).map_err(fail)?;
        }

        let written = staged.commit().map_err(fail)?;
        info!(
            input = %input.display(),
            output = %written.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "converted"
        );
        Ok(written)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Compare a written workbook with the table it came from.
///
/// Trailing rows with no values cannot be represented in a sheet, so they may
/// be missing from the workbook.
fn verify_round_trip(expected: &Table, workbook: &Path) -> Result<(), Cause> {
    let actual = ExcelImporter::new(workbook).import()?;

    if actual.columns() != expected.columns() {
        return Err(Cause::Verification(format!(
            "columns {:?} read back as {:?}",
            expected.columns(),
            actual.columns()
        )));
    }

    let expected_values = expected.values();
    let actual_values = actual.values();
    if actual_values.len() > expected_values.len() {
        return Err(Cause::Verification(format!(
            "{} rows written, {} read back",
            expected_values.len(),
            actual_values.len()
        )));
    }

    for (idx, row) in expected_values.iter().enumerate() {
        let matches = match actual_values.get(idx) {
            Some(read_back) => read_back == row,
            None => row.iter().all(Option::is_none),
        };
        if !matches {
            return Err(Cause::Verification(format!(
                "row {} does not match",
                idx + 1
            )));
        }
    }
    Ok(())
}
