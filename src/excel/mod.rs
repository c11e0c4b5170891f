//! Excel (.xlsx) reading and writing for transaction tables
//!
//! - Export: Table → single-sheet workbook, staged then renamed into place
//! - Import: first worksheet → Table (round-trip verification)

mod exporter;
mod importer;

pub use exporter::{ExcelExporter, StagedOutput, DEFAULT_SHEET_NAME};
pub use importer::ExcelImporter;
