use crate::batch::{self, BatchDriver, BatchEvent, BatchOutcome, BatchSummary, ErrorPolicy};
use crate::converter::Converter;
use crate::excel::DEFAULT_SHEET_NAME;
use crate::parser;
use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for the convert command
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub on_error: ErrorPolicy,
    pub sheet_name: String,
    pub verify: bool,
    pub json: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            on_error: ErrorPolicy::Halt,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            verify: false,
            json: false,
        }
    }
}

/// Expand command-line paths into the ordered list of XML files to process.
///
/// Directories contribute their `*.xml` files sorted by name; repeated paths
/// are kept once, at their first position.
pub fn collect_inputs(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut entries = fs::read_dir(path)
                .and_then(|dir| {
                    dir.map(|entry| entry.map(|e| e.path()))
                        .collect::<Result<Vec<_>, _>>()
                })
                .with_context(|| format!("Cannot read directory {}", path.display()))?;
            entries.retain(|p| p.is_file() && is_xml(p));
            entries.sort();

            for entry in entries {
                if seen.insert(entry.clone()) {
                    files.push(entry);
                }
            }
        } else if seen.insert(path.clone()) {
            files.push(path.clone());
        }
    }

    if files.is_empty() {
        bail!("No XML files found in the given paths");
    }
    Ok(files)
}

fn is_xml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

/// Execute the convert command
///
/// The batch runs on a worker thread; this thread only drains its events.
pub fn convert(paths: Vec<PathBuf>, options: ConvertOptions) -> anyhow::Result<BatchSummary> {
    let files = collect_inputs(&paths)?;
    let total = files.len();
    let quiet = options.json;

    if !quiet {
        println!("{}", "🔄 xml2xlsx - XML to Excel".bold().green());
        println!("   Imported XML files: {}", total);
        println!(
            "   On error: {}\n",
            match options.on_error {
                ErrorPolicy::Halt => "halt",
                ErrorPolicy::Continue => "continue",
            }
        );
    }

    let converter = Converter::new()
        .with_sheet_name(options.sheet_name)
        .with_verify(options.verify);
    let driver = BatchDriver::new(files)
        .with_converter(converter)
        .with_policy(options.on_error);
    let handle = batch::spawn(driver).context("Failed to start conversion worker")?;

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        progress_bar(total)
    };

    for event in handle.events() {
        match event {
            BatchEvent::Progress { done, .. } => progress.set_position(done as u64),
            BatchEvent::Converted { input, output } if !quiet => progress.suspend(|| {
                println!(
                    "   {} {} → {}",
                    "✅".green(),
                    input.display(),
                    output.display().to_string().bright_blue()
                )
            }),
            BatchEvent::Failed { input, message } if !quiet => progress.suspend(|| {
                println!(
                    "   {} {}: {}",
                    "❌".red(),
                    input.display(),
                    message.red()
                )
            }),
            _ => {}
        }
    }
    progress.finish_and_clear();

    let summary = handle
        .join()
        .map_err(|_| anyhow!("Conversion worker panicked"))?;

    if quiet {
        let report = serde_json::json!({
            "outcome": summary.outcome(),
            "on_error": options.on_error,
            "summary": &summary,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&summary);
    }

    Ok(summary)
}

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template("   {bar:40.cyan/blue} {pos}/{len} files") {
        pb.set_style(style.progress_chars("█▓░"));
    }
    pb
}

fn print_summary(summary: &BatchSummary) {
    println!();
    match summary.outcome() {
        BatchOutcome::Success { count } => {
            println!(
                "{}",
                "✅ Files have been successfully converted to Excel."
                    .bold()
                    .green()
            );
            println!("   Converted: {}", count);
        }
        BatchOutcome::PartialSuccess { count, total } => {
            println!(
                "{}",
                format!(
                    "⚠️  Partial success: {} of {} files converted to Excel.",
                    count, total
                )
                .bold()
                .yellow()
            );
        }
        BatchOutcome::Failure => {
            println!("{}", "❌ No files were converted.".bold().red());
        }
        BatchOutcome::Empty => {
            println!("{}", "Nothing to convert.".yellow());
        }
    }

    if summary.cancelled {
        println!("   {}", "Cancelled before all files were processed.".yellow());
    }
    if !summary.pending.is_empty() {
        println!("   Not converted:");
        for path in &summary.pending {
            println!("      {}", path.display());
        }
    }
}

/// Execute the check command
///
/// Parses every input without writing anything; fails if any input is invalid.
pub fn check(paths: Vec<PathBuf>) -> anyhow::Result<()> {
    let files = collect_inputs(&paths)?;

    println!("{}", "🔍 xml2xlsx - Checking XML files".bold().green());
    println!("   Files: {}\n", files.len());

    let mut invalid = 0;
    for file in &files {
        match parser::parse_file(file) {
            Ok(table) => {
                println!(
                    "   {} {}: {} transactions, {} columns",
                    "✅".green(),
                    file.display(),
                    table.row_count(),
                    table.column_count()
                );
                if table.column_count() > 0 {
                    println!("      Columns: {}", table.columns().join(", ").bright_blue());
                }
            }
            Err(e) => {
                invalid += 1;
                println!("   {} {}", "❌".red(), e.to_string().red());
            }
        }
    }

    println!();
    if invalid > 0 {
        bail!("{} of {} files are not valid", invalid, files.len());
    }
    println!("{}", "✅ All files are valid".bold().green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_xml_case_insensitive() {
        assert!(is_xml(Path::new("a.xml")));
        assert!(is_xml(Path::new("B.XML")));
        assert!(!is_xml(Path::new("a.xlsx")));
        assert!(!is_xml(Path::new("xml")));
    }

    #[test]
    fn test_collect_inputs_expands_directories_sorted() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["b.xml", "a.XML", "notes.txt", "c.xml"] {
            fs::write(temp_dir.path().join(name), "<r/>").unwrap();
        }
        fs::create_dir(temp_dir.path().join("sub.xml")).unwrap();

        let files = collect_inputs(&[temp_dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.XML", "b.xml", "c.xml"]);
    }

    #[test]
    fn test_collect_inputs_keeps_order_and_drops_duplicates() {
        let paths = vec![
            PathBuf::from("z.xml"),
            PathBuf::from("a.xml"),
            PathBuf::from("z.xml"),
        ];
        let files = collect_inputs(&paths).unwrap();
        assert_eq!(files, vec![PathBuf::from("z.xml"), PathBuf::from("a.xml")]);
    }

    #[test]
    fn test_collect_inputs_empty_directory_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = collect_inputs(&[temp_dir.path().to_path_buf()]);
        assert!(result.is_err());
    }
}
