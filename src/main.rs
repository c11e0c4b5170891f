use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use xml2xlsx::batch::ErrorPolicy;
use xml2xlsx::cli::{self, ConvertOptions};
use xml2xlsx::excel::DEFAULT_SHEET_NAME;

#[derive(Parser)]
#[command(name = "xml2xlsx")]
#[command(about = "Convert XML transaction exports to Excel (.xlsx)")]
#[command(long_about = "xml2xlsx - XML transaction exports to Excel

Every <transaction> element directly under the document root becomes one row.
Its child elements become columns, named by tag, in the order they are first
seen. Values are written as text, exactly as in the XML.

COMMANDS:
  convert  - Convert XML files to .xlsx next to each input
  check    - Parse XML files and report their columns without writing

EXAMPLES:
  xml2xlsx convert ledger.xml                  # writes ledger.xlsx
  xml2xlsx convert exports/ --on-error continue
  xml2xlsx check exports/*.xml

LOGGING:
  Set XML2XLSX_LOG (e.g. XML2XLSX_LOG=xml2xlsx=debug) for diagnostic output on stderr.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Convert XML files to Excel .xlsx.

Files are converted one at a time, in the order given. Directories expand to
the .xml files they contain, sorted by name. Each output is written next to
its input with the extension replaced by .xlsx, overwriting any existing file.
A workbook only appears once it has been completely written.

ERROR POLICY:
  halt      - stop at the first failure (default); remaining files are listed
  continue  - report the failure and keep converting the rest

EXIT STATUS:
  0 when every file was converted, non-zero otherwise.")]
    /// Convert XML files to .xlsx
    Convert {
        /// XML files or directories of XML files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// What to do when a file fails to convert
        #[arg(long, value_enum, default_value_t = ErrorPolicy::Halt, env = "XML2XLSX_ON_ERROR")]
        on_error: ErrorPolicy,

        /// Name of the worksheet in each workbook
        #[arg(long, default_value = DEFAULT_SHEET_NAME, env = "XML2XLSX_SHEET_NAME")]
        sheet_name: String,

        /// Read each workbook back and compare it with the XML before keeping it
        #[arg(long)]
        verify: bool,

        /// Print the batch summary as JSON instead of the progress report
        #[arg(long)]
        json: bool,
    },

    /// Parse XML files and report transactions and columns without writing
    Check {
        /// XML files or directories of XML files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("XML2XLSX_LOG").unwrap_or_else(|_| "xml2xlsx=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            paths,
            on_error,
            sheet_name,
            verify,
            json,
        } => {
            let summary = cli::convert(
                paths,
                ConvertOptions {
                    on_error,
                    sheet_name,
                    verify,
                    json,
                },
            )?;
            let missed = summary.total - summary.converted.len();
            anyhow::ensure!(
                summary.is_success(),
                "{} of {} files were not converted",
                missed,
                summary.total
            );
            Ok(())
        }

        Commands::Check { paths } => cli::check(paths),
    }
}
