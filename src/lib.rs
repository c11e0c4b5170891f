//! xml2xlsx - convert XML transaction exports to Excel
//!
//! Reads an XML document whose root holds a sequence of `<transaction>`
//! elements, flattens each transaction's child elements into a row, and
//! writes the rows to a single-sheet .xlsx workbook next to the input.
//!
//! # Features
//!
//! - One column per distinct field name, in first-seen order
//! - Values written as text exactly as they appear in the XML
//! - Output staged in a temporary file and renamed into place, so a failed
//!   conversion never leaves a partial workbook
//! - Optional read-back verification of every workbook
//! - Batch driver with halt/continue error policy, cancellation, and a
//!   background worker that reports progress over a channel
//!
//! # Example
//!
//! ```no_run
//! use xml2xlsx::batch::{BatchDriver, ErrorPolicy};
//! use std::path::PathBuf;
//!
//! let output = xml2xlsx::convert(std::path::Path::new("march.xml"))?;
//! println!("Wrote {}", output.display());
//!
//! let mut driver = BatchDriver::new(vec![PathBuf::from("april.xml"), PathBuf::from("may.xml")])
//!     .with_policy(ErrorPolicy::Continue);
//! let summary = driver.run(&mut ());
//! println!("{:?}", summary.outcome());
//! # Ok::<(), xml2xlsx::ConversionError>(())
//! ```

pub mod batch;
pub mod cli;
pub mod converter;
pub mod error;
pub mod excel;
pub mod parser;
pub mod types;

// Re-export commonly used types
pub use converter::{convert, output_path_for, Converter};
pub use error::{Cause, ConversionError, ConvertResult};
pub use types::{Row, Table};
