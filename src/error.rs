use std::path::{Path, PathBuf};
use thiserror::Error;

pub type ConvertResult<T> = Result<T, ConversionError>;

/// The single failure kind of a conversion: which input failed, and why.
#[derive(Error, Debug)]
#[error("Failed to convert {}: {cause}", path.display())]
pub struct ConversionError {
    pub path: PathBuf,
    #[source]
    pub cause: Cause,
}

impl ConversionError {
    pub fn new(path: impl AsRef<Path>, cause: Cause) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cause,
        }
    }
}

/// Underlying reason a conversion failed.
#[derive(Error, Debug)]
pub enum Cause {
    #[error("Cannot read input: {0}")]
    Read(#[source] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(String),

    #[error("Excel export error: {0}")]
    Export(String),

    #[error("Cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output path {} is the input file itself", .0.display())]
    OutputIsInput(PathBuf),

    #[error("Excel import error: {0}")]
    Import(String),

    #[error("Round-trip verification failed: {0}")]
    Verification(String),
}

impl From<rust_xlsxwriter::XlsxError> for Cause {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Cause::Export(err.to_string())
    }
}
