//! Timestamped CSV reports for a batch of paper analyses.

mod export;

use thiserror::Error;

pub use export::{ReportKind, ReportWriter, export_all, report_filename, sanitize_name};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
