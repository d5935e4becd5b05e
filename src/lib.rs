//! Sales Report Bot Library
//!
//! This library loads sales records, aggregates them into a summary, renders
//! the summary as a PDF and an Excel workbook, and mails both on a timer.

pub mod config;
pub mod error;
pub mod helpers;
pub mod logging;
pub mod models;
pub mod service;

pub use config::{ConfigError, DataSource, ReportConfig};
pub use error::{DispatchError, ReportError, SourceError};
pub use service::{ReportService, RunOutcome};

// Re-export key types for convenience
pub use helpers::aggregate::aggregate;
pub use helpers::email::{Dispatcher, ResendDispatcher};
pub use helpers::pdf::render_pdf;
pub use helpers::source::RecordSource;
pub use helpers::workbook::render_workbook;
pub use models::sales::{ArtifactKind, ProductRollup, ReportArtifact, SalesRecord, SalesSummary};
