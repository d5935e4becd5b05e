use thiserror::Error;

/// Failure while loading records from a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {path}: {message}")]
    Open { path: String, message: String },
    #[error("missing column '{0}'")]
    MissingColumn(&'static str),
    #[error("row {row}: {message}")]
    InvalidRow { row: usize, message: String },
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Failure while handing artifacts to the mail transport.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("mail transport error: {0}")]
    Transport(#[from] resend_rs::Error),
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("no sales records to aggregate")]
    EmptyInput,
    #[error("total quantity exceeds the supported range")]
    QuantityOverflow,
    #[error("render error: {0}")]
    Render(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("a report run is already in progress")]
    RunInProgress,
}

impl From<lopdf::Error> for ReportError {
    fn from(e: lopdf::Error) -> Self {
        ReportError::Render(format!("pdf: {}", e))
    }
}

impl From<rust_xlsxwriter::XlsxError> for ReportError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        ReportError::Render(format!("workbook: {}", e))
    }
}

pub type ReportResult<T> = Result<T, ReportError>;
