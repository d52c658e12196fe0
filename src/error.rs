use thiserror::Error;

/// Upload rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("File format not supported")]
    UnsupportedFormat(String),
    #[error("File size exceeds {}MB limit", .limit / (1024 * 1024))]
    TooLarge { size: u64, limit: u64 },
}

/// Every way the extraction backend can fail collapses into this type.
/// The message always starts with "Extraction failed" and carries a detail string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("Extraction failed: {0}")]
    Network(String),
    #[error("Extraction failed ({code}): {detail}")]
    Status { code: u16, detail: String },
    #[error("Extraction failed: malformed response ({0})")]
    Malformed(String),
    #[error("Extraction failed: cancelled")]
    Cancelled,
}

impl RelayError {
    pub fn detail(&self) -> String {
        match self {
            RelayError::Network(d) | RelayError::Malformed(d) => d.clone(),
            RelayError::Status { detail, .. } => detail.clone(),
            RelayError::Cancelled => "Cancelled".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not encode stored data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Storage lock poisoned")]
    Poisoned,
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Could not encode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Could not write Excel file: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("Could not save export: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown export format '{0}'")]
    UnknownFormat(String),
    #[error("Could not find Downloads or Desktop folder.")]
    NoExportDir,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("No extraction is loaded")]
    NoRecord,
    #[error("Unknown field '{0}'")]
    UnknownField(String),
    #[error("Field '{0}' is read-only")]
    ReadOnlyField(String),
    #[error("Item {index} does not exist ({len} items)")]
    ItemOutOfRange { index: usize, len: usize },
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
