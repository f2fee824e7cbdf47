use thiserror::Error;

#[derive(Error, Debug)]
pub enum DedupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("malformed resource table: {0}")]
    MalformedTable(String),

    #[error("unsafe entry path: {0}")]
    UnsafePath(String),

    /// The rebuilt archive does not carry the metadata that was written into it.
    #[error("rebuilt archive failed verification: {0}")]
    Verify(String),
}

impl DedupError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        DedupError::MalformedTable(msg.into())
    }

    /// True when the resource table, not the archive container, was at fault.
    pub fn is_table_error(&self) -> bool {
        matches!(self, DedupError::MalformedTable(_))
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, DedupError>;
