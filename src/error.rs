use thiserror::Error;

/// All errors the mirror engine can produce.
///
/// The taxonomy matters for control flow:
/// - `Structural` aborts the whole run (continuing would corrupt the replica)
/// - `Integrity` is fatal to a single work item only
/// - everything else is transient and ends up recorded on the work item
///   that was being processed when it happened
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("ftp error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("sftp error: {0}")]
    Sftp(#[from] ssh2::Error),

    /// The remote answered 5xx. Transient, never aborts the run.
    #[error("remote temporarily unavailable ({0}) for {1}")]
    Unavailable(u16, String),

    /// The remote catalog is inconsistent or malformed. Fatal to the run.
    #[error("structural error: {0}")]
    Structural(String),

    /// A downloaded item contradicts the local replica. Fatal to that item.
    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("unsupported target '{0}' (expected a local directory, or an http(s)/ftp/sftp URL)")]
    UnsupportedTarget(String),
}

impl MirrorError {
    /// Structural errors (including malformed catalog JSON) abort the run;
    /// everything else is isolated to the entity or work item in flight.
    pub fn is_structural(&self) -> bool {
        matches!(self, MirrorError::Structural(_) | MirrorError::Json(_))
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
