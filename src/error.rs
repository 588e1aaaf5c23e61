use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error type shared by the compressor, the databases and the drivers.
///
/// Variants map one-to-one onto the failure kinds a caller can observe.
/// I/O failures always carry the operation and the path involved.
#[derive(Error, Debug)]
pub enum ParalogError {
    /// Failure reading or writing a database file.
    #[error("I/O error while {operation} '{}': {source}", .path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Unknown or unparsable `params` key, conflicting CLI flags, or an
    /// attempt to change a frozen parameter on append.
    #[error("config error: {0}")]
    Config(String),

    /// Malformed edit script or compressed record encountered on read.
    #[error("malformed edit script: {0}")]
    EditScriptSyntax(String),

    /// A compressed link references a coarse sequence that does not exist.
    #[error("coarse sequence {id} out of range (database has {len})")]
    SequenceOutOfRange { id: u32, len: u32 },

    /// A requested original id exceeds the compressed index.
    #[error("sequence id {id} out of range (database has {len})")]
    IndexOutOfRange { id: u32, len: u32 },

    /// A termination signal was observed; no further jobs are accepted.
    #[error("worker cancelled")]
    WorkerCancelled,

    /// Broken internal invariant. Always a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ParalogError>;

/// Wrap an I/O error with the operation and path it occurred on.
pub fn io_error(operation: &str, path: &Path, source: io::Error) -> ParalogError {
    ParalogError::Io {
        operation: operation.to_string(),
        path: path.to_path_buf(),
        source,
    }
}
