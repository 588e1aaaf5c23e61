//! Error presentation for the command line drivers.
//!
//! Library errors are precise but terse; the drivers wrap them in a
//! [`CliError`] that states which phase of the run failed and, where
//! the failure has a usual culprit, points at it. The original error
//! chain is kept for `caused by` reporting.

use std::fmt;
use std::io;
use std::path::Path;

use crate::error::ParalogError;

#[derive(Debug)]
pub struct CliError {
    pub msg: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CliError {
    pub fn new(msg: impl Into<String>) -> CliError {
        CliError {
            msg: msg.into(),
            source: None,
        }
    }

    pub fn caused_by(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> CliError {
        CliError {
            msg: msg.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.msg.fmt(f)
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Driver failure with no underlying error.
pub fn simple_cli_error(msg: &str) -> CliError {
    CliError::new(msg)
}

/// Driver failure while touching one file.
pub fn io_cli_error(operation: &str, path: &Path, err: io::Error) -> CliError {
    let msg = format!(
        "{operation} '{}' failed: {err} ({})",
        path.display(),
        io_hint(&err)
    );
    CliError::caused_by(msg, err)
}

/// Wrap a library error with the phase of the run it interrupted.
pub fn paralog_cli_error(context: &str, err: ParalogError) -> CliError {
    use ParalogError::*;
    let hint = match &err {
        // The Io variant already names the operation and path.
        Io { source, .. } => format!(" ({})", io_hint(source)),
        Config(_) => " (check the flags and the params file)".to_string(),
        EditScriptSyntax(_) | SequenceOutOfRange { .. } => {
            " (the database looks corrupt; consider rebuilding it)".to_string()
        }
        IndexOutOfRange { .. } | WorkerCancelled => String::new(),
        Internal(_) => " (this is a bug)".to_string(),
    };
    CliError::caused_by(format!("{context}: {err}{hint}"), err)
}

fn io_hint(err: &io::Error) -> &'static str {
    use io::ErrorKind::*;
    match err.kind() {
        NotFound => "does the path exist?",
        PermissionDenied => "check file permissions",
        UnexpectedEof => "the file looks truncated",
        WriteZero => "the disk may be full",
        _ => "check the path and free disk space",
    }
}
