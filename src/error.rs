use std::fmt;
use std::path::PathBuf;

/// The error taxonomy shared by the spool, submission, execution, and
/// inspection paths. Library code returns `Result<T, UucpError>` so callers
/// can match on kind; binaries convert into `anyhow::Error` at the boundary.
#[derive(Debug, Clone)]
pub enum UucpError {
    ConfigError { message: String },
    Syntax { message: String },
    NotFound { what: String },
    Permission { message: String },
    TransportIo { message: String, path: Option<PathBuf> },
    SpoolIo { message: String, path: Option<PathBuf> },
    Interrupted,
    RemoteFailure { message: String },
}

impl UucpError {
    pub fn spool_io(context: impl Into<String>, err: &std::io::Error) -> Self {
        UucpError::SpoolIo { message: format!("{}: {}", context.into(), err), path: None }
    }

    pub fn spool_io_path(context: impl Into<String>, path: PathBuf, err: &std::io::Error) -> Self {
        UucpError::SpoolIo { message: format!("{}: {}", context.into(), err), path: Some(path) }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        UucpError::Syntax { message: message.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        UucpError::NotFound { what: what.into() }
    }

    pub fn permission(message: impl Into<String>) -> Self {
        UucpError::Permission { message: message.into() }
    }

    /// Submission-time errors that require the abort list to be unwound and
    /// the process to exit nonzero (spec §7: "Syntax and Permission on
    /// submission → fatal").
    pub fn is_fatal_in_submitter(&self) -> bool {
        match self {
            UucpError::Syntax { .. } => true,
            UucpError::Permission { .. } => true,
            UucpError::SpoolIo { .. } => true,
            UucpError::ConfigError { .. } => true,
            UucpError::Interrupted => true,
            UucpError::NotFound { .. } => false,
            UucpError::TransportIo { .. } => false,
            UucpError::RemoteFailure { .. } => false,
        }
    }

    /// Per-X-file errors the Executor should log/mail/skip rather than treat
    /// as fatal to the whole scan (spec §7: "do not abort the daemon").
    pub fn is_fatal_in_executor(&self) -> bool {
        match self {
            UucpError::Interrupted => true,
            UucpError::ConfigError { .. } => true,
            UucpError::Syntax { .. } => false,
            UucpError::Permission { .. } => false,
            UucpError::NotFound { .. } => false,
            UucpError::TransportIo { .. } => false,
            UucpError::SpoolIo { .. } => false,
            UucpError::RemoteFailure { .. } => false,
        }
    }
}

impl fmt::Display for UucpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UucpError::ConfigError { message } => write!(f, "configuration error: {message}"),
            UucpError::Syntax { message } => write!(f, "syntax error: {message}"),
            UucpError::NotFound { what } => write!(f, "not found: {what}"),
            UucpError::Permission { message } => write!(f, "not permitted: {message}"),
            UucpError::TransportIo { message, path: Some(p) } => {
                write!(f, "transport I/O error on {}: {message}", p.display())
            }
            UucpError::TransportIo { message, path: None } => write!(f, "transport I/O error: {message}"),
            UucpError::SpoolIo { message, path: Some(p) } => {
                write!(f, "spool I/O error on {}: {message}", p.display())
            }
            UucpError::SpoolIo { message, path: None } => write!(f, "spool I/O error: {message}"),
            UucpError::Interrupted => write!(f, "interrupted by signal"),
            UucpError::RemoteFailure { message } => write!(f, "execution failed: {message}"),
        }
    }
}

impl std::error::Error for UucpError {}

impl From<std::io::Error> for UucpError {
    fn from(err: std::io::Error) -> Self {
        UucpError::SpoolIo { message: err.to_string(), path: None }
    }
}
