use std::fmt;

/// Errors surfaced by the replication engine.
///
/// `RecordFatal` carries whichever side's id is known so every error log line
/// can report both the SCM and DTS identifiers per the error handling design.
#[derive(Debug)]
pub enum ReplError {
    /// The plugin reported `can_continue=0`, or a server-clock/listing call
    /// failed outright. The caller should enter the offline protocol.
    Transient(String),
    /// A per-record failure that could not be recovered by the retry pass.
    RecordFatal {
        scm_id: Option<String>,
        dts_id: Option<String>,
        message: String,
    },
    /// Mapping validation failed at startup.
    Validation(Vec<String>),
    /// Configuration file could not be read, parsed, or written.
    Config(String),
    /// The plugin directory or a specific plugin module could not be loaded.
    Plugin(String),
    /// Wraps an I/O error with the path that was being operated on.
    Io { path: String, source: std::io::Error },
}

pub type ReplResult<T> = Result<T, ReplError>;

impl fmt::Display for ReplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplError::Transient(e) => write!(f, "transient error: {}", e),
            ReplError::RecordFatal {
                scm_id,
                dts_id,
                message,
            } => write!(
                f,
                "record fatal (scm={}, dts={}): {}",
                scm_id.as_deref().unwrap_or("-"),
                dts_id.as_deref().unwrap_or("-"),
                message
            ),
            ReplError::Validation(msgs) => write!(f, "validation failed: {}", msgs.join("; ")),
            ReplError::Config(e) => write!(f, "configuration error: {}", e),
            ReplError::Plugin(e) => write!(f, "plugin error: {}", e),
            ReplError::Io { path, source } => write!(f, "I/O error on {}: {}", path, source),
        }
    }
}

impl std::error::Error for ReplError {}

impl From<quick_xml::Error> for ReplError {
    fn from(err: quick_xml::Error) -> Self {
        ReplError::Config(err.to_string())
    }
}

impl From<quick_xml::DeError> for ReplError {
    fn from(err: quick_xml::DeError) -> Self {
        ReplError::Config(err.to_string())
    }
}

impl From<quick_xml::SeError> for ReplError {
    fn from(err: quick_xml::SeError) -> Self {
        ReplError::Config(err.to_string())
    }
}
