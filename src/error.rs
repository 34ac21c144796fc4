use std::fmt;

/// Crate-wide error taxonomy.
#[derive(Debug)]
pub enum PecoError {
    /// User hit Cancel, or a context further up the tree was dropped.
    Cancelled,
    /// Malformed regexp query.
    CompileError(regex::Error),
    /// Source read failure, stdout write failure, or similar.
    Io(std::io::Error),
    /// Malformed config file or invalid `--layout`/flag value.
    Config(String),
    /// `--help`, `--version`, or another benign user-caused stop.
    Ignorable(String),
    /// Programming defect; never swallowed.
    Internal(String),
}

impl fmt::Display for PecoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PecoError::Cancelled => write!(f, "cancelled"),
            PecoError::CompileError(e) => write!(f, "compile error: {}", e),
            PecoError::Io(e) => write!(f, "io error: {}", e),
            PecoError::Config(msg) => write!(f, "config error: {}", msg),
            PecoError::Ignorable(msg) => write!(f, "{}", msg),
            PecoError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for PecoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PecoError::CompileError(e) => Some(e),
            PecoError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PecoError {
    fn from(e: std::io::Error) -> Self {
        PecoError::Io(e)
    }
}

impl From<regex::Error> for PecoError {
    fn from(e: regex::Error) -> Self {
        PecoError::CompileError(e)
    }
}

pub type Result<T> = std::result::Result<T, PecoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(PecoError::Cancelled.to_string(), "cancelled");
        assert_eq!(
            PecoError::Config("bad layout".into()).to_string(),
            "config error: bad layout"
        );
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: PecoError = io.into();
        assert!(matches!(err, PecoError::Io(_)));
    }
}
