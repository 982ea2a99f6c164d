use std::fmt;

/// Mirrors HTTP conventions so callers can surface a numeric status
/// without a separate mapping table: 400 caller error, 404 missing
/// target, 500 invariant-violating store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed rule JSON, incompatible action combination, unsupported
    /// filter-by shape, out-of-range offset.
    Validation,
    /// Lookup for an absent index or absent rule id.
    NotFound,
    /// Key-value store write/delete returned failure.
    Storage,
    Io,
    Parse,
    Internal,
    InvalidArgument,
    InvalidInput,
    InvalidState,
}

impl ErrorKind {
    pub fn code(self) -> u16 {
        match self {
            ErrorKind::Validation | ErrorKind::InvalidArgument | ErrorKind::InvalidInput => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Storage | ErrorKind::Internal | ErrorKind::Io | ErrorKind::InvalidState => 500,
            ErrorKind::Parse => 400,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into() }
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    pub fn validation(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Validation, context)
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context)
    }

    pub fn storage(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Storage, context)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} ({}): {}", self.kind, self.kind.code(), self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Parse, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_codes_match_http_convention() {
        assert_eq!(ErrorKind::Validation.code(), 400);
        assert_eq!(ErrorKind::NotFound.code(), 404);
        assert_eq!(ErrorKind::Storage.code(), 500);
    }

    #[test]
    fn display_includes_code_and_context() {
        let err = Error::validation("bad filter_by");
        let rendered = err.to_string();
        assert!(rendered.contains("400"));
        assert!(rendered.contains("bad filter_by"));
    }
}
