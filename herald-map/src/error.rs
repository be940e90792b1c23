use core::fmt;

/// Typed errors for map lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The requested key is not present in the map
    KeyNotFound,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KeyNotFound => write!(f, "Key not found"),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for map lookups
pub type Result<T> = core::result::Result<T, Error>;
