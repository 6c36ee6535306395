use std::{
    fmt::{Display, Formatter},
    io, result,
};

use snafu::Location;

#[derive(Debug)]
pub enum Error {
    /// General error.
    /// Returned when code violates normal workflow of working with archives.
    General(String),
    /// "Not yet implemented" error.
    NYI(String),
    /// "End of file" error.
    /// Returned when there are not enough bytes left to decode.
    EOF(String),
    IndexOutOfBound(usize, usize),
    /// A value or column was used with an incompatible primitive type or
    /// storage flavor.
    TypeMismatch(String),
    /// A transform chain failed validation.
    InvalidChain(String),
    /// On-disk state failed an integrity check (digest mismatch,
    /// non-monotonic offsets, missing nullity).
    Corrupt(String),
    IO(String, Location),
    /// An external error variant
    External(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = result::Result<T, E>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::External(Box::new(e))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::General(source) => write!(f, "General error: {}", source),
            Error::NYI(source) => write!(f, "Not yet implemented: {}", source),
            Error::EOF(source) => write!(f, "End of file: {}", source),
            Error::IndexOutOfBound(index, size) => {
                write!(f, "Index out of bound: {} >= {}", index, size)
            }
            Error::TypeMismatch(source) => write!(f, "Type mismatch: {}", source),
            Error::InvalidChain(source) => write!(f, "Invalid transform chain: {}", source),
            Error::Corrupt(source) => write!(f, "Corrupt data: {}", source),
            Error::IO(source, location) => write!(f, "IO error: {} at {}", source, location),
            Error::External(source) => write!(f, "External error: {}", source),
        }
    }
}

/// A macro to simplify common error handling patterns
#[macro_export]
macro_rules! general_error {
    ($msg:expr) => {
        $crate::errors::Error::General($msg.into())
    };
    ($msg:expr, $err:expr) => {
        $crate::errors::Error::General(format!("{}: {}", $msg, $err))
    };
}

/// A macro to simplify "Not Yet Implemented" error handling patterns
#[macro_export]
macro_rules! nyi_err {
    ($msg:expr) => {
        Err($crate::errors::Error::NYI($msg.into()))
    };
}

/// A macro for integrity failures observed while decoding.
#[macro_export]
macro_rules! corrupt_err {
    ($($arg:tt)*) => {
        Err($crate::errors::Error::Corrupt(format!($($arg)*)))
    };
}
