use std::io;
use trackable::error::{ErrorKind as TrackableErrorKind, ErrorKindExt, TrackableError};

/// The error type for this crate.
#[derive(Debug, Clone, trackable::TrackableError)]
pub struct Error(TrackableError<ErrorKind>);

/// A list of error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid input.
    Invalid,

    /// A filesystem operation failed.
    Io,

    /// The sink no longer accepts messages.
    Full,

    /// Unknown error.
    Other,
}
impl TrackableErrorKind for ErrorKind {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        let e: TrackableError<ErrorKind> = ErrorKind::Io.cause(e).into();
        e.into()
    }
}
