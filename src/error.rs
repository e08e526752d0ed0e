//! Structured error model.
//!
//! The reference this crate imitates reports errors as an opaque struct per
//! component, each carrying its own domain/code pair. Here that collapses to
//! one type so a cause chain can cross component boundaries without a cast.

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;

/// Broad category of failure, mirroring the domains a forensics-style FAT
/// decoder reports (`arguments`, `conversion`, `I/O`, `input`, `runtime`,
/// `memory`). `Compression` and `Output` exist for API completeness with the
/// wider domain space this model is drawn from; this crate never produces
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Arguments,
    Conversion,
    Compression,
    Io,
    Input,
    Memory,
    Output,
    Runtime,
}

/// Error code within a [`Domain`]. Variants are grouped by the domain they
/// belong to; callers match on `Error::domain()`/`Error::code()` rather than
/// on this enum directly when they only care about the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    // Arguments
    InvalidValue,
    ValueOutOfBounds,
    // Conversion
    InvalidUnicode,
    InvalidCodepage,
    // Input / format
    SignatureMismatch,
    ChecksumMismatch,
    ValueMismatch,
    UnsupportedValue,
    Corruption,
    // I/O
    ReadFailed,
    SeekFailed,
    ShortRead,
    // Runtime
    MissingValue,
    InitializationFailed,
    FinalizationFailed,
    AbortRequested,
    WrongState,
    // Memory
    AllocationFailed,
}

/// A structured, chainable error.
///
/// Every fallible operation in this crate returns `Result<T, Error>`. An
/// `Error` can wrap an earlier `Error` as its `cause`, so a low-level I/O
/// failure surfaced while decoding a boot sector keeps the boot-sector
/// context on its way up to the caller.
#[derive(Debug)]
pub struct Error {
    domain: Domain,
    code: Code,
    message: String,
    cause: Option<Box<Error>>,
}

impl Error {
    pub fn new(domain: Domain, code: Code, message: impl Into<String>) -> Self {
        Error {
            domain,
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: Error) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&Error> {
        self.cause.as_deref()
    }

    pub fn abort_requested() -> Self {
        Error::new(Domain::Runtime, Code::AbortRequested, "abort requested")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}: {}", self.domain, self.code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {})", cause)?;
        }
        Ok(())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|e| e as _)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Shorthand constructors, one per `(domain, code)` pair actually produced by
/// this crate. Kept free-standing rather than as `Error` methods so call
/// sites read `error::corrupt_chain(...)` instead of a long `Error::new`.
pub(crate) fn arg_invalid(msg: impl Into<String>) -> Error {
    Error::new(Domain::Arguments, Code::InvalidValue, msg)
}

pub(crate) fn arg_out_of_bounds(msg: impl Into<String>) -> Error {
    Error::new(Domain::Arguments, Code::ValueOutOfBounds, msg)
}

pub(crate) fn conversion_invalid_unicode(msg: impl Into<String>) -> Error {
    Error::new(Domain::Conversion, Code::InvalidUnicode, msg)
}

pub(crate) fn input_signature_mismatch(msg: impl Into<String>) -> Error {
    Error::new(Domain::Input, Code::SignatureMismatch, msg)
}

pub(crate) fn input_checksum_mismatch(msg: impl Into<String>) -> Error {
    Error::new(Domain::Input, Code::ChecksumMismatch, msg)
}

pub(crate) fn input_unsupported_value(msg: impl Into<String>) -> Error {
    Error::new(Domain::Input, Code::UnsupportedValue, msg)
}

pub(crate) fn input_corruption(msg: impl Into<String>) -> Error {
    Error::new(Domain::Input, Code::Corruption, msg)
}

pub(crate) fn io_read_failed(msg: impl Into<String>) -> Error {
    Error::new(Domain::Io, Code::ReadFailed, msg)
}

pub(crate) fn runtime_missing_value(msg: impl Into<String>) -> Error {
    Error::new(Domain::Runtime, Code::MissingValue, msg)
}

pub(crate) fn runtime_wrong_state(msg: impl Into<String>) -> Error {
    Error::new(Domain::Runtime, Code::WrongState, msg)
}
