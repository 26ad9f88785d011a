//! Error types for the sensor node core
//!
//! Every failure in the core is absorbed locally: these types are returned
//! to the caller that decides what to log and which status field to touch.
//! Nothing here is ever escalated into a panic.

use thiserror_no_std::Error;

/// Failure to obtain a usable temperature/humidity reading.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} is not available")]
    NotAvailable { sensor: &'static str },
    #[error("{sensor} returned a non-numeric reading")]
    NotANumber { sensor: &'static str },
    #[error("{sensor} bus error: {details}")]
    Bus {
        sensor: &'static str,
        details: &'static str,
    },
}

/// The upload task for a window could not be started.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("all upload task slots are busy")]
    PoolExhausted,
    #[error("upload task could not be spawned: {0}")]
    SpawnFailed(&'static str),
}

/// A single upload attempt did not deliver its reading.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadError {
    #[error("server rejected the reading with status {status}")]
    Rejected { status: u16 },
    #[error("transport failure")]
    Transport,
    #[error("no response within the upload timeout")]
    TimedOut,
}

/// Invalid input on the config-update surface.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing interval parameter")]
    Missing,
    #[error("interval is not a decimal number")]
    NotNumeric,
    #[error("interval out of range ({min}-{max})")]
    OutOfRange { min: u32, max: u32 },
}

/// Misuse of the shared status store.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusError {
    #[error("the {0} writer has already been claimed")]
    WriterClaimed(&'static str),
}

/// A request on the web surface could not be parsed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    #[error("request is incomplete")]
    Incomplete,
    #[error("request is malformed")]
    Malformed,
    #[error("method is not supported")]
    UnsupportedMethod,
    #[error("request does not fit in {capacity} bytes")]
    TooLarge { capacity: usize },
}
