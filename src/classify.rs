//! Error classification.
//!
//! A classifier maps an error to a [`Classification`]: a retryability verdict plus a short reason
//! used in logs. Classifiers are pure functions of their inputs.
//!
//! Two generic probes are provided:
//! - [`classify_capabilities`] asks an error what it knows about itself through the
//!   [`RetryCapabilities`] trait.
//! - [`classify_error_chain`] walks a `std::error::Error` source chain looking for well-known
//!   OS-level I/O failures (connection reset, broken pipe, ...).

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Retryability verdict with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    retryable: bool,
    reason: Cow<'static, str>,
}

impl Classification {
    /// The error is worth retrying.
    pub fn retryable(reason: impl Into<Cow<'static, str>>) -> Self {
        Self { retryable: true, reason: reason.into() }
    }

    /// Retrying will not help.
    pub fn permanent(reason: impl Into<Cow<'static, str>>) -> Self {
        Self { retryable: false, reason: reason.into() }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<bool> for Classification {
    fn from(retryable: bool) -> Self {
        if retryable {
            Self::retryable("retryable")
        } else {
            Self::permanent("not retryable")
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.retryable { "retryable" } else { "permanent" };
        write!(f, "{}: {}", verdict, self.reason)
    }
}

/// Optional self-description an error type can expose to classifiers.
///
/// Every method defaults to `None`, meaning "this error has no opinion".
pub trait RetryCapabilities {
    /// Explicit retryability, if the error knows it.
    fn is_retryable(&self) -> Option<bool> {
        None
    }

    /// Whether the condition is temporary.
    fn is_temporary(&self) -> Option<bool> {
        None
    }

    /// Whether the error is a timeout.
    fn is_timeout(&self) -> Option<bool> {
        None
    }
}

/// Probe the capability methods in priority order: explicit retryability, timeout, temporary.
///
/// Returns `None` when the error exposes nothing useful.
pub fn classify_capabilities<E>(err: &E) -> Option<Classification>
where
    E: RetryCapabilities + ?Sized,
{
    if let Some(retryable) = err.is_retryable() {
        return Some(if retryable {
            Classification::retryable("error reports retryable")
        } else {
            Classification::permanent("error reports not retryable")
        });
    }
    if err.is_timeout() == Some(true) {
        return Some(Classification::retryable("timeout"));
    }
    if err.is_temporary() == Some(true) {
        return Some(Classification::retryable("temporary"));
    }
    None
}

/// Classify an I/O error by its kind.
///
/// Only the well-known transient transport failures are reported; everything else is `None`.
pub fn classify_io(err: &io::Error) -> Option<Classification> {
    let reason = match err.kind() {
        io::ErrorKind::ConnectionReset => "connection reset",
        io::ErrorKind::ConnectionAborted => "connection aborted",
        io::ErrorKind::NotConnected => "not connected",
        io::ErrorKind::WouldBlock => "resource temporarily unavailable",
        io::ErrorKind::TimedOut => "timed out",
        io::ErrorKind::Interrupted => "interrupted",
        io::ErrorKind::BrokenPipe => "broken pipe",
        _ => return None,
    };
    Some(Classification::retryable(reason))
}

/// Walk `err` and its sources, returning the first I/O classification found.
pub fn classify_error_chain(err: &(dyn StdError + 'static)) -> Option<Classification> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if let Some(classification) = classify_io(io_err) {
                return Some(classification);
            }
        }
        current = e.source();
    }
    None
}
