//! Crate-wide error type.
//!
//! Mirrors the taxonomy of the transfer supervisor's error handling design:
//! lifecycle errors (`PortInUse`, `StartFailure`, `UnlistenTimeout`) propagate
//! to the caller of `listen`/`unlisten`; `HeartbeatInvalid` is fatal to the
//! caller of `set_heartbeat`; the rest are surfaced as events rather than
//! returned, but are still named here so callers constructing events share
//! one vocabulary.

use std::fmt;
use std::io;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Bind refused the requested port (`EADDRINUSE` or equivalent).
    PortInUse(u16),
    /// Any other listener bind/listen failure.
    StartFailure(io::Error),
    /// `pick_one` found no targets in the registry.
    NoTarget,
    /// The outbound dial to a chosen target failed.
    RemoteDialFailure(io::Error),
    /// The health-check oracle returned an error rather than a verdict.
    CheckerError(io::Error),
    /// `unlisten` did not complete within its wall-clock budget.
    UnlistenTimeout,
    /// `set_heartbeat` was given a non-positive or sub-threshold entry.
    HeartbeatInvalid(f64),
    /// Passthrough for I/O errors that don't warrant their own variant.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PortInUse(port) => write!(f, "{}{}", i18n::lookup("port_already_used"), port),
            Error::StartFailure(e) => write!(f, "{}: {}", i18n::lookup("failed_to_start_socket_transfer"), e),
            Error::NoTarget => write!(f, "no target available"),
            Error::RemoteDialFailure(e) => write!(f, "remote dial failed: {}", e),
            Error::CheckerError(e) => write!(f, "health checker error: {}", e),
            Error::UnlistenTimeout => write!(f, "unlisten timeout"),
            Error::HeartbeatInvalid(v) => write!(f, "heartbeat entry {} is invalid: must be >= 5", v),
            Error::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::StartFailure(e) | Error::RemoteDialFailure(e) | Error::CheckerError(e) | Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

/// Stand-in for the host application's localization lookup (`i18n.lookup`).
///
/// The real crate never ships translations; callers embedding this crate in
/// a localized shell are expected to catch these two keys and re-render the
/// message. Here we just return the literal English strings the keys name.
mod i18n {
    pub fn lookup(key: &str) -> &'static str {
        match key {
            "port_already_used" => "port already in use: ",
            "failed_to_start_socket_transfer" => "failed to start socket transfer",
            _ => "unknown i18n key",
        }
    }
}
