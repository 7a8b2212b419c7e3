//! Error types for the meshtun session manager
//!
//! Each concern (engine, interface, configuration, packet I/O) has its own error enum;
//! `TunnelError` unifies them for the session's public operations.

use std::io;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Errors reported by the mesh engine handle
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine failed to start: {reason}")]
    StartFailed { reason: String },
    #[error("Engine is stopped")]
    Stopped,
    #[error("Engine I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Engine reported an invalid address: {address:?}")]
    InvalidAddress { address: String },
}

/// Errors raised while acquiring or using OS-level interface resources
#[derive(Debug, thiserror::Error)]
pub enum InterfaceError {
    #[error("Multicast capability unavailable: {reason}")]
    MulticastUnavailable { reason: String },
    #[error("Interface establishment failed: {reason}")]
    EstablishFailed { reason: String },
    #[error("Interface handle is invalid")]
    InvalidHandle,
    #[error("Interface {direction} stream unavailable: {reason}")]
    StreamUnavailable {
        direction: &'static str,
        reason: String,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("Engine configuration could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Missing session dependency: {name}")]
    MissingDependency { name: &'static str },
}

// ----------------------------------------------------------------------------
// Packet I/O Faults
// ----------------------------------------------------------------------------

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        const ENOBUFS: Option<i32> = Some(105);
    } else if #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd"
    ))] {
        const ENOBUFS: Option<i32> = Some(55);
    } else if #[cfg(windows)] {
        // WSAENOBUFS
        const ENOBUFS: Option<i32> = Some(10055);
    } else {
        const ENOBUFS: Option<i32> = None;
    }
}

/// Classified failure of a packet read or write on the virtual interface
///
/// The interface layer decides the class from the underlying OS error, so the pumps never
/// inspect error text.
#[derive(Debug, thiserror::Error)]
pub enum IoFault {
    /// Resource exhaustion (kernel buffers full); the operation may be retried
    #[error("Transient interface I/O condition: {0}")]
    Transient(#[source] io::Error),
    /// Any other failure; the stream is unusable
    #[error("Fatal interface I/O error: {0}")]
    Fatal(#[source] io::Error),
}

impl IoFault {
    /// Classify an OS-level I/O error
    pub fn classify(err: io::Error) -> Self {
        let exhausted = err.kind() == io::ErrorKind::OutOfMemory
            || (ENOBUFS.is_some() && err.raw_os_error() == ENOBUFS);
        if exhausted {
            IoFault::Transient(err)
        } else {
            IoFault::Fatal(err)
        }
    }

    /// Build the transient fault for a full kernel buffer
    pub fn buffer_full() -> Self {
        let err = match ENOBUFS {
            Some(code) => io::Error::from_raw_os_error(code),
            None => io::Error::from(io::ErrorKind::OutOfMemory),
        };
        IoFault::Transient(err)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, IoFault::Transient(_))
    }
}

impl From<io::Error> for IoFault {
    fn from(err: io::Error) -> Self {
        IoFault::classify(err)
    }
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Top-level error for session operations
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Interface error: {0}")]
    Interface(#[from] InterfaceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to spawn {worker} worker: {source}")]
    WorkerSpawn {
        worker: &'static str,
        #[source]
        source: io::Error,
    },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl TunnelError {
    /// Create a missing-dependency error (used by the session builder)
    pub fn missing_dependency(name: &'static str) -> Self {
        TunnelError::Config(ConfigError::MissingDependency { name })
    }

    /// Create an interface establishment error
    pub fn establish_failed<R: Into<String>>(reason: R) -> Self {
        TunnelError::Interface(InterfaceError::EstablishFailed {
            reason: reason.into(),
        })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type TunnelResult<T> = core::result::Result<T, TunnelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_full_is_transient() {
        assert!(IoFault::buffer_full().is_transient());
    }

    #[test]
    fn test_broken_pipe_is_fatal() {
        let fault = IoFault::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(!fault.is_transient());
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_enobufs_classified_from_raw_os_error() {
        let fault = IoFault::classify(io::Error::from_raw_os_error(105));
        assert!(fault.is_transient());

        // EBADF
        let fault = IoFault::classify(io::Error::from_raw_os_error(9));
        assert!(!fault.is_transient());
    }

    #[test]
    fn test_tunnel_error_display_includes_cause() {
        let err = TunnelError::establish_failed("permission denied");
        assert_eq!(
            err.to_string(),
            "Interface error: Interface establishment failed: permission denied"
        );
    }
}
