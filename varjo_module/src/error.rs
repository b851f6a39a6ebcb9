//! Error taxonomy for the Varjo bridge.
//!
//! Every setup failure is returned to the caller as a value. `ErrorKind`
//! groups the variants into the four categories the host cares about when
//! deciding whether to retry, degrade, or disable tracking.

use std::path::PathBuf;

pub type Result<T, E = VarjoError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Runtime or headset not present. Expected, not a failure.
    Unavailable,
    /// Shared memory region not created yet.
    TransientOpen,
    /// Initialization attempt aborted; the bridge is unusable until retried.
    FatalSetup,
    /// A single tick produced no data; the last good sample is still served.
    DataUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum VarjoError {
    #[error("Varjo runtime not detected")]
    Unavailable,

    #[error("Shared memory region '{name}' does not exist yet")]
    RegionNotFound { name: String },

    #[error("Failed to open shared memory region '{name}': {reason}")]
    RegionOpen { name: String, reason: String },

    #[error("Failed to launch companion {path:?}")]
    CompanionLaunch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to load library {path:?}: {reason}")]
    LibraryLoad { path: PathBuf, reason: String },

    #[error("Failed to install GetCurrentProcessId interception: {0}")]
    Hook(String),

    #[error("Varjo session init failed")]
    SessionInit,

    #[error("Gaze tracking is not allowed! Please enable it in Varjo Base")]
    PermissionDenied,

    #[error("No gaze data (error {code}: {description})")]
    NoData { code: i64, description: String },

    #[error("Shared memory record changed while it was being read")]
    TornRead,

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

impl VarjoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VarjoError::Unavailable => ErrorKind::Unavailable,
            VarjoError::RegionNotFound { .. } => ErrorKind::TransientOpen,
            VarjoError::NoData { .. } | VarjoError::TornRead => ErrorKind::DataUnavailable,
            VarjoError::RegionOpen { .. }
            | VarjoError::CompanionLaunch { .. }
            | VarjoError::LibraryLoad { .. }
            | VarjoError::Hook(_)
            | VarjoError::SessionInit
            | VarjoError::PermissionDenied
            | VarjoError::Unsupported(_) => ErrorKind::FatalSetup,
        }
    }

    /// Whether the same operation may succeed if repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientOpen | ErrorKind::DataUnavailable
        )
    }

    pub(crate) fn library_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        VarjoError::LibraryLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn region_open(name: &str, reason: impl ToString) -> Self {
        VarjoError::RegionOpen {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(VarjoError::Unavailable.kind(), ErrorKind::Unavailable);
        assert_eq!(
            VarjoError::RegionNotFound {
                name: "VarjoEyeTracking".into()
            }
            .kind(),
            ErrorKind::TransientOpen
        );
        assert_eq!(VarjoError::SessionInit.kind(), ErrorKind::FatalSetup);
        assert_eq!(VarjoError::PermissionDenied.kind(), ErrorKind::FatalSetup);
        assert_eq!(VarjoError::TornRead.kind(), ErrorKind::DataUnavailable);
    }

    #[test]
    fn test_retryable() {
        assert!(VarjoError::TornRead.is_retryable());
        assert!(!VarjoError::library_load("VarjoLib.dll", "missing").is_retryable());
        assert!(!VarjoError::Unavailable.is_retryable());
    }
}
