//! Error handling for the subplugin loader.

use std::path::PathBuf;

use subplug_sdk::{KindError, SubpluginKind};

/// Subplugin loader errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubpluginError {
    /// Empty name, null payload or unknown kind.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A name is already taken within its kind.
    #[error("Subplugin {kind}/{name} is already registered")]
    AlreadyRegistered { kind: SubpluginKind, name: String },

    /// Absent entry, untouched kind, or exhausted search.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The platform linker could not open a candidate.
    #[error("Cannot load {}: {reason}", .path.display())]
    LoadFailed { path: PathBuf, reason: String },

    /// A module was opened but did not register the name it was loaded for.
    #[error(
        "Subplugin {kind}/{name} ({}) is broken: it did not register itself during init",
        .path.display()
    )]
    NonConformantModule {
        kind: SubpluginKind,
        name: String,
        path: PathBuf,
    },

    /// Closing a module handle failed.
    #[error("Cannot release {}: {reason}", .path.display())]
    ReleaseFailed { path: PathBuf, reason: String },

    /// The loader was shut down.
    #[error("Subplugin loader has been shut down")]
    ShutDown,
}

impl From<KindError> for SubpluginError {
    fn from(err: KindError) -> Self {
        SubpluginError::InvalidArgument(err.to_string())
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, SubpluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SubpluginError::AlreadyRegistered {
            kind: SubpluginKind::Filter,
            name: "tflite".to_string(),
        };
        assert_eq!(err.to_string(), "Subplugin filter/tflite is already registered");

        let err = SubpluginError::LoadFailed {
            path: PathBuf::from("/opt/libsubplug_filter_x.so"),
            reason: "no such file".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot load /opt/libsubplug_filter_x.so: no such file"
        );
    }

    #[test]
    fn test_kind_error_is_invalid_argument() {
        let err: SubpluginError = SubpluginKind::try_from(9u32).unwrap_err().into();
        assert!(matches!(err, SubpluginError::InvalidArgument(msg) if msg.contains('9')));
    }
}
