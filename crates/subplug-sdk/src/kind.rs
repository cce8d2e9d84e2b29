//! Subplugin kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The families of subplugins the loader manages.
///
/// Each kind has its own name space: `Filter/"tflite"` and
/// `Decoder/"tflite"` are different entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum SubpluginKind {
    /// Tensor filter backends
    Filter = 0,
    /// Tensor decoders
    Decoder = 1,
    /// In-process custom filters registered by name
    EasyCustomFilter = 2,
    /// Media-to-tensor converters
    Converter = 3,
}

impl SubpluginKind {
    /// Number of kinds. Raw discriminants `>= COUNT` are invalid.
    pub const COUNT: usize = 4;

    /// Every kind, in discriminant order.
    pub const ALL: [SubpluginKind; Self::COUNT] = [
        SubpluginKind::Filter,
        SubpluginKind::Decoder,
        SubpluginKind::EasyCustomFilter,
        SubpluginKind::Converter,
    ];

    /// Position of this kind in per-kind arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Get the string representation of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            SubpluginKind::Filter => "filter",
            SubpluginKind::Decoder => "decoder",
            SubpluginKind::EasyCustomFilter => "easy_custom_filter",
            SubpluginKind::Converter => "converter",
        }
    }
}

impl fmt::Display for SubpluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u32> for SubpluginKind {
    type Error = KindError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(KindError::OutOfRange(value))
    }
}

/// Raw kind conversion errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KindError {
    #[error("Unknown subplugin kind: {0}")]
    OutOfRange(u32),
}
