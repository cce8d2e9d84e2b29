//! Per-kind search policy for lookups that miss the registry.

use serde::{Deserialize, Serialize};
use subplug_sdk::SubpluginKind;

/// How an unresolved lookup for a kind is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    /// Resolve the one file that provides the requested name and load it.
    ByName,
    /// Load every candidate of the kind on the first lookup, then settle.
    LoadAll,
    /// Nothing more to load for this kind.
    Settled,
}

impl SearchState {
    /// Starting policy for a kind.
    ///
    /// Converters are too heterogeneous to name one by one in configuration,
    /// so every converter library is loaded and each claims its own names.
    pub fn default_for(kind: SubpluginKind) -> Self {
        match kind {
            SubpluginKind::Filter | SubpluginKind::Decoder | SubpluginKind::EasyCustomFilter => {
                SearchState::ByName
            }
            SubpluginKind::Converter => SearchState::LoadAll,
        }
    }

    /// Starting policies for every kind, indexed by [`SubpluginKind::index`].
    pub fn defaults() -> [SearchState; SubpluginKind::COUNT] {
        SubpluginKind::ALL.map(Self::default_for)
    }
}
