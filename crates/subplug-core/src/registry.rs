//! Per-kind name tables.
//!
//! One table per [`SubpluginKind`], created on first use and kept until the
//! loader shuts down. Entries own a copy of their name and borrow the payload.

use std::collections::HashMap;

use subplug_sdk::{SubpluginData, SubpluginKind};

use crate::error::{Result, SubpluginError};

/// A registered subplugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    name: String,
    data: SubpluginData,
}

impl RegistryEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The payload. Borrowed from the subplugin, never freed here.
    pub fn data(&self) -> SubpluginData {
        self.data
    }
}

type Table = HashMap<String, RegistryEntry>;

/// Name tables for every kind.
#[derive(Debug, Default)]
pub struct Registry {
    tables: [Option<Table>; SubpluginKind::COUNT],
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the table for `kind` if it does not exist yet.
    pub fn ensure_table(&mut self, kind: SubpluginKind) -> &mut Table {
        self.tables[kind.index()].get_or_insert_with(HashMap::new)
    }

    /// Whether the table for `kind` has been created.
    pub fn is_initialized(&self, kind: SubpluginKind) -> bool {
        self.tables[kind.index()].is_some()
    }

    /// Get the payload registered for `(kind, name)`.
    ///
    /// Creates the kind's table on first use.
    pub fn lookup(&mut self, kind: SubpluginKind, name: &str) -> Option<SubpluginData> {
        self.ensure_table(kind).get(name).map(RegistryEntry::data)
    }

    /// Insert a new entry. Never overwrites: a duplicate name leaves the
    /// existing entry untouched and fails.
    pub fn insert(&mut self, kind: SubpluginKind, name: &str, data: SubpluginData) -> Result<()> {
        if name.is_empty() {
            return Err(SubpluginError::InvalidArgument(
                "subplugin name must not be empty".to_string(),
            ));
        }

        let table = self.ensure_table(kind);
        if table.contains_key(name) {
            return Err(SubpluginError::AlreadyRegistered {
                kind,
                name: name.to_string(),
            });
        }

        table.insert(
            name.to_string(),
            RegistryEntry {
                name: name.to_string(),
                data,
            },
        );
        Ok(())
    }

    /// Remove an entry.
    ///
    /// Fails when the kind's table was never created, or the name is absent.
    pub fn remove(&mut self, kind: SubpluginKind, name: &str) -> Result<RegistryEntry> {
        let table = self.tables[kind.index()].as_mut().ok_or_else(|| {
            SubpluginError::NotFound(format!("no {kind} subplugin has been registered yet"))
        })?;

        table
            .remove(name)
            .ok_or_else(|| SubpluginError::NotFound(format!("{kind} subplugin '{name}'")))
    }

    /// Registered names of `kind`, sorted.
    pub fn names(&self, kind: SubpluginKind) -> Vec<String> {
        let mut names: Vec<String> = self.tables[kind.index()]
            .iter()
            .flat_map(|table| table.keys().cloned())
            .collect();
        names.sort();
        names
    }

    /// Total number of entries across kinds.
    pub fn len(&self) -> usize {
        self.tables.iter().flatten().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every table.
    pub fn clear(&mut self) {
        self.tables = Default::default();
    }
}
