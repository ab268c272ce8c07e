//! Per-account extension registry
//!
//! An `ExtensionSet` is an ordered, duplicate-free list of extension ids with
//! an inverse index for O(1) membership and removal. Removal moves the last
//! entry into the freed slot, so enumeration never sees gaps.

use std::collections::HashMap;
use super::types::ExtensionId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("extension id must not be zero")]
    InvalidExtension,
    #[error("extension {0} is already registered")]
    AlreadyRegistered(ExtensionId),
    #[error("extension limit of {0} reached for account")]
    LimitReached(usize),
    #[error("extension {0} is not registered")]
    NotRegistered(ExtensionId),
}

#[derive(Clone, Debug, Default)]
pub struct ExtensionSet {
    items: Vec<ExtensionId>,
    index: HashMap<ExtensionId, usize>,
}

impl ExtensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, ext: &ExtensionId) -> bool {
        self.index.contains_key(ext)
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Id at `index`, or `None` past the end
    pub fn at(&self, index: usize) -> Option<ExtensionId> {
        self.items.get(index).copied()
    }

    pub fn list(&self) -> Vec<ExtensionId> {
        self.items.clone()
    }

    pub fn as_slice(&self) -> &[ExtensionId] {
        &self.items
    }

    /// Append `ext`, refusing the zero id, duplicates and anything past `capacity`
    pub fn add(&mut self, ext: ExtensionId, capacity: usize) -> Result<(), RegistryError> {
        if ext.is_zero() {
            return Err(RegistryError::InvalidExtension);
        }
        if self.has(&ext) {
            return Err(RegistryError::AlreadyRegistered(ext));
        }
        if self.items.len() >= capacity {
            return Err(RegistryError::LimitReached(capacity));
        }

        self.index.insert(ext, self.items.len());
        self.items.push(ext);
        Ok(())
    }

    /// Swap-remove `ext`: the last entry takes its slot.
    pub fn remove(&mut self, ext: &ExtensionId) -> Result<(), RegistryError> {
        let position = self.index.remove(ext).ok_or(RegistryError::NotRegistered(*ext))?;

        self.items.swap_remove(position);
        if let Some(moved) = self.items.get(position) {
            self.index.insert(*moved, position);
        }
        Ok(())
    }

    /// Empty the set, returning the removed ids in their prior order
    pub fn clear(&mut self) -> Vec<ExtensionId> {
        self.index.clear();
        std::mem::take(&mut self.items)
    }
}
