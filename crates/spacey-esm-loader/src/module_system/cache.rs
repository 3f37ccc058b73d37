// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module record cache

use crate::module_system::record::ModuleRecord;
use crate::module_system::ModuleIdentity;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe map from identity to record
///
/// Holds at most one record per identity. Records are never removed.
pub struct ModuleCache {
    records: DashMap<ModuleIdentity, Arc<ModuleRecord>>,
}

impl ModuleCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Get the record for `identity`, creating an unlinked one if absent
    ///
    /// The flag is `true` when this call created the record.
    pub fn get_or_create(&self, identity: &ModuleIdentity) -> (Arc<ModuleRecord>, bool) {
        match self.records.entry(identity.clone()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let record = Arc::new(ModuleRecord::new(identity.clone()));
                entry.insert(Arc::clone(&record));
                (record, true)
            }
        }
    }

    /// Get a cached record
    pub fn get(&self, identity: &ModuleIdentity) -> Option<Arc<ModuleRecord>> {
        self.records.get(identity).map(|entry| Arc::clone(entry.value()))
    }

    /// All cached identities
    pub fn identities(&self) -> Vec<ModuleIdentity> {
        self.records.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Get the number of cached records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new()
    }
}
