//! Location directory loaded from configuration at startup.

use std::collections::HashMap;
use tierkeep_common::{LocationDescriptor, LocationId};
use tracing::warn;

use crate::ports::LocationDirectory;

/// Immutable map of configured storage locations
#[derive(Debug, Default, Clone)]
pub struct LocationMap {
    locations: HashMap<LocationId, LocationDescriptor>,
}

impl LocationMap {
    /// Build the directory; a repeated id keeps the first descriptor
    pub fn new(descriptors: impl IntoIterator<Item = LocationDescriptor>) -> Self {
        let mut locations = HashMap::new();
        for desc in descriptors {
            if locations.contains_key(&desc.id) {
                warn!("Duplicate location {} ignored", desc.id);
                continue;
            }
            locations.insert(desc.id.clone(), desc);
        }
        Self { locations }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Ids of every persistent location, sorted
    pub fn persistent_ids(&self) -> Vec<&LocationId> {
        let mut ids: Vec<_> = self
            .locations
            .values()
            .filter(|d| d.persistent)
            .map(|d| &d.id)
            .collect();
        ids.sort();
        ids
    }
}

impl LocationDirectory for LocationMap {
    fn lookup(&self, id: &LocationId) -> Option<&LocationDescriptor> {
        self.locations.get(id)
    }
}
