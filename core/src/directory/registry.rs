// In-memory router registry — the directory's storage

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Directory, DirectoryError, RouterDescriptor};

/// Name-keyed descriptor store. Registration is last-write-wins and
/// nothing is ever evicted or persisted; directory state lives exactly
/// as long as the process.
#[derive(Debug, Default)]
pub struct RouterRegistry {
    routers: RwLock<HashMap<String, RouterDescriptor>>,
}

impl RouterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, descriptor: RouterDescriptor) {
        self.routers
            .write()
            .insert(descriptor.name.clone(), descriptor);
    }

    pub fn routers(&self) -> Vec<RouterDescriptor> {
        self.routers.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.routers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.read().is_empty()
    }
}

#[async_trait]
impl Directory for RouterRegistry {
    async fn register(&self, descriptor: RouterDescriptor) -> Result<(), DirectoryError> {
        self.upsert(descriptor);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RouterDescriptor>, DirectoryError> {
        Ok(self.routers())
    }
}

// ============================================================================
// TESTS
// ============================================================================
