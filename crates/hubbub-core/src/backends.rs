use std::sync::Arc;

use crate::groups::{GroupStore, InMemoryGroups};
use crate::relay::{InMemoryRelayer, Relayer};

/// The group store and relayer a hub runs against. Chosen once at startup
/// and shared by every connection.
#[derive(Clone)]
pub struct Backends {
    pub groups: Arc<dyn GroupStore>,
    pub relayer: Arc<dyn Relayer>,
}

impl Backends {
    pub fn new(groups: Arc<dyn GroupStore>, relayer: Arc<dyn Relayer>) -> Self {
        Self { groups, relayer }
    }

    /// Single-process backends.
    pub fn in_memory() -> Self {
        Self {
            groups: Arc::new(InMemoryGroups::new()),
            relayer: Arc::new(InMemoryRelayer::new()),
        }
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}
