//! Adapter lookup per channel

use std::collections::HashMap;
use std::sync::Arc;

use super::ChannelAdapter;
use crate::models::Channel;

/// Finds the adapter that serves a channel
pub trait AdapterResolver: Send + Sync {
    fn resolve(&self, channel: &Channel) -> Option<Arc<dyn ChannelAdapter>>;
}

/// Registry of adapters keyed by channel external id
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ChannelAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, external_id: impl Into<String>, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.insert(external_id.into(), adapter);
    }

    pub fn get(&self, external_id: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.get(external_id).cloned()
    }

    /// Registered external ids, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.adapters.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

impl AdapterResolver for AdapterRegistry {
    fn resolve(&self, channel: &Channel) -> Option<Arc<dyn ChannelAdapter>> {
        self.get(&channel.external_id)
    }
}
