//! Per-channel mutual exclusion
//!
//! Both strategies read the channel's cursor, fetch, then write the cursor
//! back. Two runs on the same channel at once would lose one of the writes,
//! so a run holds its channel's lock from start to finish.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::ChannelId;

#[derive(Debug, Default)]
pub struct ChannelLocks {
    locks: Mutex<HashMap<ChannelId, Arc<Mutex<()>>>>,
}

impl ChannelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `channel_id`, created on first use
    pub fn lock_for(&self, channel_id: ChannelId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(channel_id).or_default().clone()
    }

    /// Hand back a lock taken with [`lock_for`](Self::lock_for)
    ///
    /// The entry is dropped once no other caller holds or waits on it, so
    /// the map only tracks channels with a sync in flight.
    pub fn release(&self, channel_id: ChannelId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one in `lock`
        if Arc::strong_count(&lock) == 2
            && locks.get(&channel_id).is_some_and(|held| Arc::ptr_eq(held, &lock))
        {
            locks.remove(&channel_id);
        }
    }

    /// Number of channels with a lock in flight
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
