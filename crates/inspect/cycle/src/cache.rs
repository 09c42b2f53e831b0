//! In-memory channel result cache.

use std::sync::RwLock;

use inspect_types::{ChannelId, ChannelResult, SentinelReason};
use tracing::debug;

use crate::traits::ChannelResultCache;

/// Reference [`ChannelResultCache`] keeping both slots in memory.
#[derive(Debug, Default)]
pub struct InMemoryResultCache {
    slots: RwLock<[ChannelResult; 2]>,
}

impl InMemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(channel: ChannelId) -> usize {
        match channel {
            ChannelId::A => 0,
            ChannelId::B => 1,
        }
    }

    fn write(&self, channel: ChannelId, value: ChannelResult) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots[Self::index(channel)] = value;
    }
}

impl ChannelResultCache for InMemoryResultCache {
    fn set_result(&self, channel: ChannelId, value: ChannelResult) {
        self.write(channel, value);
    }

    fn set_sentinel(&self, channel: ChannelId, reason: SentinelReason) {
        debug!(channel = %channel, reason = %reason, "Writing sentinel result");
        self.write(channel, ChannelResult::Sentinel(reason));
    }

    fn reset_all(&self) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        *slots = Default::default();
    }

    fn get(&self, channel: ChannelId) -> ChannelResult {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots[Self::index(channel)].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_reset() {
        let cache = InMemoryResultCache::new();
        cache.set_result(ChannelId::A, ChannelResult::measured("OK"));
        cache.set_sentinel(ChannelId::B, SentinelReason::ChannelTimeout);

        assert_eq!(cache.get(ChannelId::A), ChannelResult::measured("OK"));
        assert!(cache.get(ChannelId::B).is_sentinel());

        cache.reset_all();
        for channel in ChannelId::BOTH {
            assert!(cache.get(channel).is_empty());
        }
    }
}
