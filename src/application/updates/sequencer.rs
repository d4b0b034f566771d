/// Per-channel sequence numbers
///
/// The only state mutated by several producer threads at once. Each channel
/// has one `AtomicU64`; `next()` is increment-and-get, so sequence numbers on a
/// channel are unique and strictly increasing in claim order, starting at 1.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct ChannelSequencer {
    channel_id: u32,
    last: AtomicU64,
}

impl ChannelSequencer {
    pub fn new(channel_id: u32) -> Self {
        Self {
            channel_id,
            last: AtomicU64::new(0),
        }
    }

    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    #[inline]
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Last sequence handed out (0 if none)
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }
}

/// Shared registry so every producer on a channel gets the same counter
///
/// 读多写少：读锁快速路径，写锁仅在首次创建通道时使用
#[derive(Debug, Default)]
pub struct ChannelSequencers {
    channels: RwLock<HashMap<u32, Arc<ChannelSequencer>>>,
}

impl ChannelSequencers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, channel_id: u32) -> Arc<ChannelSequencer> {
        if let Some(sequencer) = self.channels.read().get(&channel_id) {
            return Arc::clone(sequencer);
        }

        let mut channels = self.channels.write();
        Arc::clone(
            channels
                .entry(channel_id)
                .or_insert_with(|| Arc::new(ChannelSequencer::new(channel_id))),
        )
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}
