//! Newest-frame-wins arbitration and the bounded frame cache

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::trace;

use crate::frame::FramePair;
use crate::objects::{DynamicObjects, StaticObjects};

/// Merges frames from redundant connections into one ordered cache.
///
/// Each connection index remembers the last frame id it got accepted. With
/// more than one connection, a frame is only accepted when its id is greater
/// than every other connection's last id, so the first copy of each frame
/// wins and late duplicates are dropped. Ids are compared as plain numbers;
/// after a server restart resets them, frames are refused until they climb
/// back past the old high-water mark.
#[derive(Debug)]
pub struct FrameArbiter {
    last_frame_ids: BTreeMap<usize, u32>,
    latest_static: Option<Arc<StaticObjects>>,
    frames: VecDeque<FramePair>,
    capacity: usize,
}

impl FrameArbiter {
    /// Create an empty cache holding at most `capacity` frames (minimum one).
    pub fn new(capacity: usize) -> Self {
        Self {
            last_frame_ids: BTreeMap::new(),
            latest_static: None,
            frames: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Offer a completed frame from connection `index`.
    ///
    /// `connection_count` is the number of connections currently feeding the
    /// cache. Returns the buffered pair when the frame was accepted.
    pub fn offer(
        &mut self,
        index: usize,
        connection_count: usize,
        dynamics: Arc<DynamicObjects>,
    ) -> Option<&FramePair> {
        let frame = dynamics.frame_number();
        if connection_count > 1 {
            let newest_elsewhere = self
                .last_frame_ids
                .iter()
                .filter(|(other, _)| **other != index)
                .map(|(_, id)| *id)
                .max();
            if let Some(newest) = newest_elsewhere.filter(|newest| frame <= *newest) {
                trace!(index, frame, newest, "Dropping frame already seen on another connection");
                return None;
            }
        }

        self.last_frame_ids.insert(index, frame);
        self.frames.push_back(FramePair { statics: self.latest_static.clone(), dynamics });
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
        self.frames.back()
    }

    /// Record a new scene description for frames accepted from now on.
    pub fn set_static(&mut self, statics: Arc<StaticObjects>) {
        self.latest_static = Some(statics);
    }

    pub fn latest_static(&self) -> Option<&Arc<StaticObjects>> {
        self.latest_static.as_ref()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the bound, dropping the oldest frames if now over it.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Remove and return every buffered frame, oldest first.
    pub fn take_all(&mut self) -> Vec<FramePair> {
        std::mem::take(&mut self.frames).into()
    }

    pub fn pop_oldest(&mut self) -> Option<FramePair> {
        self.frames.pop_front()
    }

    pub fn last_frame_id(&self, index: usize) -> Option<u32> {
        self.last_frame_ids.get(&index).copied()
    }

    /// Stop counting a connection that has gone away.
    pub fn forget(&mut self, index: usize) {
        self.last_frame_ids.remove(&index);
    }
}
