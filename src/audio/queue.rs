use std::collections::VecDeque;
use tracing::{debug, info};

use crate::{error::PlaybackError, sources::Track};

/// One line of a queue listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// 1-based position; position 1 is the track currently playing, if any.
    pub position: usize,
    pub title: String,
}

/// FIFO backlog of tracks for a single guild.
///
/// The head stays in place while it plays and is only removed once its
/// completion (or a skip) has been observed, so `peek_front` always names the
/// audible track while the engine is active.
#[derive(Debug)]
pub struct TrackQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Appends a track and returns its 1-based position.
    pub fn enqueue(&mut self, track: Track) -> Result<usize, PlaybackError> {
        if self.items.len() >= self.max_size {
            return Err(PlaybackError::QueueFull { max: self.max_size });
        }

        info!("➕ Added to queue: {}", track.title());
        self.items.push_back(track);

        Ok(self.items.len())
    }

    pub fn peek_front(&self) -> Option<&Track> {
        self.items.front()
    }

    /// Removes the head. An empty queue yields `None`, meaning "no next track".
    pub fn dequeue_front(&mut self) -> Option<Track> {
        let head = self.items.pop_front();
        match &head {
            Some(track) => debug!("➡️ Dequeued: {}", track.title()),
            None => debug!("📭 Dequeue on empty queue"),
        }
        head
    }

    /// Point-in-time listing; callers hold the guild lock while taking it.
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, track)| QueueEntry {
                position: index + 1,
                title: track.title().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
