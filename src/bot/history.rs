//! Per-chat conversation history.
//!
//! Each chat keeps its most recent exchanges in memory. Entries are capped
//! per chat and pruned by age on a periodic sweep. Nothing is persisted, so
//! history starts empty after a restart.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Maximum number of entries kept per chat.
pub const MAX_HISTORY: usize = 10;

/// Who wrote a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    User,
    Bot,
}

/// One message in a chat's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub author: Author,
    /// Display name of the user, or the persona name for bot turns.
    pub author_label: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn user(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: Author::User,
            author_label: label.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn bot(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author: Author::Bot,
            author_label: label.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// History for every chat the bot has talked in.
///
/// The lock is only held for the duration of a single map operation and
/// never across an `.await`.
pub struct HistoryStore {
    chats: Mutex<HashMap<i64, VecDeque<HistoryEntry>>>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            chats: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Every operation leaves the map consistent, so a lock poisoned by a
    /// panicking handler is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<i64, VecDeque<HistoryEntry>>> {
        self.chats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry, evicting the oldest ones beyond capacity.
    pub fn append(&self, chat_id: i64, entry: HistoryEntry) {
        let mut chats = self.lock();
        let history = chats.entry(chat_id).or_default();
        history.push_back(entry);
        while history.len() > self.capacity {
            history.pop_front();
        }
    }

    /// Snapshot of a chat's history, oldest first.
    pub fn get(&self, chat_id: i64) -> Vec<HistoryEntry> {
        let chats = self.lock();
        chats
            .get(&chat_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove entries older than `max_age`. Returns how many were removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        self.sweep_at(Utc::now(), max_age)
    }

    /// Same as [`sweep`](Self::sweep) against an explicit clock.
    pub fn sweep_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(max_age).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut chats = self.lock();
        let mut removed = 0;
        for history in chats.values_mut() {
            let before = history.len();
            history.retain(|entry| entry.timestamp > cutoff);
            removed += before - history.len();
        }
        chats.retain(|_, history| !history.is_empty());
        removed
    }

    /// Number of chats with at least one entry.
    pub fn chat_count(&self) -> usize {
        self.lock().len()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}
