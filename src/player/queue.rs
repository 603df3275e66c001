//! Queue table: the per-chat playback state map.
//!
//! Every chat's tracks, flags and panel reference live in one
//! [`ChatQueueState`] entry, so removing the entry clears all of them at once.
//! An entry exists only while its track list is non-empty.
//!
//! The table itself never awaits; the controller serializes mutations per chat
//! and performs the transport calls around these primitives.

use super::types::{ChatId, ChatQueueState, PanelRef, QueueSnapshot, StreamId, Track};
use crate::error::{AppError, AppResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

/// Result of putting a track into a chat's queue.
#[derive(Debug)]
pub struct PutOutcome {
    /// The new track is the head and must be started
    pub start: bool,
    /// Zero-based position of the new track
    pub position: usize,
    /// Tracks dropped by a replacing put
    pub displaced: Vec<Track>,
}

/// What the queue looks like after the current track is done.
#[derive(Debug)]
pub enum Advance {
    /// Chat has no playback state
    Absent,
    /// Looping: play the same head again
    Replay(Track),
    /// Head removed, a new head must be started
    Next { next: Track, finished: Track },
    /// Head removed and nothing is left; the chat entry is gone
    Finished(ChatQueueState),
}

/// Shared by the download tickets of a chat until the chat is stopped.
#[derive(Debug, Default)]
pub struct Session;

/// Mapping from chat to its playback state.
#[derive(Debug)]
pub struct QueueTable {
    chats: DashMap<ChatId, ChatQueueState>,
    /// Current session per chat; replaced when the chat is stopped
    sessions: DashMap<ChatId, Arc<Session>>,
    max_len: usize,
}

impl QueueTable {
    pub fn new(max_len: usize) -> Self {
        Self {
            chats: DashMap::new(),
            sessions: DashMap::new(),
            max_len: max_len.max(1),
        }
    }

    pub fn contains(&self, chat: ChatId) -> bool {
        self.chats.contains_key(&chat)
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn chats(&self) -> Vec<ChatId> {
        self.chats.iter().map(|e| *e.key()).collect()
    }

    pub fn snapshot(&self, chat: ChatId) -> Option<QueueSnapshot> {
        self.chats
            .get(&chat)
            .map(|state| QueueSnapshot::from_state(chat, &state))
    }

    pub fn head(&self, chat: ChatId) -> Option<Track> {
        self.chats.get(&chat)?.current().cloned()
    }

    pub fn current_stream(&self, chat: ChatId) -> Option<StreamId> {
        self.chats.get(&chat)?.current_stream
    }

    pub fn is_paused(&self, chat: ChatId) -> Option<bool> {
        self.chats.get(&chat).map(|s| s.paused)
    }

    pub fn is_muted(&self, chat: ChatId) -> Option<bool> {
        self.chats.get(&chat).map(|s| s.muted)
    }

    /// The chat's current session, started on first use.
    pub fn session(&self, chat: ChatId) -> Arc<Session> {
        self.sessions.entry(chat).or_default().clone()
    }

    /// Whether `session` was not ended by a [`remove`](Self::remove) since it was taken.
    pub fn is_current(&self, chat: ChatId, session: &Arc<Session>) -> bool {
        self.sessions
            .get(&chat)
            .map(|current| Arc::ptr_eq(&current, session))
            .unwrap_or(false)
    }

    /// Forget the session of an idle chat nobody holds a ticket for.
    pub fn prune(&self, chat: ChatId) {
        self.sessions.remove_if(&chat, |_, session| {
            Arc::strong_count(session) == 1 && !self.chats.contains_key(&chat)
        });
    }

    pub fn has_session(&self, chat: ChatId) -> bool {
        self.sessions.contains_key(&chat)
    }

    /// Add a track. A replacing put (or a put into an absent chat) makes it the only track.
    pub fn put(&self, chat: ChatId, track: Track, replace: bool) -> AppResult<PutOutcome> {
        match self.chats.entry(chat) {
            Entry::Vacant(entry) => {
                entry.insert(ChatQueueState::with_track(track));
                Ok(PutOutcome {
                    start: true,
                    position: 0,
                    displaced: Vec::new(),
                })
            }
            Entry::Occupied(mut entry) => {
                let state = entry.get_mut();
                if replace || state.tracks.is_empty() {
                    let displaced = std::mem::replace(&mut state.tracks, vec![track]);
                    state.looping = false;
                    state.current_stream = None;
                    Ok(PutOutcome {
                        start: true,
                        position: 0,
                        displaced,
                    })
                } else {
                    if state.tracks.len() >= self.max_len {
                        return Err(AppError::QueueFull(self.max_len));
                    }
                    state.tracks.push(track);
                    Ok(PutOutcome {
                        start: false,
                        position: state.tracks.len() - 1,
                        displaced: Vec::new(),
                    })
                }
            }
        }
    }

    /// Record that the transport accepted the head track.
    pub fn mark_started(&self, chat: ChatId, stream: StreamId) -> bool {
        match self.chats.get_mut(&chat) {
            Some(mut state) => {
                state.current_stream = Some(stream);
                state.paused = false;
                true
            }
            None => false,
        }
    }

    /// Move past the current track. `honor_loop = false` removes the head even when looping.
    pub fn advance(&self, chat: ChatId, honor_loop: bool) -> Advance {
        let Entry::Occupied(mut entry) = self.chats.entry(chat) else {
            return Advance::Absent;
        };

        let state = entry.get_mut();
        if state.tracks.is_empty() {
            return Advance::Finished(entry.remove());
        }
        if honor_loop && state.looping {
            return Advance::Replay(state.tracks[0].clone());
        }

        let finished = state.tracks.remove(0);
        state.current_stream = None;
        let next = state.tracks.first().cloned();
        match next {
            Some(next) => Advance::Next { next, finished },
            None => {
                let mut state = entry.remove();
                state.tracks.push(finished);
                Advance::Finished(state)
            }
        }
    }

    /// Tear a chat down and end its session. Returns its last state, if it had one.
    pub fn remove(&self, chat: ChatId) -> Option<ChatQueueState> {
        self.sessions.remove(&chat);
        self.chats.remove(&chat).map(|(_, state)| state)
    }

    /// Drop everything after the current track.
    pub fn clear_pending(&self, chat: ChatId) -> Option<Vec<Track>> {
        let mut state = self.chats.get_mut(&chat)?;
        let keep = state.tracks.len().min(1);
        Some(state.tracks.split_off(keep))
    }

    /// Randomly reorder `tracks[1..]`. Returns whether anything could move.
    pub fn shuffle_with<R: Rng + ?Sized>(&self, chat: ChatId, rng: &mut R) -> Option<bool> {
        let mut state = self.chats.get_mut(&chat)?;
        if state.tracks.len() < 3 {
            return Some(false);
        }
        state.tracks[1..].shuffle(rng);
        Some(true)
    }

    pub fn shuffle(&self, chat: ChatId) -> Option<bool> {
        self.shuffle_with(chat, &mut rand::thread_rng())
    }

    pub fn toggle_loop(&self, chat: ChatId) -> Option<bool> {
        let mut state = self.chats.get_mut(&chat)?;
        state.looping = !state.looping;
        Some(state.looping)
    }

    pub fn set_looping(&self, chat: ChatId, looping: bool) -> bool {
        match self.chats.get_mut(&chat) {
            Some(mut state) => {
                state.looping = looping;
                true
            }
            None => false,
        }
    }

    pub fn set_paused(&self, chat: ChatId, paused: bool) -> bool {
        match self.chats.get_mut(&chat) {
            Some(mut state) => {
                state.paused = paused;
                true
            }
            None => false,
        }
    }

    pub fn set_muted(&self, chat: ChatId, muted: bool) -> bool {
        match self.chats.get_mut(&chat) {
            Some(mut state) => {
                state.muted = muted;
                true
            }
            None => false,
        }
    }

    /// Remember the panel message for a playing chat.
    pub fn set_panel(&self, chat: ChatId, panel: PanelRef) -> bool {
        match self.chats.get_mut(&chat) {
            Some(mut state) => {
                state.panel = Some(panel);
                true
            }
            None => false,
        }
    }

    pub fn panel(&self, chat: ChatId) -> Option<PanelRef> {
        self.chats.get(&chat)?.panel
    }

    /// The transport did not accept the head; end notifications no longer match it.
    pub fn clear_stream(&self, chat: ChatId) {
        if let Some(mut state) = self.chats.get_mut(&chat) {
            state.current_stream = None;
        }
    }
}
