//! Data model shared by the queue controller, transports and the panel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifier of a chat that can host a voice call (a Discord guild).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub u64);

impl ChatId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChatId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Which streams the call transport is asked to send for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamShape {
    AudioOnly,
    AudioVideo,
}

/// Identity of one play request, handed out by the transport.
///
/// Stream-end notifications carry it so that the end of a replaced stream
/// is not mistaken for the end of the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub Uuid);

impl StreamId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One playable media item, materialized on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Local media file handed to the transport
    pub source_path: PathBuf,
    /// Display title (untrusted, escape before rendering)
    pub title: String,
    /// Ask the transport for an audio-only stream
    pub audio_only: bool,
    /// The file was downloaded for this track and is deleted when the track leaves the queue
    pub owned: bool,
}

impl Track {
    pub fn new(source_path: impl Into<PathBuf>, title: impl Into<String>, audio_only: bool) -> Self {
        Self {
            source_path: source_path.into(),
            title: title.into(),
            audio_only,
            owned: false,
        }
    }

    /// Mark the file as downloaded for this track.
    pub fn owned(mut self) -> Self {
        self.owned = true;
        self
    }

    pub fn shape(&self) -> StreamShape {
        if self.audio_only {
            StreamShape::AudioOnly
        } else {
            StreamShape::AudioVideo
        }
    }

    pub fn path(&self) -> &Path {
        &self.source_path
    }

    /// Delete the backing file if this track owns it.
    pub async fn release(self) {
        if !self.owned {
            return;
        }
        match tokio::fs::remove_file(&self.source_path).await {
            Ok(()) => debug!(path = %self.source_path.display(), "Released track file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.source_path.display(), error = %e, "Failed to delete track file"),
        }
    }
}

/// A previously sent control panel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// Per-chat playback state. Present in the queue table only while `tracks` is non-empty.
#[derive(Debug, Clone, Default)]
pub struct ChatQueueState {
    /// Play order; `tracks[0]` is the current track
    pub tracks: Vec<Track>,
    pub looping: bool,
    pub paused: bool,
    pub muted: bool,
    pub panel: Option<PanelRef>,
    /// Stream of the current track, once the transport accepted it
    pub current_stream: Option<StreamId>,
}

impl ChatQueueState {
    pub fn with_track(track: Track) -> Self {
        Self {
            tracks: vec![track],
            ..Default::default()
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.first()
    }

    pub fn next(&self) -> Option<&Track> {
        self.tracks.get(1)
    }
}

/// Read-only view of a chat's state, used for listings and panel rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub chat: ChatId,
    pub titles: Vec<String>,
    pub looping: bool,
    pub paused: bool,
    pub muted: bool,
}

impl QueueSnapshot {
    pub fn from_state(chat: ChatId, state: &ChatQueueState) -> Self {
        Self {
            chat,
            titles: state.tracks.iter().map(|t| t.title.clone()).collect(),
            looping: state.looping,
            paused: state.paused,
            muted: state.muted,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.titles.first().map(String::as_str)
    }

    pub fn next(&self) -> Option<&str> {
        self.titles.get(1).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}
