//! Per-chat playback queue controller.
//!
//! Keeps exactly one playback intent per chat and the call transport in step
//! with the logical queue. All mutations for one chat run under that chat's
//! async lock, so a stream-end notification racing a user's skip is applied
//! strictly one after the other.

use super::events::PlaybackEvent;
use super::queue::{Advance, QueueTable, Session};
use super::transport::{CallTransport, TransportEvent};
use super::types::{ChatId, ChatQueueState, PanelRef, QueueSnapshot, StreamId, Track};
use crate::config::PlayerConfig;
use crate::error::{AppError, AppResult};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Result of adding a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The track became the head and is now playing
    Started { title: String },
    /// The track waits behind the current one
    Queued { title: String, position: usize },
}

/// Result of adding a whole playlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistOutcome {
    /// Title of the track that started playing, if the chat was idle
    pub started: Option<String>,
    /// Tracks added, including the started one
    pub added: usize,
    /// Tracks discarded because the queue was full
    pub dropped: usize,
}

/// What a stream-end notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEndOutcome {
    /// Duplicate or stale notification
    Ignored,
    /// Looping: the same track started again
    Replayed { title: String },
    /// The next track started
    Advanced { title: String },
    /// The queue ran out; the call was left and the chat's state destroyed
    Finished,
}

/// What a skip did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipOutcome {
    Advanced { title: String },
    Finished,
}

/// Captured before a download so its result can be discarded if the chat was
/// stopped in the meantime.
#[derive(Debug, Clone)]
pub struct DownloadTicket {
    pub chat: ChatId,
    session: Arc<Session>,
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Pause,
    Resume,
    Mute,
    Unmute,
}

impl Control {
    fn name(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
        }
    }
}

/// Queue controller shared by commands, panel buttons and the transport event loop.
pub struct QueueController {
    transport: Arc<dyn CallTransport>,
    table: QueueTable,
    locks: DashMap<ChatId, Arc<Mutex<()>>>,
    events: broadcast::Sender<PlaybackEvent>,
    timeout: Duration,
}

impl QueueController {
    pub fn new(transport: Arc<dyn CallTransport>, config: &PlayerConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            transport,
            table: QueueTable::new(config.max_queue_len),
            locks: DashMap::new(),
            events,
            timeout: config.transport_timeout(),
        }
    }

    /// Subscribe to playback notifications (panel refresh, announcements).
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn is_playing(&self, chat: ChatId) -> bool {
        self.table.contains(chat)
    }

    pub fn in_call(&self, chat: ChatId) -> bool {
        self.transport.in_call(chat)
    }

    pub fn snapshot(&self, chat: ChatId) -> Option<QueueSnapshot> {
        self.table.snapshot(chat)
    }

    pub fn active_chats(&self) -> Vec<ChatId> {
        self.table.chats()
    }

    pub fn panel(&self, chat: ChatId) -> Option<PanelRef> {
        self.table.panel(chat)
    }

    /// Remember a panel message. Ignored when the chat is not playing.
    pub fn set_panel(&self, chat: ChatId, panel: PanelRef) -> bool {
        self.table.set_panel(chat, panel)
    }

    pub fn ticket(&self, chat: ChatId) -> DownloadTicket {
        DownloadTicket {
            chat,
            session: self.table.session(chat),
        }
    }

    pub async fn join(&self, chat: ChatId, channel: u64) -> AppResult<()> {
        let _guard = self.lock(chat).await;
        self.call("join", self.transport.join(chat, channel)).await?;
        info!(%chat, channel, "Joined voice call");
        Ok(())
    }

    /// Add a track; `replace_queue` makes it the only track and starts it now.
    pub async fn enqueue(
        &self,
        chat: ChatId,
        track: Track,
        replace_queue: bool,
    ) -> AppResult<EnqueueOutcome> {
        let _guard = self.lock(chat).await;
        self.enqueue_locked(chat, track, replace_queue).await
    }

    /// Like [`enqueue`](Self::enqueue), but discards the track if the chat was
    /// torn down after the ticket was taken.
    pub async fn enqueue_with_ticket(
        &self,
        ticket: DownloadTicket,
        track: Track,
        replace_queue: bool,
    ) -> AppResult<EnqueueOutcome> {
        let chat = ticket.chat;
        let _guard = self.lock(chat).await;
        if self.is_stale(&ticket) {
            info!(%chat, title = %track.title, "Discarding download for stopped chat");
            track.release().await;
            return Err(AppError::Cancelled);
        }
        self.enqueue_locked(chat, track, replace_queue).await
    }

    /// Append a resolved playlist in order. The first track starts if the chat was idle.
    pub async fn enqueue_playlist(
        &self,
        ticket: DownloadTicket,
        tracks: Vec<Track>,
    ) -> AppResult<PlaylistOutcome> {
        let chat = ticket.chat;
        let _guard = self.lock(chat).await;
        if self.is_stale(&ticket) {
            for track in tracks {
                track.release().await;
            }
            return Err(AppError::Cancelled);
        }

        let mut outcome = PlaylistOutcome::default();
        let mut tracks = tracks.into_iter();
        while let Some(track) = tracks.next() {
            match self.enqueue_locked(chat, track, false).await {
                Ok(EnqueueOutcome::Started { title }) => {
                    outcome.started = Some(title);
                    outcome.added += 1;
                }
                Ok(EnqueueOutcome::Queued { .. }) => outcome.added += 1,
                Err(AppError::QueueFull(_)) => {
                    outcome.dropped = 1 + tracks.len();
                    for rest in tracks.by_ref() {
                        rest.release().await;
                    }
                }
                Err(e) => {
                    for rest in tracks.by_ref() {
                        rest.release().await;
                    }
                    return Err(e);
                }
            }
        }
        Ok(outcome)
    }

    /// (Re)start the head track on the transport.
    pub async fn start_current(&self, chat: ChatId) -> AppResult<String> {
        let _guard = self.lock(chat).await;
        self.start_locked(chat).await
    }

    /// The current track finished playing.
    pub async fn on_track_end(&self, chat: ChatId) -> AppResult<TrackEndOutcome> {
        let _guard = self.lock(chat).await;
        self.track_end_locked(chat).await
    }

    /// A specific stream finished. Ends of streams that are no longer current are ignored.
    pub async fn on_stream_ended(
        &self,
        chat: ChatId,
        stream: StreamId,
    ) -> AppResult<TrackEndOutcome> {
        let _guard = self.lock(chat).await;
        if self.table.current_stream(chat) != Some(stream) {
            debug!(%chat, %stream, "Ignoring end of stale stream");
            return Ok(TrackEndOutcome::Ignored);
        }
        self.track_end_locked(chat).await
    }

    /// Skip the current track. Always cancels looping.
    pub async fn skip(&self, chat: ChatId) -> AppResult<SkipOutcome> {
        let _guard = self.lock(chat).await;
        if !self.table.set_looping(chat, false) {
            return Err(AppError::EmptyQueue);
        }

        match self.table.advance(chat, false) {
            Advance::Absent => Err(AppError::EmptyQueue),
            Advance::Replay(_) => Err(AppError::internal("skip replayed a looping track")),
            Advance::Next { next, finished } => {
                info!(%chat, skipped = %finished.title, "Skipped track");
                finished.release().await;
                self.start_locked(chat).await?;
                Ok(SkipOutcome::Advanced { title: next.title })
            }
            Advance::Finished(state) => {
                info!(%chat, "Skipped last track");
                self.finish(chat, state).await?;
                Ok(SkipOutcome::Finished)
            }
        }
    }

    /// Leave the call and destroy the chat's state, whatever the queue holds.
    ///
    /// Returns whether there was any playback state. The state is cleared even
    /// when the transport fails to leave; that failure is returned afterwards.
    pub async fn stop(&self, chat: ChatId) -> AppResult<bool> {
        let _guard = self.lock(chat).await;
        let had_state = match self.table.remove(chat) {
            Some(state) => {
                self.teardown(chat, state).await;
                true
            }
            None => false,
        };
        match self.call("leave", self.transport.leave(chat)).await {
            Ok(()) => {}
            // The call already went away on its own
            Err(AppError::NotInCall) if had_state => {}
            Err(e) => return Err(e),
        }
        info!(%chat, had_state, "Stopped playback and left call");
        Ok(had_state)
    }

    /// Same as [`stop`](Self::stop); the `leave` command.
    pub async fn leave(&self, chat: ChatId) -> AppResult<bool> {
        self.stop(chat).await
    }

    /// The transport reports the call is gone. Destroys state without calling back into it.
    pub async fn on_left_call(&self, chat: ChatId) {
        let _guard = self.lock(chat).await;
        if let Some(state) = self.table.remove(chat) {
            info!(%chat, "Left call, dropping playback state");
            self.teardown(chat, state).await;
        }
    }

    pub async fn handle_event(&self, event: TransportEvent) -> AppResult<()> {
        match event {
            TransportEvent::StreamEnded { chat, stream } => {
                self.on_stream_ended(chat, stream).await?;
            }
            TransportEvent::LeftCall { chat } => self.on_left_call(chat).await,
        }
        Ok(())
    }

    /// Randomly reorder everything after the current track.
    pub async fn shuffle(&self, chat: ChatId) -> AppResult<bool> {
        let _guard = self.lock(chat).await;
        let moved = self.table.shuffle(chat).ok_or(AppError::EmptyQueue)?;
        if moved {
            self.publish(PlaybackEvent::StateChanged { chat });
        }
        Ok(moved)
    }

    /// Flip looping of the current track. Returns the new value.
    pub async fn toggle_loop(&self, chat: ChatId) -> AppResult<bool> {
        let _guard = self.lock(chat).await;
        let looping = self.table.toggle_loop(chat).ok_or(AppError::EmptyQueue)?;
        info!(%chat, looping, "Toggled loop");
        self.publish(PlaybackEvent::StateChanged { chat });
        Ok(looping)
    }

    /// Drop every queued track after the current one. Returns how many were dropped.
    pub async fn clear_pending(&self, chat: ChatId) -> AppResult<usize> {
        let _guard = self.lock(chat).await;
        let dropped = self.table.clear_pending(chat).ok_or(AppError::EmptyQueue)?;
        let count = dropped.len();
        for track in dropped {
            track.release().await;
        }
        if count > 0 {
            self.publish(PlaybackEvent::StateChanged { chat });
        }
        Ok(count)
    }

    /// Returns `false` when already paused (no transport call is made).
    pub async fn pause(&self, chat: ChatId) -> AppResult<bool> {
        self.control(chat, Control::Pause).await
    }

    pub async fn resume(&self, chat: ChatId) -> AppResult<bool> {
        self.control(chat, Control::Resume).await
    }

    pub async fn mute(&self, chat: ChatId) -> AppResult<bool> {
        self.control(chat, Control::Mute).await
    }

    pub async fn unmute(&self, chat: ChatId) -> AppResult<bool> {
        self.control(chat, Control::Unmute).await
    }

    async fn control(&self, chat: ChatId, control: Control) -> AppResult<bool> {
        let _guard = self.lock(chat).await;

        let (current, target) = match control {
            Control::Pause => (self.table.is_paused(chat), true),
            Control::Resume => (self.table.is_paused(chat), false),
            Control::Mute => (self.table.is_muted(chat), true),
            Control::Unmute => (self.table.is_muted(chat), false),
        };
        let current = current.ok_or(AppError::EmptyQueue)?;
        if current == target {
            debug!(%chat, control = control.name(), "Already in requested state");
            return Ok(false);
        }

        let request = match control {
            Control::Pause => self.transport.pause(chat),
            Control::Resume => self.transport.resume(chat),
            Control::Mute => self.transport.mute(chat),
            Control::Unmute => self.transport.unmute(chat),
        };
        self.call(control.name(), request).await?;

        match control {
            Control::Pause | Control::Resume => self.table.set_paused(chat, target),
            Control::Mute | Control::Unmute => self.table.set_muted(chat, target),
        };
        info!(%chat, control = control.name(), "Playback control applied");
        self.publish(PlaybackEvent::StateChanged { chat });
        Ok(true)
    }

    async fn enqueue_locked(
        &self,
        chat: ChatId,
        track: Track,
        replace_queue: bool,
    ) -> AppResult<EnqueueOutcome> {
        let title = track.title.clone();
        let backup = track.clone();
        let outcome = match self.table.put(chat, track, replace_queue) {
            Ok(outcome) => outcome,
            Err(e) => {
                backup.release().await;
                return Err(e);
            }
        };

        if !outcome.start {
            info!(%chat, %title, position = outcome.position, "Queued track");
            self.publish(PlaybackEvent::StateChanged { chat });
            return Ok(EnqueueOutcome::Queued {
                title,
                position: outcome.position,
            });
        }

        let started = self.start_locked(chat).await;
        for track in outcome.displaced {
            track.release().await;
        }
        started?;
        Ok(EnqueueOutcome::Started { title })
    }

    async fn start_locked(&self, chat: ChatId) -> AppResult<String> {
        let track = self.table.head(chat).ok_or(AppError::EmptyQueue)?;

        let stream = match self
            .call("play", self.transport.play(chat, track.path(), track.shape()))
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                // The head stays queued; skip or a replay retries it
                warn!(%chat, title = %track.title, error = %e, "Failed to start track");
                self.table.clear_stream(chat);
                return Err(e);
            }
        };

        if self.table.mark_started(chat, stream) {
            info!(%chat, title = %track.title, %stream, "Started track");
            self.publish(PlaybackEvent::TrackStarted {
                chat,
                title: track.title.clone(),
            });
        }
        Ok(track.title)
    }

    async fn track_end_locked(&self, chat: ChatId) -> AppResult<TrackEndOutcome> {
        match self.table.advance(chat, true) {
            Advance::Absent => {
                debug!(%chat, "Track end for idle chat");
                Ok(TrackEndOutcome::Ignored)
            }
            Advance::Replay(track) => {
                debug!(%chat, title = %track.title, "Looping track");
                let title = self.start_locked(chat).await?;
                Ok(TrackEndOutcome::Replayed { title })
            }
            Advance::Next { next, finished } => {
                finished.release().await;
                self.start_locked(chat).await?;
                Ok(TrackEndOutcome::Advanced { title: next.title })
            }
            Advance::Finished(state) => {
                info!(%chat, "Queue finished");
                self.finish(chat, state).await?;
                Ok(TrackEndOutcome::Finished)
            }
        }
    }

    /// The queue ran empty: release the state, then leave the call.
    async fn finish(&self, chat: ChatId, state: ChatQueueState) -> AppResult<()> {
        self.teardown(chat, state).await;
        self.call("leave", self.transport.leave(chat)).await
    }

    async fn teardown(&self, chat: ChatId, state: ChatQueueState) {
        let panel = state.panel;
        for track in state.tracks {
            track.release().await;
        }
        self.publish(PlaybackEvent::Stopped { chat, panel });
    }

    fn is_stale(&self, ticket: &DownloadTicket) -> bool {
        !self.table.is_current(ticket.chat, &ticket.session)
    }

    fn publish(&self, event: PlaybackEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn lock(&self, chat: ChatId) -> ChatGuard<'_> {
        let lock = self.locks.entry(chat).or_default().clone();
        ChatGuard {
            guard: Some(lock.lock_owned().await),
            controller: self,
            chat,
        }
    }

    /// Drop the bookkeeping of an idle chat once nobody waits on it.
    fn prune(&self, chat: ChatId) {
        self.locks.remove_if(&chat, |_, lock| {
            Arc::strong_count(lock) == 1 && !self.table.contains(chat)
        });
        self.table.prune(chat);
    }

    /// Number of chats with a live per-chat lock.
    pub fn tracked_chats(&self) -> usize {
        self.locks.len()
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        request: impl Future<Output = AppResult<T>>,
    ) -> AppResult<T> {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_secs = self.timeout.as_secs(), "Transport call timed out");
                Err(AppError::Timeout { operation })
            }
        }
    }
}

/// Holds a chat's lock; releasing it prunes the chat if it went idle.
struct ChatGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    controller: &'a QueueController,
    chat: ChatId,
}

impl Drop for ChatGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.controller.prune(self.chat);
    }
}

impl std::fmt::Debug for QueueController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueController")
            .field("active_chats", &self.table.len())
            .finish()
    }
}
