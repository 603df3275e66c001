//! [`CallTransport`] backed by songbird voice connections.
//!
//! Discord voice carries audio only, so both stream shapes play the audio of
//! the downloaded file.

use super::transport::{CallTransport, TransportEvent};
use super::types::{ChatId, StreamId, StreamShape};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use dashmap::DashMap;
use songbird::{
    events::context_data::DisconnectReason,
    id::{ChannelId, GuildId},
    input::{File, Input},
    tracks::TrackHandle,
    Call, CoreEvent, Event, EventContext, EventHandler, Songbird, TrackEvent,
};
use std::num::NonZeroU64;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Voice calls through songbird, one per guild.
pub struct SongbirdTransport {
    songbird: Arc<Songbird>,
    /// Handle of the stream currently playing in each chat
    streams: DashMap<ChatId, TrackHandle>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl SongbirdTransport {
    /// Create the transport and the receiver its notifications arrive on.
    pub fn new(songbird: Arc<Songbird>) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Self {
            songbird,
            streams: DashMap::new(),
            events,
        };
        (transport, rx)
    }

    fn call(&self, chat: ChatId) -> AppResult<Arc<Mutex<Call>>> {
        self.songbird.get(guild_id(chat)?).ok_or(AppError::NotInCall)
    }

    fn stream(&self, chat: ChatId) -> AppResult<TrackHandle> {
        self.streams
            .get(&chat)
            .map(|h| h.clone())
            .ok_or(AppError::EmptyQueue)
    }
}

fn guild_id(chat: ChatId) -> AppResult<GuildId> {
    NonZeroU64::new(chat.get())
        .map(GuildId::from)
        .ok_or_else(|| AppError::UnsupportedChat(format!("invalid guild id {}", chat)))
}

#[async_trait]
impl CallTransport for SongbirdTransport {
    async fn join(&self, chat: ChatId, channel: u64) -> AppResult<()> {
        let channel = NonZeroU64::new(channel)
            .map(ChannelId::from)
            .ok_or_else(|| AppError::UnsupportedChat(format!("invalid channel id {}", channel)))?;
        let guild = guild_id(chat)?;
        let already_joined = self.songbird.get(guild).is_some();

        let call = self.songbird.join(guild, channel).await.map_err(|e| {
            warn!(%chat, error = %e, "Failed to join voice channel");
            AppError::transport(format!("failed to join voice channel: {}", e))
        })?;

        if !already_joined {
            call.lock().await.add_global_event(
                CoreEvent::DriverDisconnect.into(),
                DisconnectNotifier {
                    chat,
                    events: self.events.clone(),
                },
            );
        }
        Ok(())
    }

    async fn play(&self, chat: ChatId, path: &Path, shape: StreamShape) -> AppResult<StreamId> {
        let call = self.call(chat)?;
        if shape == StreamShape::AudioVideo {
            debug!(%chat, "Video stream requested, voice carries the audio only");
        }

        let input: Input = File::new(path.to_path_buf()).into();
        let handle = {
            let mut call = call.lock().await;
            call.stop();
            call.play_input(input)
        };

        let stream = StreamId(handle.uuid());
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    StreamEndNotifier {
                        chat,
                        stream,
                        events: self.events.clone(),
                    },
                )
                .map_err(|e| AppError::transport(format!("failed to watch stream: {}", e)))?;
        }

        self.streams.insert(chat, handle);
        debug!(%chat, %stream, path = %path.display(), "Streaming file");
        Ok(stream)
    }

    async fn pause(&self, chat: ChatId) -> AppResult<()> {
        self.stream(chat)?
            .pause()
            .map_err(|e| AppError::transport(format!("pause failed: {}", e)))
    }

    async fn resume(&self, chat: ChatId) -> AppResult<()> {
        self.stream(chat)?
            .play()
            .map_err(|e| AppError::transport(format!("resume failed: {}", e)))
    }

    async fn mute(&self, chat: ChatId) -> AppResult<()> {
        let call = self.call(chat)?;
        let mut call = call.lock().await;
        call.mute(true)
            .await
            .map_err(|e| AppError::transport(format!("mute failed: {}", e)))
    }

    async fn unmute(&self, chat: ChatId) -> AppResult<()> {
        let call = self.call(chat)?;
        let mut call = call.lock().await;
        call.mute(false)
            .await
            .map_err(|e| AppError::transport(format!("unmute failed: {}", e)))
    }

    async fn leave(&self, chat: ChatId) -> AppResult<()> {
        self.streams.remove(&chat);
        let guild = guild_id(chat)?;
        if self.songbird.get(guild).is_none() {
            return Err(AppError::NotInCall);
        }
        self.songbird
            .remove(guild)
            .await
            .map_err(|e| AppError::transport(format!("failed to leave call: {}", e)))?;
        info!(%chat, "Left voice call");
        Ok(())
    }

    fn in_call(&self, chat: ChatId) -> bool {
        guild_id(chat)
            .map(|guild| self.songbird.get(guild).is_some())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for SongbirdTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongbirdTransport")
            .field("streams", &self.streams.len())
            .finish()
    }
}

/// Reports the end (or failure) of one stream.
struct StreamEndNotifier {
    chat: ChatId,
    stream: StreamId,
    events: mpsc::UnboundedSender<TransportEvent>,
}

#[async_trait]
impl EventHandler for StreamEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _) in tracks.iter() {
                debug!(chat = %self.chat, stream = %self.stream, mode = ?state.playing, "Stream ended");
            }
        }
        let _ = self.events.send(TransportEvent::StreamEnded {
            chat: self.chat,
            stream: self.stream,
        });
        None
    }
}

/// Reports disconnects we did not ask for.
struct DisconnectNotifier {
    chat: ChatId,
    events: mpsc::UnboundedSender<TransportEvent>,
}

#[async_trait]
impl EventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            match &data.reason {
                None | Some(DisconnectReason::Requested) => {
                    debug!(chat = %self.chat, "Requested disconnect");
                }
                Some(reason) => {
                    warn!(chat = %self.chat, ?reason, "Voice driver disconnected");
                    let _ = self.events.send(TransportEvent::LeftCall { chat: self.chat });
                }
            }
        }
        None
    }
}
