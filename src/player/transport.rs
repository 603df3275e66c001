//! The narrow interface the queue controller needs from a voice call library.

use super::types::{ChatId, StreamId, StreamShape};
use crate::error::AppResult;
use async_trait::async_trait;
use std::path::Path;

/// Asynchronous notifications emitted by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// The stream started by `play` finished (or failed mid-way)
    StreamEnded { chat: ChatId, stream: StreamId },
    /// The call was left without us asking (kicked, channel deleted, connection lost)
    LeftCall { chat: ChatId },
}

impl TransportEvent {
    pub fn chat(&self) -> ChatId {
        match self {
            Self::StreamEnded { chat, .. } | Self::LeftCall { chat } => *chat,
        }
    }
}

/// Real-time streaming capability for voice calls.
///
/// Implementations report notifications through a channel handed to them at
/// construction; the controller never inspects the concrete type.
#[async_trait]
pub trait CallTransport: Send + Sync {
    /// Connect to the voice channel of a chat.
    async fn join(&self, chat: ChatId, channel: u64) -> AppResult<()>;

    /// Replace whatever the chat is streaming with the given file.
    async fn play(&self, chat: ChatId, path: &Path, shape: StreamShape) -> AppResult<StreamId>;

    async fn pause(&self, chat: ChatId) -> AppResult<()>;

    async fn resume(&self, chat: ChatId) -> AppResult<()>;

    async fn mute(&self, chat: ChatId) -> AppResult<()>;

    async fn unmute(&self, chat: ChatId) -> AppResult<()>;

    /// Disconnect from the chat's call.
    async fn leave(&self, chat: ChatId) -> AppResult<()>;

    /// Whether a call is currently joined for the chat.
    fn in_call(&self, chat: ChatId) -> bool;
}
