//! Playback notifications and the transport event loop.

use super::controller::QueueController;
use super::transport::TransportEvent;
use super::types::{ChatId, PanelRef};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Published by the controller after a chat's state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The transport accepted a new head track
    TrackStarted { chat: ChatId, title: String },
    /// Flags or queue contents changed while playing
    StateChanged { chat: ChatId },
    /// The chat's state was destroyed; `panel` is the panel it had, if any
    Stopped { chat: ChatId, panel: Option<PanelRef> },
}

impl PlaybackEvent {
    pub fn chat(&self) -> ChatId {
        match self {
            Self::TrackStarted { chat, .. }
            | Self::StateChanged { chat }
            | Self::Stopped { chat, .. } => *chat,
        }
    }
}

/// Feed transport notifications into the controller until the transport goes away.
///
/// Notifications are applied one at a time in arrival order. Every transport
/// call the controller makes is bounded by its timeout, so one slow chat
/// delays the others by at most that long.
pub async fn run_event_loop(
    controller: Arc<QueueController>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    info!("Transport event loop started");

    while let Some(event) = events.recv().await {
        debug!(?event, "Transport event");
        if let Err(e) = controller.handle_event(event).await {
            warn!(chat = %event.chat(), error = %e, "Failed to handle transport event");
        }
    }

    info!("Transport event loop stopped");
}

/// Spawn [`run_event_loop`] as a background task.
pub fn spawn_event_loop(
    controller: Arc<QueueController>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(run_event_loop(controller, events))
}
