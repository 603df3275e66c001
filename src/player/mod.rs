//! Voice chat playback.
//!
//! This module owns the per-chat playback queues and keeps the voice call in
//! step with them.
//!
//! ## Architecture
//!
//! ```text
//!  commands / panel buttons
//!         │
//!         ▼
//! ┌─────────────────┐   PlaybackEvent    ┌──────────────────┐
//! │ QueueController │ ─────────────────▶ │ panel refresher  │
//! │  (per-chat lock)│                    └──────────────────┘
//! └───┬─────────▲───┘
//!     │         │ TransportEvent (stream ended / left call)
//!     ▼         │
//! ┌─────────────────┐
//! │  CallTransport  │  ← SongbirdTransport
//! └─────────────────┘
//! ```
//!
//! The queue table is only ever touched by the controller; everything else
//! reads [`QueueSnapshot`]s.

pub mod controller;
pub mod events;
pub mod panel;
pub mod queue;
pub mod songbird_transport;
pub mod transport;
pub mod types;

pub use controller::{
    DownloadTicket, EnqueueOutcome, PlaylistOutcome, QueueController, SkipOutcome,
    TrackEndOutcome,
};
pub use events::{run_event_loop, spawn_event_loop, PlaybackEvent};
pub use panel::{PanelAction, PanelCommand, PanelView};
pub use queue::QueueTable;
pub use songbird_transport::SongbirdTransport;
pub use transport::{CallTransport, TransportEvent};
pub use types::{ChatId, ChatQueueState, PanelRef, QueueSnapshot, StreamId, StreamShape, Track};
