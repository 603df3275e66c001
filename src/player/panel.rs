//! Control panel projection.
//!
//! Turns a chat's queue snapshot into status text plus the set of buttons to
//! offer. Rendering into Discord components happens in the bot layer; button
//! presses come back as [`PanelAction`]s encoded in the component custom id.

use super::types::{ChatId, QueueSnapshot};
use std::fmt;
use std::str::FromStr;

const CUSTOM_ID_PREFIX: &str = "voicemod";

/// A controller operation a panel button triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelAction {
    Pause,
    Resume,
    Mute,
    Unmute,
    ToggleLoop,
    Skip,
    Stop,
}

impl PanelAction {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::ToggleLoop => "loop",
            Self::Skip => "skip",
            Self::Stop => "stop",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "mute" => Self::Mute,
            "unmute" => Self::Unmute,
            "loop" => Self::ToggleLoop,
            "skip" => Self::Skip,
            "stop" => Self::Stop,
            _ => return None,
        })
    }
}

/// Button press target: an action for one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelCommand {
    pub action: PanelAction,
    pub chat: ChatId,
}

impl PanelCommand {
    pub fn new(action: PanelAction, chat: ChatId) -> Self {
        Self { action, chat }
    }

    /// Component custom id, e.g. `voicemod:skip:1234`.
    pub fn custom_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PanelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", CUSTOM_ID_PREFIX, self.action.tag(), self.chat)
    }
}

/// Custom id that does not belong to the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotAPanelId;

impl FromStr for PanelCommand {
    type Err = NotAPanelId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        if parts.next() != Some(CUSTOM_ID_PREFIX) {
            return Err(NotAPanelId);
        }
        let action = parts.next().and_then(PanelAction::from_tag).ok_or(NotAPanelId)?;
        let chat = parts
            .next()
            .and_then(|id| id.parse::<u64>().ok())
            .ok_or(NotAPanelId)?;
        Ok(Self::new(action, ChatId(chat)))
    }
}

/// Visual weight of a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    Primary,
    Secondary,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelButton {
    pub command: PanelCommand,
    pub label: &'static str,
    pub kind: ButtonKind,
}

/// Rendered panel: status text plus buttons, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelView {
    pub text: String,
    pub buttons: Vec<PanelButton>,
}

/// Project a playing chat's state onto the panel.
pub fn render(snapshot: &QueueSnapshot) -> PanelView {
    let chat = snapshot.chat;
    let mut text = match snapshot.current() {
        Some(title) => format!("**Now playing:** {}", escape_markdown(title)),
        None => "**Now playing:** nothing".to_string(),
    };
    if let Some(next) = snapshot.next() {
        text.push_str(&format!("\n**Next:** {}", escape_markdown(next)));
    }
    if snapshot.len() > 2 {
        text.push_str(&format!(" (+{} more)", snapshot.len() - 2));
    }

    let mut status = Vec::new();
    if snapshot.paused {
        status.push("paused");
    }
    if snapshot.muted {
        status.push("muted");
    }
    if snapshot.looping {
        status.push("looping");
    }
    if !status.is_empty() {
        text.push_str(&format!("\n_{}_", status.join(", ")));
    }

    let mut buttons = vec![
        if snapshot.paused {
            button(PanelAction::Resume, chat, "Resume", ButtonKind::Primary)
        } else {
            button(PanelAction::Pause, chat, "Pause", ButtonKind::Secondary)
        },
        if snapshot.muted {
            button(PanelAction::Unmute, chat, "Unmute", ButtonKind::Primary)
        } else {
            button(PanelAction::Mute, chat, "Mute", ButtonKind::Secondary)
        },
        if snapshot.looping {
            button(PanelAction::ToggleLoop, chat, "Loop: on", ButtonKind::Primary)
        } else {
            button(PanelAction::ToggleLoop, chat, "Loop: off", ButtonKind::Secondary)
        },
    ];
    if snapshot.len() > 1 {
        buttons.push(button(PanelAction::Skip, chat, "Skip", ButtonKind::Secondary));
    }
    buttons.push(button(PanelAction::Stop, chat, "Stop", ButtonKind::Danger));

    PanelView { text, buttons }
}

/// Panel for a chat with nothing playing.
pub fn render_idle() -> PanelView {
    PanelView {
        text: "**Nothing is playing.**".to_string(),
        buttons: Vec::new(),
    }
}

fn button(action: PanelAction, chat: ChatId, label: &'static str, kind: ButtonKind) -> PanelButton {
    PanelButton {
        command: PanelCommand::new(action, chat),
        label,
        kind,
    }
}

/// Escape Discord markdown so titles render literally.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '\\' | '*' | '_' | '~' | '`' | '|' | '>' | '#' | '[' | ']' | '(' | ')' | '-'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
