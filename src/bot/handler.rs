//! Control panel plumbing: button presses in, panel edits out.

use crate::bot::Data;
use crate::error::{AppError, AppResult};
use crate::player::panel::{self, ButtonKind, PanelAction, PanelCommand, PanelView};
use crate::player::{ChatId, PanelRef, PlaybackEvent, QueueController};
use poise::serenity_prelude::{self as serenity, Context};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const BUTTONS_PER_ROW: usize = 5;

/// Discord components for a rendered panel.
pub fn components(view: &PanelView) -> Vec<serenity::CreateActionRow> {
    view.buttons
        .chunks(BUTTONS_PER_ROW)
        .map(|row| {
            let buttons = row
                .iter()
                .map(|b| {
                    serenity::CreateButton::new(b.command.custom_id())
                        .label(b.label)
                        .style(button_style(b.kind))
                })
                .collect();
            serenity::CreateActionRow::Buttons(buttons)
        })
        .collect()
}

fn button_style(kind: ButtonKind) -> serenity::ButtonStyle {
    match kind {
        ButtonKind::Primary => serenity::ButtonStyle::Primary,
        ButtonKind::Secondary => serenity::ButtonStyle::Secondary,
        ButtonKind::Danger => serenity::ButtonStyle::Danger,
    }
}

/// Current panel for a chat, or the idle panel once playback is over.
pub fn current_view(controller: &QueueController, chat: ChatId) -> PanelView {
    controller
        .snapshot(chat)
        .map(|snapshot| panel::render(&snapshot))
        .unwrap_or_else(panel::render_idle)
}

/// Handle a button press on a panel message.
pub async fn handle_component(ctx: &Context, component: &serenity::ComponentInteraction, data: &Data) {
    let Ok(command) = component.data.custom_id.parse::<PanelCommand>() else {
        debug!(custom_id = %component.data.custom_id, "Ignoring foreign component");
        return;
    };

    let chat = command.chat;
    if component.guild_id.map(|g| g.get()) != Some(chat.get()) {
        warn!(%chat, "Panel button used outside its chat");
        respond_error(ctx, component, &AppError::UnsupportedChat(chat.to_string())).await;
        return;
    }

    data.controller.set_panel(
        chat,
        PanelRef {
            channel_id: component.channel_id.get(),
            message_id: component.message.id.get(),
        },
    );

    info!(%chat, action = command.action.tag(), user = %component.user.name, "Panel action");
    if let Err(e) = dispatch(&data.controller, command).await {
        respond_error(ctx, component, &e).await;
        return;
    }

    let view = current_view(&data.controller, chat);
    let response = serenity::CreateInteractionResponse::UpdateMessage(
        serenity::CreateInteractionResponseMessage::new()
            .content(view.text.clone())
            .components(components(&view)),
    );
    if let Err(e) = component.create_response(&ctx.http, response).await {
        warn!(%chat, error = %e, "Failed to update panel");
    }
}

async fn dispatch(controller: &QueueController, command: PanelCommand) -> AppResult<()> {
    let chat = command.chat;
    match command.action {
        PanelAction::Pause => controller.pause(chat).await.map(drop),
        PanelAction::Resume => controller.resume(chat).await.map(drop),
        PanelAction::Mute => controller.mute(chat).await.map(drop),
        PanelAction::Unmute => controller.unmute(chat).await.map(drop),
        PanelAction::ToggleLoop => controller.toggle_loop(chat).await.map(drop),
        PanelAction::Skip => controller.skip(chat).await.map(drop),
        PanelAction::Stop => match controller.stop(chat).await {
            // Already out of the call; the state is gone either way
            Err(AppError::NotInCall) => Ok(()),
            other => other.map(drop),
        },
    }
}

async fn respond_error(ctx: &Context, component: &serenity::ComponentInteraction, error: &AppError) {
    let response = serenity::CreateInteractionResponse::Message(
        serenity::CreateInteractionResponseMessage::new()
            .content(error.user_message())
            .ephemeral(true),
    );
    if let Err(e) = component.create_response(&ctx.http, response).await {
        warn!(error = %e, "Failed to send panel error");
    }
}

/// Edit a panel message in place.
pub async fn edit_panel(http: &serenity::Http, panel: PanelRef, view: &PanelView) -> AppResult<()> {
    serenity::ChannelId::new(panel.channel_id)
        .edit_message(
            http,
            serenity::MessageId::new(panel.message_id),
            serenity::EditMessage::new()
                .content(view.text.clone())
                .components(components(view)),
        )
        .await?;
    Ok(())
}

/// Keep panel messages in step with playback until the controller goes away.
pub async fn run_panel_refresher(
    http: Arc<serenity::Http>,
    controller: Arc<QueueController>,
    mut events: broadcast::Receiver<PlaybackEvent>,
) {
    info!("Panel refresher started");

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Panel refresher lagged by {} events", n);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let chat = event.chat();
        let (panel, view) = match event {
            PlaybackEvent::TrackStarted { .. } | PlaybackEvent::StateChanged { .. } => {
                match controller.panel(chat) {
                    Some(panel) => (panel, current_view(&controller, chat)),
                    None => continue,
                }
            }
            PlaybackEvent::Stopped { panel: Some(panel), .. } => (panel, panel::render_idle()),
            PlaybackEvent::Stopped { panel: None, .. } => continue,
        };

        if let Err(e) = edit_panel(&http, panel, &view).await {
            debug!(%chat, error = %e, "Failed to refresh panel");
        }
    }

    info!("Panel refresher stopped");
}

pub fn spawn_panel_refresher(
    http: Arc<serenity::Http>,
    controller: Arc<QueueController>,
) -> JoinHandle<()> {
    let events = controller.subscribe();
    tokio::spawn(run_panel_refresher(http, controller, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::QueueSnapshot;

    #[test]
    fn test_components_one_row() {
        let view = panel::render(&QueueSnapshot {
            chat: ChatId(7),
            titles: vec!["A".into(), "B".into()],
            looping: false,
            paused: false,
            muted: false,
        });
        assert_eq!(view.buttons.len(), 5);
        assert_eq!(components(&view).len(), 1);
    }

    #[test]
    fn test_idle_has_no_components() {
        assert!(components(&panel::render_idle()).is_empty());
    }
}
