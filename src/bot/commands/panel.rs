use super::chat_id;
use crate::bot::handler::components;
use crate::bot::{Context, Error};
use crate::error::AppError;
use crate::player::panel::render;
use crate::player::PanelRef;
use tracing::debug;

/// Show the playback control panel
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn panel(ctx: Context<'_>) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    let controller = &ctx.data().controller;
    let snapshot = controller.snapshot(chat).ok_or(AppError::EmptyQueue)?;
    let view = render(&snapshot);

    let handle = ctx
        .send(
            poise::CreateReply::default()
                .content(view.text.clone())
                .components(components(&view)),
        )
        .await?;
    let message = handle.message().await?;

    // Later refreshes go to the newest panel
    let panel = PanelRef {
        channel_id: message.channel_id.get(),
        message_id: message.id.get(),
    };
    if !controller.set_panel(chat, panel) {
        debug!(%chat, "Playback ended before the panel was recorded");
    }
    Ok(())
}
