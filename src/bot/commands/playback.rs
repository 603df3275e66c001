//! Voice chat playback commands.

use super::{
    author_voice_channel, chat_id, embed_reply, ensure_in_call, media_source, COLOR_INFO,
    COLOR_NOTICE, COLOR_STOPPED, COLOR_SUCCESS,
};
use crate::bot::handler::{components, current_view};
use crate::bot::{Context, Error};
use crate::error::AppError;
use crate::media::MediaSource;
use crate::player::panel::escape_markdown;
use crate::player::{ChatId, EnqueueOutcome, PanelRef, QueueSnapshot, SkipOutcome};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Join a voice channel
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn join(
    ctx: Context<'_>,
    #[description = "Voice channel to join (joins your current channel if not specified)"]
    #[channel_types("Voice", "Stage")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let chat = chat_id(ctx)?;

    let channel_id = match channel {
        Some(ch) => ch.id,
        None => author_voice_channel(ctx)
            .ok_or("You're not in a voice channel. Either join one or specify a channel.")?,
    };

    ctx.defer().await?;
    ctx.data().controller.join(chat, channel_id.get()).await?;

    ctx.send(embed_reply(
        "Joined",
        format!("Connected to <#{}>", channel_id),
        COLOR_SUCCESS,
    ))
    .await?;
    Ok(())
}

/// Leave the voice channel and drop the queue
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn leave(ctx: Context<'_>) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    ctx.data().controller.leave(chat).await?;

    ctx.send(embed_reply(
        "Left",
        "Left the voice channel.",
        COLOR_STOPPED,
    ))
    .await?;
    Ok(())
}

/// Play a link, a search query or an uploaded file now, replacing the queue
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn play(
    ctx: Context<'_>,
    #[description = "Audio or video file"] file: Option<serenity::Attachment>,
    #[description = "Link or search query"]
    #[rest]
    query: Option<String>,
) -> Result<(), Error> {
    let source = media_source(query, file).ok_or("Give me a link, a search query or a file.")?;
    play_media(ctx, source, false, true).await
}

/// Like play, but downloads the audio only
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn playaudio(
    ctx: Context<'_>,
    #[description = "Audio file"] file: Option<serenity::Attachment>,
    #[description = "Link or search query"]
    #[rest]
    query: Option<String>,
) -> Result<(), Error> {
    let source = media_source(query, file).ok_or("Give me a link, a search query or a file.")?;
    play_media(ctx, source, true, true).await
}

/// Add to the end of the queue, or show the queue when called without arguments
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn queue(
    ctx: Context<'_>,
    #[description = "Audio or video file to add"] file: Option<serenity::Attachment>,
    #[description = "Link or search query to add"]
    #[rest]
    query: Option<String>,
) -> Result<(), Error> {
    match media_source(query, file) {
        Some(source) => play_media(ctx, source, false, false).await,
        None => {
            let chat = chat_id(ctx)?;
            let snapshot = ctx.data().controller.snapshot(chat).ok_or(AppError::EmptyQueue)?;
            ctx.send(embed_reply("Queue", render_queue(&snapshot), COLOR_INFO))
                .await?;
            Ok(())
        }
    }
}

/// Enqueue every entry of a playlist
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn playlist(
    ctx: Context<'_>,
    #[description = "Playlist link"] url: String,
    #[description = "Download audio only"] audio_only: Option<bool>,
) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    let audio_only = audio_only.unwrap_or(false);
    ctx.defer().await?;
    ensure_in_call(ctx, chat).await?;

    let data = ctx.data();
    let ticket = data.controller.ticket(chat);
    let entries = data.resolver.resolve_playlist(&url, audio_only).await?;
    let tracks = entries
        .into_iter()
        .map(|media| media.into_track(audio_only))
        .collect();
    let outcome = data.controller.enqueue_playlist(ticket, tracks).await?;
    info!(%chat, added = outcome.added, dropped = outcome.dropped, "Playlist enqueued");

    let mut description = format!("Added **{}** tracks.", outcome.added);
    if outcome.dropped > 0 {
        description.push_str(&format!(
            "\n{} tracks did not fit in the queue.",
            outcome.dropped
        ));
    }
    match outcome.started {
        Some(title) => {
            description.insert_str(0, &format!("Now playing: {}\n", escape_markdown(&title)));
            reply_started(ctx, chat, "Playlist", description).await
        }
        None => {
            ctx.send(embed_reply("Playlist", description, COLOR_SUCCESS))
                .await?;
            Ok(())
        }
    }
}

/// Skip the current track
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn skip(ctx: Context<'_>) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    let reply = match ctx.data().controller.skip(chat).await? {
        SkipOutcome::Advanced { title } => embed_reply(
            "Skipped",
            format!("Now playing: {}", escape_markdown(&title)),
            COLOR_SUCCESS,
        ),
        SkipOutcome::Finished => embed_reply(
            "Skipped",
            "That was the last track. Left the voice channel.",
            COLOR_STOPPED,
        ),
    };
    ctx.send(reply).await?;
    Ok(())
}

/// Drop everything queued after the current track
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn clear(ctx: Context<'_>) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    let dropped = ctx.data().controller.clear_pending(chat).await?;
    ctx.send(embed_reply(
        "Queue cleared",
        format!("Removed {} queued tracks.", dropped),
        COLOR_SUCCESS,
    ))
    .await?;
    Ok(())
}

/// Shuffle the upcoming tracks
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn shuffle(ctx: Context<'_>) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    let reply = if ctx.data().controller.shuffle(chat).await? {
        embed_reply("Shuffled", "Upcoming tracks reordered.", COLOR_SUCCESS)
    } else {
        embed_reply("Shuffle", "Need at least two upcoming tracks.", COLOR_NOTICE)
    };
    ctx.send(reply).await?;
    Ok(())
}

/// Toggle looping of the current track
#[poise::command(prefix_command, slash_command, guild_only, rename = "loop")]
pub async fn toggle_loop(ctx: Context<'_>) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    let looping = ctx.data().controller.toggle_loop(chat).await?;
    let description = if looping {
        "The current track will repeat."
    } else {
        "Looping disabled."
    };
    ctx.send(embed_reply("Loop", description, COLOR_SUCCESS))
        .await?;
    Ok(())
}

/// Pause playback
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn pause(ctx: Context<'_>) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    let changed = ctx.data().controller.pause(chat).await?;
    send_control_reply(ctx, "Paused", "Already paused.", changed).await
}

/// Resume playback
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn resume(ctx: Context<'_>) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    let changed = ctx.data().controller.resume(chat).await?;
    send_control_reply(ctx, "Resumed", "Not paused.", changed).await
}

/// Mute the bot in the call
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn mute(ctx: Context<'_>) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    let changed = ctx.data().controller.mute(chat).await?;
    send_control_reply(ctx, "Muted", "Already muted.", changed).await
}

/// Unmute the bot in the call
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn unmute(ctx: Context<'_>) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    let changed = ctx.data().controller.unmute(chat).await?;
    send_control_reply(ctx, "Unmuted", "Not muted.", changed).await
}

/// Stop playback, clear the queue and leave the call
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn stop(ctx: Context<'_>) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    let had_queue = ctx.data().controller.stop(chat).await?;
    let description = if had_queue {
        "Playback stopped and the queue was cleared."
    } else {
        "Left the voice channel."
    };
    ctx.send(embed_reply("Stopped", description, COLOR_STOPPED))
        .await?;
    Ok(())
}

async fn send_control_reply(
    ctx: Context<'_>,
    done: &str,
    unchanged: &str,
    changed: bool,
) -> Result<(), Error> {
    let reply = if changed {
        embed_reply(done, format!("{}.", done), COLOR_SUCCESS)
    } else {
        embed_reply(done, unchanged, COLOR_NOTICE)
    };
    ctx.send(reply).await?;
    Ok(())
}

/// Resolve `source` and hand it to the queue.
async fn play_media(
    ctx: Context<'_>,
    source: MediaSource,
    audio_only: bool,
    replace_queue: bool,
) -> Result<(), Error> {
    let chat = chat_id(ctx)?;
    ctx.defer().await?;
    ensure_in_call(ctx, chat).await?;

    let data = ctx.data();
    let ticket = data.controller.ticket(chat);
    let media = data.resolver.resolve(&source, audio_only).await?;
    let track = media.into_track(audio_only);

    match data
        .controller
        .enqueue_with_ticket(ticket, track, replace_queue)
        .await?
    {
        EnqueueOutcome::Started { title } => {
            let description = format!("Now playing: {}", escape_markdown(&title));
            reply_started(ctx, chat, "Playing", description).await
        }
        EnqueueOutcome::Queued { title, position } => {
            ctx.send(embed_reply(
                "Queued",
                format!("{} at position {}", escape_markdown(&title), position),
                COLOR_SUCCESS,
            ))
            .await?;
            Ok(())
        }
    }
}

/// Announce a started track. With auto-panel on and no panel yet, the reply
/// becomes the chat's control panel.
async fn reply_started(
    ctx: Context<'_>,
    chat: ChatId,
    title: &str,
    description: String,
) -> Result<(), Error> {
    let data = ctx.data();
    if !data.config.player.auto_panel || data.controller.panel(chat).is_some() {
        ctx.send(embed_reply(title, description, COLOR_SUCCESS))
            .await?;
        return Ok(());
    }

    let view = current_view(&data.controller, chat);
    let handle = ctx
        .send(
            poise::CreateReply::default()
                .content(view.text.clone())
                .components(components(&view)),
        )
        .await?;
    let message = handle.message().await?;
    data.controller.set_panel(
        chat,
        PanelRef {
            channel_id: message.channel_id.get(),
            message_id: message.id.get(),
        },
    );
    Ok(())
}

/// Numbered queue listing with the playback flags.
pub(crate) fn render_queue(snapshot: &QueueSnapshot) -> String {
    let mut lines: Vec<String> = snapshot
        .titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            if i == 0 {
                format!("**Now:** {}", escape_markdown(title))
            } else {
                format!("`{}.` {}", i, escape_markdown(title))
            }
        })
        .collect();

    let mut flags = Vec::new();
    if snapshot.paused {
        flags.push("paused");
    }
    if snapshot.muted {
        flags.push("muted");
    }
    if snapshot.looping {
        flags.push("looping");
    }
    if !flags.is_empty() {
        lines.push(format!("_{}_", flags.join(", ")));
    }
    lines.join("\n")
}
