pub mod discover;
pub mod panel;
pub mod playback;

pub use discover::{recognize, search};
pub use panel::panel;
pub use playback::{
    clear, join, leave, mute, pause, play, playaudio, playlist, queue, resume, shuffle, skip,
    stop, toggle_loop, unmute,
};

use crate::bot::{Context, Data, Error};
use crate::error::AppError;
use crate::media::MediaSource;
use crate::player::ChatId;
use poise::serenity_prelude as serenity;

pub(crate) const COLOR_SUCCESS: u32 = 0x57F287;
pub(crate) const COLOR_STOPPED: u32 = 0xED4245;
pub(crate) const COLOR_NOTICE: u32 = 0xFEE75C;
pub(crate) const COLOR_INFO: u32 = 0x5865F2;

/// Get all registered commands
pub fn all_commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        join(),
        leave(),
        play(),
        playaudio(),
        queue(),
        skip(),
        clear(),
        shuffle(),
        toggle_loop(),
        playlist(),
        panel(),
        pause(),
        resume(),
        mute(),
        unmute(),
        stop(),
        search(),
        recognize(),
    ]
}

/// The chat a command targets: the server it was used in.
pub(crate) fn chat_id(ctx: Context<'_>) -> Result<ChatId, AppError> {
    ctx.guild_id()
        .map(|id| ChatId(id.get()))
        .ok_or_else(|| AppError::UnsupportedChat("direct messages have no voice calls".into()))
}

/// Voice channel the command author is currently in.
pub(crate) fn author_voice_channel(ctx: Context<'_>) -> Option<serenity::ChannelId> {
    let guild = ctx.guild()?;
    let channel = guild
        .voice_states
        .get(&ctx.author().id)
        .and_then(|state| state.channel_id);
    channel
}

/// Join the author's voice channel unless the bot is already in a call here.
pub(crate) async fn ensure_in_call(ctx: Context<'_>, chat: ChatId) -> Result<(), Error> {
    if ctx.data().controller.in_call(chat) {
        return Ok(());
    }
    let channel = author_voice_channel(ctx)
        .ok_or("You're not in a voice channel. Join one first.")?;
    ctx.data().controller.join(chat, channel.get()).await?;
    Ok(())
}

/// Build a media source from a command's free text and attachment arguments.
pub(crate) fn media_source(
    query: Option<String>,
    attachment: Option<serenity::Attachment>,
) -> Option<MediaSource> {
    if let Some(file) = attachment {
        return Some(MediaSource::Attachment {
            url: file.url,
            filename: file.filename,
        });
    }
    query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .map(MediaSource::Locator)
}

pub(crate) fn embed_reply(title: &str, description: impl Into<String>, color: u32) -> poise::CreateReply {
    let embed = serenity::CreateEmbed::default()
        .title(title)
        .description(description)
        .color(color);
    poise::CreateReply::default().embed(embed)
}
