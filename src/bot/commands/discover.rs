//! Finding music: search and song recognition.

use super::{embed_reply, COLOR_INFO, COLOR_NOTICE, COLOR_SUCCESS};
use crate::bot::{Context, Error};
use crate::error::AppError;
use crate::media::{format_duration, SearchResult};
use crate::player::panel::escape_markdown;
use poise::serenity_prelude as serenity;
use tracing::info;

/// Largest clip sent for recognition.
const MAX_CLIP_BYTES: u32 = 20 * 1024 * 1024;

/// Search for music to play
#[poise::command(prefix_command, slash_command)]
pub async fn search(
    ctx: Context<'_>,
    #[description = "What to search for"]
    #[rest]
    query: String,
) -> Result<(), Error> {
    let query = query.trim();
    if query.is_empty() {
        return Err("Tell me what to search for.".into());
    }

    ctx.defer().await?;
    let results = ctx.data().resolver.search(query).await?;
    info!(query, results = results.len(), "Search finished");

    if results.is_empty() {
        ctx.send(embed_reply(
            "Search",
            format!("Nothing found for `{}`.", query.replace('`', "'")),
            COLOR_NOTICE,
        ))
        .await?;
        return Ok(());
    }

    let embed = serenity::CreateEmbed::default()
        .title("Search results")
        .description(render_results(&results))
        .footer(serenity::CreateEmbedFooter::new("Use play <link> to play one"))
        .color(COLOR_INFO);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Recognize the song in an audio or video clip
#[poise::command(prefix_command, slash_command)]
pub async fn recognize(
    ctx: Context<'_>,
    #[description = "Audio or video clip"] file: serenity::Attachment,
) -> Result<(), Error> {
    if file.size > MAX_CLIP_BYTES {
        return Err(format!("Clip is too large (max {} MB).", MAX_CLIP_BYTES / 1024 / 1024).into());
    }

    ctx.defer().await?;
    let data = ctx.data();
    let audio = data
        .http_client
        .get(&file.url)
        .send()
        .await
        .map_err(AppError::from)?
        .error_for_status()
        .map_err(AppError::from)?
        .bytes()
        .await
        .map_err(AppError::from)?;

    let reply = match data.recognizer.recognize(audio.to_vec(), &file.filename).await? {
        Some(song) => {
            let mut embed = serenity::CreateEmbed::default()
                .title("Recognized")
                .field("Artist", escape_markdown(&song.artist), true)
                .field("Title", escape_markdown(&song.title), true)
                .color(COLOR_SUCCESS);
            if let Some(album) = &song.album {
                embed = embed.field("Album", escape_markdown(album), false);
            }
            if let Some(link) = &song.link {
                embed = embed.url(link);
            }
            poise::CreateReply::default().embed(embed)
        }
        None => embed_reply("Recognize", "Couldn't recognize this song.", COLOR_NOTICE),
    };
    ctx.send(reply).await?;
    Ok(())
}

fn render_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let duration = result
                .duration
                .map(|d| format!(" ({})", format_duration(d)))
                .unwrap_or_default();
            format!(
                "`{}.` [{}]({}){}",
                i + 1,
                escape_markdown(&result.title),
                result.url,
                duration
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
