pub mod commands;
pub mod handler;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::media::{AuddRecognizer, MediaResolver, SongRecognizer, YtDlpResolver};
use crate::player::{spawn_event_loop, QueueController, SongbirdTransport};
use poise::serenity_prelude::{self as serenity, FullEvent, GatewayIntents};
use songbird::{SerenityInit, Songbird};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Shared data accessible in all commands
pub struct Data {
    pub controller: Arc<QueueController>,
    pub resolver: Arc<dyn MediaResolver>,
    pub recognizer: Arc<dyn SongRecognizer>,
    /// Used to fetch attachments for recognition
    pub http_client: reqwest::Client,
    pub config: &'static AppConfig,
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Text shown to the user for a failed command.
pub fn error_reply(error: &Error) -> String {
    match error.downcast_ref::<AppError>() {
        Some(app) => app.user_message(),
        None => format!("**[VoiceMod]** Error: `{}`", error),
    }
}

/// Event handler for Discord events
async fn event_handler(
    ctx: &serenity::Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        FullEvent::Ready { data_about_bot } => {
            info!("Bot is ready! Logged in as {}", data_about_bot.user.name);
        }
        FullEvent::InteractionCreate { interaction } => {
            if let serenity::Interaction::Component(component) = interaction {
                handler::handle_component(ctx, component, data).await;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Create and configure the Discord bot framework
pub fn create_framework(
    config: &'static AppConfig,
    controller: Arc<QueueController>,
    resolver: Arc<dyn MediaResolver>,
    recognizer: Arc<dyn SongRecognizer>,
) -> poise::Framework<Data, Error> {
    poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all_commands(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            match error.downcast_ref::<AppError>() {
                                Some(app) if app.is_user_error() => {
                                    info!(command = %ctx.command().name, "Command rejected: {}", app)
                                }
                                _ => error!(command = %ctx.command().name, "Command error: {}", error),
                            }
                            let _ = ctx.say(error_reply(&error)).await;
                        }
                        poise::FrameworkError::Setup { error, .. } => {
                            error!("Setup error: {}", error);
                        }
                        err => {
                            if let Err(e) = poise::builtins::on_error(err).await {
                                error!("Error while handling error: {}", e);
                            }
                        }
                    }
                })
            },
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(config.discord.prefix.clone()),
                ..Default::default()
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                info!(
                    "Registered {} slash commands globally",
                    framework.options().commands.len()
                );
                Ok(Data {
                    controller,
                    resolver,
                    recognizer,
                    http_client: reqwest::Client::new(),
                    config,
                })
            })
        })
        .build()
}

/// Wire the voice transport, queue controller and media collaborators, then
/// run the Discord client until it shuts down.
pub async fn start_bot(config: &'static AppConfig) -> Result<(), Error> {
    let token = config.discord.token.trim();
    if token.is_empty() {
        return Err("Discord token is empty".into());
    }

    let songbird = Songbird::serenity();
    let (transport, transport_events) = SongbirdTransport::new(songbird.clone());
    let controller = Arc::new(QueueController::new(Arc::new(transport), &config.player));
    let event_loop = spawn_event_loop(controller.clone(), transport_events);

    let resolver = YtDlpResolver::new(config.resolver.clone());
    resolver.prepare().await?;
    info!(dir = %config.resolver.download_dir.display(), "Download directory ready");

    let recognizer = AuddRecognizer::new(config.recognition.clone());
    if config.recognition.api_token.is_none() {
        info!("No recognition API token configured, using the anonymous quota");
    }

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let framework = create_framework(
        config,
        controller.clone(),
        Arc::new(resolver),
        Arc::new(recognizer),
    );

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .register_songbird_with(songbird)
        .await?;

    let refresher = handler::spawn_panel_refresher(client.http.clone(), controller);

    info!("Starting Discord bot...");
    let result = client.start().await;

    refresher.abort();
    event_loop.abort();
    result?;
    Ok(())
}
