use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voicemod::{bot, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets usually live in .env during development
    let _ = dotenvy::dotenv();

    // Load configuration before logging so the output format can be chosen
    let config = AppConfig::init()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "voicemod=debug,songbird=info,serenity=warn".into());
    if config.logging.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting VoiceMod v{}", env!("CARGO_PKG_VERSION"));

    if config.discord.token.trim().is_empty() {
        error!("Discord token not configured!");
        error!("Set discord.token in config/local.toml or the VOICEMOD__DISCORD__TOKEN env var");
        return Err(anyhow::anyhow!("Discord token not configured"));
    }

    match bot::start_bot(config).await {
        Ok(()) => info!("Discord bot shut down gracefully"),
        Err(e) => {
            error!("Discord bot error: {}", e);
            return Err(anyhow::anyhow!("{}", e));
        }
    }

    Ok(())
}
