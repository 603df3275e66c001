use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Discord bot configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    /// Bot token. Keep it out of the config files; set VOICEMOD__DISCORD__TOKEN.
    #[serde(default)]
    pub token: String,
    /// Prefix for text commands
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "!vm ".to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            prefix: default_prefix(),
        }
    }
}

/// Queue controller settings
#[derive(Debug, Deserialize, Clone)]
pub struct PlayerConfig {
    /// Upper bound for any single call transport operation
    #[serde(default = "default_transport_timeout")]
    pub transport_timeout_secs: u64,
    /// Send the control panel when playback starts and keep it refreshed
    #[serde(default = "default_true")]
    pub auto_panel: bool,
    /// Maximum number of tracks per chat, including the current one
    #[serde(default = "default_max_queue_len")]
    pub max_queue_len: usize,
}

fn default_transport_timeout() -> u64 {
    20
}

fn default_true() -> bool {
    true
}

fn default_max_queue_len() -> usize {
    100
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            transport_timeout_secs: default_transport_timeout(),
            auto_panel: true,
            max_queue_len: default_max_queue_len(),
        }
    }
}

impl PlayerConfig {
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_timeout_secs)
    }
}

/// Media download settings (yt-dlp)
#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    #[serde(default = "default_ytdlp_bin")]
    pub ytdlp_bin: String,
    /// Where downloaded media lives until its track leaves the queue
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Netscape-format cookies passed to yt-dlp (age-gated or region-locked videos)
    #[serde(default)]
    pub cookies_file: Option<PathBuf>,
    #[serde(default = "default_resolver_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_playlist_items")]
    pub max_playlist_items: usize,
    #[serde(default = "default_max_video_height")]
    pub max_video_height: u32,
    #[serde(default = "default_search_results")]
    pub search_results: usize,
}

fn default_ytdlp_bin() -> String {
    "yt-dlp".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_resolver_timeout() -> u64 {
    300
}

fn default_max_playlist_items() -> usize {
    25
}

fn default_max_video_height() -> u32 {
    720
}

fn default_search_results() -> usize {
    5
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ytdlp_bin: default_ytdlp_bin(),
            download_dir: default_download_dir(),
            cookies_file: None,
            timeout_secs: default_resolver_timeout(),
            max_playlist_items: default_max_playlist_items(),
            max_video_height: default_max_video_height(),
            search_results: default_search_results(),
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Song recognition service (AudD-compatible API)
#[derive(Debug, Deserialize, Clone)]
pub struct RecognitionConfig {
    #[serde(default = "default_recognition_url")]
    pub url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_recognition_timeout")]
    pub timeout_secs: u64,
}

fn default_recognition_url() -> String {
    "https://api.audd.io/".to_string()
}

fn default_recognition_timeout() -> u64 {
    30
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            url: default_recognition_url(),
            api_token: None,
            timeout_secs: default_recognition_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format
    #[serde(default)]
    pub json: bool,
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Self::environment())
            .build()?;

        config.try_deserialize()
    }

    /// e.g., VOICEMOD__DISCORD__TOKEN, VOICEMOD__PLAYER__AUTO_PANEL
    fn environment() -> Environment {
        Environment::with_prefix("VOICEMOD")
            .separator("__")
            .try_parsing(true)
    }

    /// Initialize the global config singleton
    pub fn init() -> Result<&'static Self, ConfigError> {
        let config = Self::load()?;
        Ok(CONFIG.get_or_init(|| config))
    }
}
