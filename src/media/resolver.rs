//! Media resolution: turn a link, a search query or an attachment into a local file.

use crate::config::ResolverConfig;
use crate::error::{AppError, AppResult, ResolveError};
use crate::player::Track;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extensions accepted for uploaded attachments.
const MEDIA_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "aac", "ogg", "opus", "oga", "wav", "flac", "mp4", "m4v", "mov", "webm", "mkv",
];

/// Printed by yt-dlp once per finished file; `j` makes the fields JSON strings.
const PRINT_TEMPLATE: &str = r#"after_move:{"title":%(title)j,"path":%(filepath)j}"#;

/// Where the media comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// A link, or free text that is searched for
    Locator(String),
    /// A file uploaded to the chat
    Attachment { url: String, filename: String },
}

/// A file on local disk with its display title.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolvedMedia {
    pub path: PathBuf,
    pub title: String,
}

impl ResolvedMedia {
    /// Hand the file over to the queue, which deletes it when done.
    pub fn into_track(self, audio_only: bool) -> Track {
        Track::new(self.path, self.title, audio_only).owned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
}

/// Resolves media for playback. Implementations download into a directory they own.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, source: &MediaSource, audio_only: bool) -> AppResult<ResolvedMedia>;

    /// Every entry of a playlist, in playlist order.
    async fn resolve_playlist(&self, url: &str, audio_only: bool) -> AppResult<Vec<ResolvedMedia>>;

    async fn search(&self, query: &str) -> AppResult<Vec<SearchResult>>;
}

/// Resolver built on the yt-dlp command line tool.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    config: ResolverConfig,
    http: reqwest::Client,
}

impl YtDlpResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Create the download directory.
    pub async fn prepare(&self) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.config.download_dir).await?;
        Ok(())
    }

    fn format_args(&self, audio_only: bool) -> Vec<String> {
        if audio_only {
            vec![
                "-f".into(),
                "bestaudio/best".into(),
                "-x".into(),
                "--audio-format".into(),
                "mp3".into(),
                "--audio-quality".into(),
                "0".into(),
            ]
        } else {
            let h = self.config.max_video_height;
            vec![
                "-f".into(),
                format!(
                    "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/best[height<={h}][ext=mp4]/best[height<={h}]/best"
                ),
                "--merge-output-format".into(),
                "mp4".into(),
            ]
        }
    }

    fn download_args(&self, locator: &str, audio_only: bool, playlist: bool) -> Vec<String> {
        let batch = Uuid::new_v4();
        let template = self
            .config
            .download_dir
            .join(format!("{}-%(autonumber)s.%(ext)s", batch));

        let mut args: Vec<String> = vec![
            "--quiet".into(),
            "--no-warnings".into(),
            "--no-progress".into(),
            "--no-simulate".into(),
            "--geo-bypass".into(),
            "--print".into(),
            PRINT_TEMPLATE.into(),
            "-o".into(),
            template.to_string_lossy().into_owned(),
        ];
        args.extend(self.format_args(audio_only));
        if playlist {
            args.push("--yes-playlist".into());
            args.push("--playlist-items".into());
            args.push(format!("1:{}", self.config.max_playlist_items.max(1)));
        } else {
            args.push("--no-playlist".into());
        }
        self.push_cookies(&mut args);
        args.push(search_or_link(locator));
        args
    }

    fn push_cookies(&self, args: &mut Vec<String>) {
        if let Some(cookies) = &self.config.cookies_file {
            if cookies.exists() {
                args.push("--cookies".into());
                args.push(cookies.to_string_lossy().into_owned());
            } else {
                warn!(path = %cookies.display(), "Configured cookies file does not exist");
            }
        }
    }

    async fn run(&self, operation: &'static str, args: &[String]) -> AppResult<String> {
        debug!(bin = %self.config.ytdlp_bin, ?args, "Running yt-dlp");

        let child = Command::new(&self.config.ytdlp_bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ResolveError::ToolFailed(format!("cannot run {}: {}", self.config.ytdlp_bin, e)))?;

        let output = tokio::time::timeout(self.config.timeout(), child.wait_with_output())
            .await
            .map_err(|_| AppError::Timeout { operation })??;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = ?output.status.code(), stderr = %stderr.trim(), "yt-dlp failed");
            return Err(classify_failure(&stderr).into());
        }
        Ok(stdout)
    }

    async fn download(&self, locator: &str, audio_only: bool, playlist: bool) -> AppResult<Vec<ResolvedMedia>> {
        self.prepare().await?;
        let args = self.download_args(locator, audio_only, playlist);
        let stdout = self.run("download", &args).await?;
        let media = parse_printed(&stdout);
        if media.is_empty() {
            return Err(ResolveError::NotFound(locator.to_string()).into());
        }
        for item in &media {
            if !item.path.exists() {
                return Err(ResolveError::ToolFailed(format!(
                    "downloaded file missing: {}",
                    item.path.display()
                ))
                .into());
            }
        }
        info!(locator, files = media.len(), "Downloaded media");
        Ok(media)
    }

    async fn fetch_attachment(&self, url: &str, filename: &str) -> AppResult<ResolvedMedia> {
        if !is_media_filename(filename) {
            return Err(ResolveError::UnsupportedFormat(filename.to_string()).into());
        }
        self.prepare().await?;

        let response = self
            .http
            .get(url)
            .timeout(self.config.timeout())
            .send()
            .await
            .map_err(|e| ResolveError::NetworkFailure(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ResolveError::NotFound(filename.to_string()).into());
        }
        let bytes = response
            .error_for_status()
            .map_err(|e| ResolveError::NetworkFailure(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| ResolveError::NetworkFailure(e.to_string()))?;

        let path = self
            .config
            .download_dir
            .join(format!("{}-{}", Uuid::new_v4(), sanitize_filename(filename)));
        tokio::fs::write(&path, &bytes).await?;
        info!(filename, bytes = bytes.len(), "Saved attachment");

        Ok(ResolvedMedia {
            path,
            title: title_from_filename(filename),
        })
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, source: &MediaSource, audio_only: bool) -> AppResult<ResolvedMedia> {
        match source {
            MediaSource::Locator(locator) => {
                let mut media = self.download(locator, audio_only, false).await?;
                Ok(media.swap_remove(0))
            }
            MediaSource::Attachment { url, filename } => self.fetch_attachment(url, filename).await,
        }
    }

    async fn resolve_playlist(&self, url: &str, audio_only: bool) -> AppResult<Vec<ResolvedMedia>> {
        self.download(url, audio_only, true).await
    }

    async fn search(&self, query: &str) -> AppResult<Vec<SearchResult>> {
        let mut args: Vec<String> = vec![
            "--quiet".into(),
            "--no-warnings".into(),
            "--flat-playlist".into(),
            "--dump-json".into(),
        ];
        self.push_cookies(&mut args);
        args.push(format!("ytsearch{}:{}", self.config.search_results.max(1), query));

        let stdout = self.run("search", &args).await?;
        Ok(parse_search(&stdout))
    }
}

/// Links are downloaded as-is; anything else is searched for.
fn search_or_link(locator: &str) -> String {
    let locator = locator.trim();
    if locator.starts_with("http://") || locator.starts_with("https://") {
        locator.to_string()
    } else {
        format!("ytsearch1:{}", locator)
    }
}

fn parse_printed(stdout: &str) -> Vec<ResolvedMedia> {
    stdout
        .lines()
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| match serde_json::from_str::<ResolvedMedia>(line) {
            Ok(media) => Some(media),
            Err(e) => {
                warn!(line, error = %e, "Unparseable yt-dlp output line");
                None
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct FlatEntry {
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
}

fn parse_search(stdout: &str) -> Vec<SearchResult> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<FlatEntry>(line).ok())
        .filter_map(|entry| {
            let url = entry.webpage_url.or(entry.url)?;
            Some(SearchResult {
                title: entry.title.unwrap_or_else(|| url.clone()),
                url,
                duration: entry
                    .duration
                    .filter(|d| d.is_finite() && *d >= 0.0)
                    .map(Duration::from_secs_f64),
            })
        })
        .collect()
}

/// Map yt-dlp's error output onto a failure kind.
pub fn classify_failure(stderr: &str) -> ResolveError {
    let message = stderr
        .lines()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|line| !line.trim().is_empty()))
        .unwrap_or("yt-dlp exited with an error")
        .trim_start_matches("ERROR:")
        .trim()
        .to_string();

    let lower = message.to_lowercase();
    if lower.contains("unsupported url") || lower.contains("no video formats") || lower.contains("requested format is not available") {
        ResolveError::UnsupportedFormat(message)
    } else if lower.contains("video unavailable")
        || lower.contains("404")
        || lower.contains("not found")
        || lower.contains("private video")
        || lower.contains("has been removed")
    {
        ResolveError::NotFound(message)
    } else if lower.contains("unable to download")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("network")
        || lower.contains("getaddrinfo")
    {
        ResolveError::NetworkFailure(message)
    } else {
        ResolveError::ToolFailed(message)
    }
}

pub fn is_media_filename(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn title_from_filename(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(filename)
        .to_string()
}

/// `3:07`, or `1:02:03` for long media.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
