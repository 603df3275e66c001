//! External media collaborators: downloading and song recognition.

pub mod recognition;
pub mod resolver;

pub use recognition::{AuddRecognizer, Recognition, SongRecognizer};
pub use resolver::{
    format_duration, MediaResolver, MediaSource, ResolvedMedia, SearchResult, YtDlpResolver,
};
