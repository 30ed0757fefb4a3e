//! # Open Groove
//!
//! Per-session audio playback orchestration core for chat music bots.
//!
//! This crate owns the part of a music bot that is worth getting right:
//! one ordered play queue per chat session, a playback state machine that
//! drives a single live audio stream, and a speculative cache that resolves
//! upcoming stream URLs ahead of need so playback continues without an
//! audible gap.
//!
//! ## Architecture
//!
//! The core is built around three components:
//!
//! ### [`audio::queue`] - Queue Engine
//! - Per-session ordered track list with a current-position cursor
//! - Bounded capacity with rejected (never truncated) overflow
//! - Thread-safe registry, created lazily per session
//!
//! ### [`audio::player`] - Playback Controller
//! - Idle / Connecting / Playing / Paused state machine per session
//! - Automatic track chaining on natural stream end
//! - Idle-timeout disconnect with cancellable grace period
//!
//! ### [`cache`] - Prebuffer Cache
//! - Deduplicated, rate-limited background URL resolution
//! - Safe fallback to synchronous resolution on miss or failure
//! - Bounded size with oldest-first eviction
//!
//! Everything else is a boundary: music catalogs are consumed through the
//! [`sources::MusicProvider`] trait and the voice transport through the
//! [`audio::sink::AudioSink`] trait. The chat gateway, command parsing and
//! reply rendering live in the embedding application, not here.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use open_groove::{audio::player::AudioPlayer, config::Config, sources::SourceManager};
//!
//! # async fn example(sink: Arc<dyn open_groove::audio::sink::AudioSink>) -> open_groove::error::Result<()> {
//! let config = Config::default();
//! let sources = Arc::new(SourceManager::new(&config));
//! let player = Arc::new(AudioPlayer::new(&config, sources, sink));
//! # Ok(())
//! # }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod sources;

pub use audio::guard::{RequestGuard, RequestPermit};
pub use audio::player::{AudioPlayer, PlayerState};
pub use audio::queue::{QueueEngine, QueueSnapshot};
pub use audio::sink::{AudioSink, ConnectionParams, SinkHandle, StreamEnd};
pub use cache::{prebuffer::PrebufferCache, CacheStats};
pub use config::Config;
pub use error::{MusicError, Result};
pub use sources::{MusicProvider, SourceManager, SourceType, Track};

/// Identificador de una sesión de reproducción (un guild/servidor de chat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identificador del canal de voz destino de una conexión de audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identificador del usuario que solicitó un track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequesterId(pub u64);

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
