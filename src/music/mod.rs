//! Audio playback: turning user references into playable streams and keeping a
//! per-guild queue of them.

pub mod mirrors;
pub mod player;
pub mod reference;
pub mod resolver;
pub mod scrape;
pub mod state;
pub mod ytdlp;

pub use player::{Enqueued, MusicManager, PauseOutcome};
