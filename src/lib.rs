pub mod birthdays;
pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod discord_text;
pub mod llm;
pub mod member_count;
pub mod music;
pub mod services;
pub mod voice;

use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub http_client: reqwest::Client,
    pub llm_client: llm::LlmClient,
    pub db: db::Database,
    /// Per-guild queues and the stream resolution chain
    pub music: Arc<music::MusicManager>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
