use crate::music::mirrors::{MirrorKind, MirrorProvider};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub command_prefix: String,
    pub status_message: String,
    pub dev_guild_id: Option<u64>,
    pub register_commands: bool,
    pub database_url: String,

    // Persona model
    pub gemini_url: String,
    pub gemini_model: String,
    pub gemini_api_key: Option<String>,
    pub persona_prompt: String,
    pub llm_timeout: Duration,

    // Audio resolution
    pub ytdlp_path: String,
    pub youtube_cookies: Option<String>,
    pub youtube_download_dir: String,
    pub youtube_cleanup_after: Duration,
    pub stream_cache_ttl: Duration,
    pub stream_cache_capacity: usize,
    pub mirror_timeout: Duration,
    pub mirror_providers: Vec<MirrorProvider>,
    pub search_result_limit: u8,
    pub selection_timeout: Duration,

    // Scheduled cogs
    pub birthday_utc_offset_hours: i32,
    pub member_count_interval: Duration,
}

const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

const DEFAULT_PERSONA_PROMPT: &str = "You are Magna Shanoa. Stay in character at all times. \
You are the fattest man in Eorzea and you are addicted to Final Fantasy XIV Online. \
You don't mind being called fat. You have chubby cheeks and a kawaii face.";

const MIRRORS_FILE: &str = "mirrors.toml";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .or_else(|_| env::var("TOKEN"))
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            command_prefix: env::var("COMMAND_PREFIX").unwrap_or_else(|_| "%".to_string()),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Final Fantasy XIV Online".to_string()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            register_commands: env::var("REGISTER_COMMANDS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "data/magna.db".to_string()),

            gemini_url: env::var("GEMINI_URL").unwrap_or_else(|_| DEFAULT_GEMINI_URL.to_string()),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            gemini_api_key: env::var("GEMINI_API_KEY").ok(),
            persona_prompt: env::var("PERSONA_PROMPT")
                .unwrap_or_else(|_| DEFAULT_PERSONA_PROMPT.to_string()),
            llm_timeout: env_duration("LLM_TIMEOUT", Duration::from_secs(120)),

            ytdlp_path: env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            youtube_cookies: env::var("YOUTUBE_COOKIES").ok(),
            youtube_download_dir: env::var("YOUTUBE_DOWNLOAD_DIR")
                .unwrap_or_else(|_| "/tmp/magna_audio".to_string()),
            youtube_cleanup_after: env_duration("YOUTUBE_CLEANUP_AFTER", Duration::from_secs(3600)),
            stream_cache_ttl: env_duration("STREAM_CACHE_TTL", Duration::from_secs(3600)),
            stream_cache_capacity: env::var("STREAM_CACHE_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .unwrap_or(256),
            mirror_timeout: env_duration("MIRROR_TIMEOUT", Duration::from_secs(10)),
            mirror_providers: Self::load_mirror_providers(Path::new(MIRRORS_FILE)),
            search_result_limit: env::var("SEARCH_RESULT_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            selection_timeout: env_duration("SELECTION_TIMEOUT", Duration::from_secs(30)),

            birthday_utc_offset_hours: env::var("BIRTHDAY_UTC_OFFSET_HOURS")
                .unwrap_or_else(|_| "-3".to_string())
                .parse()
                .unwrap_or(-3),
            member_count_interval: env_duration("MEMBER_COUNT_INTERVAL", Duration::from_secs(1800)),
        })
    }

    /// Mirror instances come from `mirrors.toml`, then `MIRROR_PROVIDERS` (JSON),
    /// then the built-in list.
    pub fn load_mirror_providers(path: &Path) -> Vec<MirrorProvider> {
        if let Ok(content) = fs::read_to_string(path) {
            #[derive(Deserialize)]
            struct MirrorsWrapper {
                providers: Vec<MirrorProvider>,
            }
            match toml::from_str::<MirrorsWrapper>(&content) {
                Ok(wrapper) if !wrapper.providers.is_empty() => return wrapper.providers,
                Ok(_) => {}
                Err(e) => tracing::warn!("Ignoring malformed {}: {}", path.display(), e),
            }
        }

        if let Ok(env_providers) = env::var("MIRROR_PROVIDERS") {
            if let Ok(providers) = serde_json::from_str::<Vec<MirrorProvider>>(&env_providers) {
                if !providers.is_empty() {
                    return providers;
                }
            }
        }

        default_mirror_providers()
    }
}

fn default_mirror_providers() -> Vec<MirrorProvider> {
    [
        (MirrorKind::Piped, "https://pipedapi.kavin.rocks"),
        (MirrorKind::Piped, "https://pipedapi.adminforge.de"),
        (MirrorKind::Piped, "https://api.piped.private.coffee"),
        (MirrorKind::Invidious, "https://inv.nadeko.net"),
        (MirrorKind::Invidious, "https://invidious.nerdvpn.de"),
        (MirrorKind::Invidious, "https://yewtu.be"),
    ]
    .into_iter()
    .map(|(kind, base_url)| MirrorProvider {
        kind,
        base_url: base_url.to_string(),
    })
    .collect()
}

/// Reads a humantime duration (`90s`, `1h 30m`), keeping the default when unset or malformed.
/// A zero duration counts as malformed: intervals and timeouts need a period.
fn env_duration(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|raw| humantime::parse_duration(raw.trim()).ok())
        .filter(|duration| !duration.is_zero())
        .unwrap_or(default)
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("command_prefix", &self.command_prefix)
            .field("status_message", &self.status_message)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("register_commands", &self.register_commands)
            .field("database_url", &self.database_url)
            .field("gemini_url", &self.gemini_url)
            .field("gemini_model", &self.gemini_model)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("persona_prompt", &self.persona_prompt)
            .field("llm_timeout", &self.llm_timeout)
            .field("ytdlp_path", &self.ytdlp_path)
            .field(
                "youtube_cookies",
                &self.youtube_cookies.as_ref().map(|_| "[REDACTED]"),
            )
            .field("youtube_download_dir", &self.youtube_download_dir)
            .field("youtube_cleanup_after", &self.youtube_cleanup_after)
            .field("stream_cache_ttl", &self.stream_cache_ttl)
            .field("stream_cache_capacity", &self.stream_cache_capacity)
            .field("mirror_timeout", &self.mirror_timeout)
            .field("mirror_providers", &self.mirror_providers)
            .field("search_result_limit", &self.search_result_limit)
            .field("selection_timeout", &self.selection_timeout)
            .field("birthday_utc_offset_hours", &self.birthday_utc_offset_hours)
            .field("member_count_interval", &self.member_count_interval)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_config_logic() {
        // 1. Missing token
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("TOKEN");
        assert!(Config::build().is_err(), "Should fail without a token");

        // 2. Legacy TOKEN name and defaults
        env::set_var("TOKEN", "legacy_token");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "legacy_token");
        assert_eq!(config.command_prefix, "%");
        assert_eq!(config.stream_cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.search_result_limit, 10);
        assert_eq!(config.birthday_utc_offset_hours, -3);

        // 3. Humantime durations, malformed values keep defaults
        env::set_var("STREAM_CACHE_TTL", "45m");
        env::set_var("SELECTION_TIMEOUT", "not a duration");
        let config = Config::build().unwrap();
        assert_eq!(config.stream_cache_ttl, Duration::from_secs(45 * 60));
        assert_eq!(config.selection_timeout, Duration::from_secs(30));

        // Zero periods fall back too
        env::set_var("MEMBER_COUNT_INTERVAL", "0s");
        env::set_var("YOUTUBE_CLEANUP_AFTER", "0m");
        let config = Config::build().unwrap();
        assert_eq!(config.member_count_interval, Duration::from_secs(1800));
        assert_eq!(config.youtube_cleanup_after, Duration::from_secs(3600));

        // 4. Debug redaction
        env::set_var("GEMINI_API_KEY", "secret_api_key");
        let debug_output = format!("{:?}", Config::build().unwrap());
        assert!(!debug_output.contains("legacy_token"));
        assert!(!debug_output.contains("secret_api_key"));
        assert!(debug_output.contains("[REDACTED]"));

        // Cleanup
        env::remove_var("TOKEN");
        env::remove_var("STREAM_CACHE_TTL");
        env::remove_var("SELECTION_TIMEOUT");
        env::remove_var("MEMBER_COUNT_INTERVAL");
        env::remove_var("YOUTUBE_CLEANUP_AFTER");
        env::remove_var("GEMINI_API_KEY");
    }

    #[test]
    fn test_mirror_providers_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[providers]]\nkind = \"invidious\"\nbase_url = \"https://inv.example\"\n\n\
             [[providers]]\nkind = \"piped\"\nbase_url = \"https://piped.example\""
        )
        .unwrap();

        let providers = Config::load_mirror_providers(file.path());
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].kind, MirrorKind::Invidious);
        assert_eq!(providers[1].base_url, "https://piped.example");
    }

    #[test]
    fn test_mirror_providers_default_when_missing() {
        let providers = Config::load_mirror_providers(Path::new("/nonexistent/mirrors.toml"));
        assert!(providers.iter().any(|p| p.kind == MirrorKind::Piped));
        assert!(providers.iter().any(|p| p.kind == MirrorKind::Invidious));
    }
}
