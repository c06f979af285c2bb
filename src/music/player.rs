use crate::cache::StreamCache;
use crate::config::{Config, DISCORD_MESSAGE_LIMIT};
use crate::discord_text::truncate_message;
use crate::music::reference::PendingTrack;
use crate::music::resolver::{ResolutionChain, ResolveError, ResolvedStream, StreamSource};
use crate::music::state::{
    Admission, GuildPlayback, NextTrack, PauseToggle, QueueSnapshot, StartTicket, TrackIdentity,
};
use crate::music::ytdlp::{SearchEntry, YtDlp};
use crate::voice::events::{DisconnectHandler, TrackEndHandler};
use poise::serenity_prelude as serenity;
use serenity::{ChannelId, CreateEmbed, CreateMessage, GuildId};
use songbird::input::{File as FileInput, HttpRequest, Input};
use songbird::tracks::TrackHandle;
use songbird::{Call, CoreEvent, Event, Songbird, TrackEvent};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

type GuildState = Arc<Mutex<GuildPlayback>>;

/// Outcome of a play request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    Playing { title: String },
    Queued { title: String, position: usize },
    /// The player was stopped while the track was being resolved.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOutcome {
    Paused,
    Resumed,
    NothingPlaying,
}

/// Owns every guild's playback state and the resolution chain shared between them.
pub struct MusicManager {
    guilds: Mutex<HashMap<GuildId, GuildState>>,
    resolver: ResolutionChain,
    ytdlp: YtDlp,
    http: reqwest::Client,
    discord: Arc<serenity::Http>,
}

/// Where a queue advance ended up.
#[derive(Debug)]
pub(crate) enum NextStream {
    Ready {
        title: String,
        resolved: ResolvedStream,
        channel: Option<ChannelId>,
    },
    /// The queue ran dry and the player went idle.
    Finished,
    /// A stop or a newer play took the player over.
    Superseded,
}

/// Resolves pending tracks in order for the advance holding `ticket`. Tracks that
/// fail are handed to `on_skip` and dropped until one resolves.
pub(crate) async fn resolve_next<H, F, Fut>(
    state: &Mutex<GuildPlayback<H>>,
    resolver: &ResolutionChain,
    ticket: StartTicket,
    mut on_skip: F,
) -> NextStream
where
    H: TrackIdentity,
    F: FnMut(PendingTrack, ResolveError, Option<ChannelId>) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        let (next, channel) = {
            let mut guild = state.lock().await;
            (guild.take_next(ticket), guild.announce_channel)
        };

        let track = match next {
            NextTrack::Track(track) => track,
            NextTrack::Empty => return NextStream::Finished,
            NextTrack::Superseded => return NextStream::Superseded,
        };

        match resolver.resolve(&track).await {
            Ok(resolved) => {
                return NextStream::Ready {
                    title: resolved.title.clone(),
                    resolved,
                    channel,
                }
            }
            Err(e) => {
                warn!("Skipping '{}': {}", track.title, e);
                on_skip(track, e, channel).await;
            }
        }
    }
}

pub fn now_playing_embed(title: &str) -> CreateEmbed {
    CreateEmbed::new()
        .title("🎵 Now Playing")
        .description(format!("**{}**", title))
        .color(0x57F287)
}

impl MusicManager {
    pub fn new(config: &Config, http: reqwest::Client, discord: Arc<serenity::Http>) -> Self {
        let cache = StreamCache::new(config.stream_cache_capacity, config.stream_cache_ttl);
        Self {
            guilds: Mutex::new(HashMap::new()),
            resolver: ResolutionChain::from_config(config, http.clone(), cache),
            ytdlp: YtDlp::new(&config.ytdlp_path, config.youtube_cookies.clone()),
            http,
            discord,
        }
    }

    async fn guild(&self, guild_id: GuildId) -> GuildState {
        self.guilds
            .lock()
            .await
            .entry(guild_id)
            .or_default()
            .clone()
    }

    async fn existing_guild(&self, guild_id: GuildId) -> Option<GuildState> {
        self.guilds.lock().await.get(&guild_id).cloned()
    }

    pub async fn search(&self, query: &str, limit: u8) -> Vec<SearchEntry> {
        self.ytdlp.search(query, limit).await
    }

    pub async fn resolve(&self, track: &PendingTrack) -> Result<ResolvedStream, ResolveError> {
        self.resolver.resolve(track).await
    }

    /// Joins (or moves to) the voice channel and makes sure the call reports track
    /// ends and disconnects back to us.
    pub async fn connect(
        self: &Arc<Self>,
        songbird: Arc<Songbird>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> anyhow::Result<Arc<Mutex<Call>>> {
        let call = songbird.join(guild_id, channel_id).await?;

        let state = self.guild(guild_id).await;
        let mut guild = state.lock().await;
        if !guild.hooks_registered {
            let mut handler = call.lock().await;
            let on_end = TrackEndHandler {
                manager: self.clone(),
                songbird: songbird.clone(),
                guild_id,
            };
            handler.add_global_event(Event::Track(TrackEvent::End), on_end.clone());
            handler.add_global_event(Event::Track(TrackEvent::Error), on_end);
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectHandler {
                    manager: self.clone(),
                    call: Arc::downgrade(&call),
                    guild_id,
                },
            );
            guild.hooks_registered = true;
            info!("Registered voice event handlers for guild {}", guild_id);
        }

        Ok(call)
    }

    /// Resolves the track, then plays it immediately or appends it to the guild queue.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        call: &Arc<Mutex<Call>>,
        announce_channel: ChannelId,
        mut track: PendingTrack,
    ) -> Result<Enqueued, ResolveError> {
        let resolved = self.resolver.resolve(&track).await?;
        track.title = resolved.title.clone();

        let state = self.guild(guild_id).await;
        let admission = {
            let mut guild = state.lock().await;
            guild.announce_channel = Some(announce_channel);
            guild.admit(track)
        };

        match admission {
            Admission::Queued { position } => {
                info!("Queued '{}' at position {} in guild {}", resolved.title, position, guild_id);
                Ok(Enqueued::Queued {
                    title: resolved.title,
                    position,
                })
            }
            Admission::Start { track, ticket } => {
                if self.start(&state, call, ticket, track.title.clone(), &resolved).await {
                    Ok(Enqueued::Playing { title: track.title })
                } else {
                    Ok(Enqueued::Cancelled)
                }
            }
        }
    }

    /// Starts a resolved stream if `ticket` still holds the player.
    ///
    /// The guild lock is held while the track starts so an end event can never
    /// observe the new track before it is recorded as current.
    async fn start(
        &self,
        state: &GuildState,
        call: &Arc<Mutex<Call>>,
        ticket: StartTicket,
        title: String,
        resolved: &ResolvedStream,
    ) -> bool {
        let mut guild = state.lock().await;
        if !guild.holds(ticket) {
            return false;
        }

        let input = self.input_for(&resolved.source);
        let handle = call.lock().await.play_only_input(input);
        info!("Now playing '{}' (via {})", title, resolved.resolved_by);
        guild.begin_playing(title, handle);
        true
    }

    fn input_for(&self, source: &StreamSource) -> Input {
        match source {
            StreamSource::Remote(url) => HttpRequest::new(self.http.clone(), url.clone()).into(),
            StreamSource::File(path) => FileInput::new(path.clone()).into(),
        }
    }

    /// Handles a track end reported by the voice driver. Returns the reservation
    /// for the queue advance when the ended track was the current one.
    pub async fn track_finished(&self, guild_id: GuildId, ended: &TrackHandle) -> Option<StartTicket> {
        let state = self.existing_guild(guild_id).await?;
        let ticket = state.lock().await.finish_if_current(ended);
        ticket
    }

    /// Plays the next pending track. Tracks that fail to resolve are announced and
    /// skipped; an empty queue leaves the connection idle.
    pub async fn advance(&self, guild_id: GuildId, call: &Arc<Mutex<Call>>, ticket: StartTicket) {
        let Some(state) = self.existing_guild(guild_id).await else {
            return;
        };

        let on_skip = move |track: PendingTrack, e: ResolveError, channel| async move {
            let message = format!("❌ Error playing **{}**: {}", track.title, e);
            self.announce(
                channel,
                CreateMessage::new().content(truncate_message(&message, DISCORD_MESSAGE_LIMIT)),
            )
            .await;
        };
        let next = resolve_next(&*state, &self.resolver, ticket, on_skip).await;

        match next {
            NextStream::Ready {
                title,
                resolved,
                channel,
            } => {
                if self.start(&state, call, ticket, title.clone(), &resolved).await {
                    self.announce(channel, CreateMessage::new().embed(now_playing_embed(&title)))
                        .await;
                } else {
                    debug!("Dropping '{}' in guild {}, playback was taken over", title, guild_id);
                }
            }
            NextStream::Finished => {
                info!("Queue finished in guild {}, connection left idle", guild_id);
            }
            NextStream::Superseded => {
                debug!("Queue advance in guild {} superseded", guild_id);
            }
        }
    }

    async fn announce(&self, channel: Option<ChannelId>, message: CreateMessage) {
        let Some(channel) = channel else {
            return;
        };
        if let Err(e) = channel.send_message(&self.discord, message).await {
            error!("Failed to announce in channel {}: {}", channel, e);
        }
    }

    /// Clears the queue and stops the current track. Returns whether a track was stopped.
    pub async fn stop(&self, guild_id: GuildId) -> anyhow::Result<bool> {
        let Some(state) = self.existing_guild(guild_id).await else {
            return Ok(false);
        };
        let handle = state.lock().await.stop();
        match handle {
            Some(handle) => {
                handle.stop()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stops the current track; its end event advances the queue.
    pub async fn skip(&self, guild_id: GuildId) -> anyhow::Result<bool> {
        let Some(state) = self.existing_guild(guild_id).await else {
            return Ok(false);
        };
        let handle = state
            .lock()
            .await
            .current()
            .map(|now| now.handle.clone());
        match handle {
            Some(handle) => {
                handle.stop()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn toggle_pause(&self, guild_id: GuildId) -> anyhow::Result<PauseOutcome> {
        let Some(state) = self.existing_guild(guild_id).await else {
            return Ok(PauseOutcome::NothingPlaying);
        };
        let toggle = state.lock().await.toggle_pause();
        match toggle {
            PauseToggle::Pause(handle) => {
                handle.pause()?;
                Ok(PauseOutcome::Paused)
            }
            PauseToggle::Resume(handle) => {
                handle.play()?;
                Ok(PauseOutcome::Resumed)
            }
            PauseToggle::NothingPlaying => Ok(PauseOutcome::NothingPlaying),
        }
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        let Some(state) = self.existing_guild(guild_id).await else {
            return QueueSnapshot {
                now_playing: None,
                pending: Vec::new(),
            };
        };
        let snapshot = state.lock().await.snapshot();
        snapshot
    }

    /// Drops all playback state for a guild, e.g. after leaving voice.
    pub async fn forget(&self, guild_id: GuildId) {
        let removed = self.guilds.lock().await.remove(&guild_id);
        if let Some(state) = removed {
            state.lock().await.reset();
            info!("Cleared playback state for guild {}", guild_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::music::resolver::ResolveStrategy;
    use crate::music::state::tests::{track, FakeHandle};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Resolves every track except the listed titles.
    struct FailsFor(&'static [&'static str]);

    #[async_trait]
    impl ResolveStrategy for FailsFor {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn resolve(&self, track: &PendingTrack) -> Result<ResolvedStream, ResolveError> {
            if self.0.contains(&track.title.as_str()) {
                return Err(anyhow::anyhow!("video unavailable").into());
            }
            Ok(ResolvedStream {
                title: track.title.clone(),
                source: StreamSource::Remote(format!("https://cdn.example.com/{}", track.title)),
                duration: None,
                resolved_by: self.name(),
            })
        }
    }

    fn chain(failing: &'static [&'static str]) -> ResolutionChain {
        ResolutionChain::new(
            vec![Arc::new(FailsFor(failing)) as Arc<dyn ResolveStrategy>],
            StreamCache::new(16, Duration::from_secs(60)),
        )
    }

    /// A guild whose current track just ended with `titles` still queued.
    fn ended_with_queue(titles: &[&str]) -> (Mutex<GuildPlayback<FakeHandle>>, StartTicket) {
        let mut state = GuildPlayback::default();
        state.admit(track("current"));
        state.begin_playing("current".to_string(), FakeHandle(1));
        for title in titles {
            state.admit(track(title));
        }
        state.announce_channel = Some(ChannelId::new(9));
        let ticket = state.finish_if_current(&FakeHandle(1)).unwrap();
        (Mutex::new(state), ticket)
    }

    #[tokio::test]
    async fn test_failed_track_is_reported_and_next_one_resolves() {
        let (state, ticket) = ended_with_queue(&["broken", "good", "later"]);
        let mut skipped = Vec::new();

        let next = resolve_next(&state, &chain(&["broken"]), ticket, |track, e, channel| {
            skipped.push((track.title, e.to_string(), channel));
            async {}
        })
        .await;

        let NextStream::Ready { title, resolved, channel } = next else {
            panic!("expected a playable track");
        };
        assert_eq!(title, "good");
        assert_eq!(resolved.source, StreamSource::Remote("https://cdn.example.com/good".to_string()));
        assert_eq!(channel, Some(ChannelId::new(9)));

        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].0, "broken");
        assert!(skipped[0].1.contains("video unavailable"));
        assert_eq!(skipped[0].2, Some(ChannelId::new(9)));

        let guild = state.lock().await;
        assert!(guild.holds(ticket));
        assert_eq!(guild.snapshot().pending, vec!["later"]);
    }

    #[tokio::test]
    async fn test_all_failures_leave_player_idle() {
        let (state, ticket) = ended_with_queue(&["a", "b"]);
        let mut skipped = Vec::new();

        let next = resolve_next(&state, &chain(&["a", "b"]), ticket, |track, _, _| {
            skipped.push(track.title);
            async {}
        })
        .await;

        assert!(matches!(next, NextStream::Finished));
        assert_eq!(skipped, vec!["a", "b"]);
        assert!(state.lock().await.is_idle());
    }

    #[tokio::test]
    async fn test_empty_queue_goes_idle() {
        let (state, ticket) = ended_with_queue(&[]);
        let next = resolve_next(&state, &chain(&[]), ticket, |_, _, _| async {}).await;

        assert!(matches!(next, NextStream::Finished));
        assert!(state.lock().await.is_idle());
    }

    #[tokio::test]
    async fn test_stop_and_play_during_advance_supersede_it() {
        let (state, ticket) = ended_with_queue(&["broken", "good"]);
        let state = &state;

        // The user stops and plays a new track while "broken" is being resolved
        let next = resolve_next(state, &chain(&["broken"]), ticket, move |_, _, _| async move {
            let mut guild = state.lock().await;
            guild.stop();
            guild.admit(track("fresh"));
        })
        .await;

        assert!(matches!(next, NextStream::Superseded));
        let guild = state.lock().await;
        assert!(!guild.holds(ticket));
        assert!(!guild.is_idle());
        assert!(guild.pending.is_empty());
    }
}
