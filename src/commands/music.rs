use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::discord_text::truncate_message;
use crate::music::player::now_playing_embed;
use crate::music::reference::{spotify_search_term, PendingTrack, TrackReference};
use crate::music::ytdlp::SearchEntry;
use crate::music::{Enqueued, PauseOutcome};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use poise::serenity_prelude::CreateEmbed;
use std::sync::Arc;
use tracing::warn;

/// Discord rejects embeds with more fields than this.
const MAX_EMBED_FIELDS: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Cancel,
    /// Zero-based index into the offered results.
    Pick(usize),
}

/// Interprets a reply to the search results: `cancel` or a 1-based result number.
pub fn parse_selection(content: &str, count: usize) -> Option<Selection> {
    let content = content.trim();
    if content.eq_ignore_ascii_case("cancel") {
        return Some(Selection::Cancel);
    }
    if content.is_empty() || !content.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match content.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(Selection::Pick(n - 1)),
        _ => None,
    }
}

fn search_results_embed(results: &[SearchEntry]) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title("🔍 Search Results")
        .description(format!(
            "Type the number of the song you want to play (1-{}) or 'cancel' to abort:",
            results.len()
        ))
        .color(0x3498DB);
    for (i, entry) in results.iter().enumerate() {
        embed = embed.field(
            format!("{}. {}", i + 1, entry.display_title()),
            format!("Duration: {}", entry.display_duration()),
            false,
        );
    }
    embed
}

fn author_voice_channel(ctx: Context<'_>) -> Option<serenity::ChannelId> {
    let guild = ctx.guild()?;
    guild
        .voice_states
        .get(&ctx.author().id)
        .and_then(|vs| vs.channel_id)
}

async fn voice_manager(ctx: Context<'_>) -> Result<Arc<songbird::Songbird>, Error> {
    Ok(songbird::get(ctx.serenity_context())
        .await
        .ok_or("Songbird Voice client not initialized")?)
}

/// Offers search results and waits for the author to pick one.
async fn choose_search_result(ctx: Context<'_>, term: &str) -> Result<Option<PendingTrack>, Error> {
    ctx.say("🔍 Searching...").await?;

    let limit = ctx.data().config.search_result_limit;
    let mut results = ctx.data().music.search(term, limit).await;
    results.truncate(MAX_EMBED_FIELDS);
    if results.is_empty() {
        ctx.say("❌ No results found!").await?;
        return Ok(None);
    }

    ctx.send(poise::CreateReply::default().embed(search_results_embed(&results)))
        .await?;

    let count = results.len();
    let reply = serenity::MessageCollector::new(ctx.serenity_context())
        .author_id(ctx.author().id)
        .channel_id(ctx.channel_id())
        .timeout(ctx.data().config.selection_timeout)
        .filter(move |m| parse_selection(&m.content, count).is_some())
        .next()
        .await;

    let Some(reply) = reply else {
        ctx.say("❌ Search timed out.").await?;
        return Ok(None);
    };

    match parse_selection(&reply.content, count) {
        Some(Selection::Pick(index)) => {
            let entry = &results[index];
            Ok(Some(PendingTrack::from_video_id(&entry.id, entry.display_title())))
        }
        _ => {
            ctx.say("❌ Search cancelled.").await?;
            Ok(None)
        }
    }
}

/// Play a song by URL (YouTube/Spotify) or search term
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_bot_permissions = "CONNECT | SPEAK"
)]
pub async fn play(
    ctx: Context<'_>,
    #[description = "URL or search term"]
    #[rest]
    query: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a server")?;
    let Some(channel_id) = author_voice_channel(ctx) else {
        ctx.say("You need to be in a voice channel!").await?;
        return Ok(());
    };
    let Some(reference) = TrackReference::parse(&query) else {
        ctx.say("❌ No results found!").await?;
        return Ok(());
    };

    ctx.defer().await?;

    let music = ctx.data().music.clone();
    let voice = voice_manager(ctx).await?;
    let call = match music.connect(voice, guild_id, channel_id).await {
        Ok(call) => call,
        Err(e) => {
            ctx.say(format!("❌ Error connecting to voice channel: {}", e))
                .await?;
            return Ok(());
        }
    };

    let track = match reference {
        TrackReference::Url(url) => PendingTrack::new(url.clone(), url),
        TrackReference::Spotify { url, .. } => {
            let term = spotify_search_term(&ctx.data().http_client, &url).await;
            ctx.say(format!("🎵 Found Spotify track, searching on YouTube: {}", term))
                .await?;
            match choose_search_result(ctx, &term).await? {
                Some(track) => track,
                None => return Ok(()),
            }
        }
        TrackReference::Search(term) => match choose_search_result(ctx, &term).await? {
            Some(track) => track,
            None => return Ok(()),
        },
    };

    match music.enqueue(guild_id, &call, ctx.channel_id(), track).await {
        Ok(Enqueued::Playing { title }) => {
            ctx.send(poise::CreateReply::default().embed(now_playing_embed(&title)))
                .await?;
        }
        Ok(Enqueued::Queued { title, .. }) => {
            ctx.say(format!("🎵 Added to queue: **{}**", title)).await?;
        }
        Ok(Enqueued::Cancelled) => {
            ctx.say("⏹️ Playback was stopped before the track could start")
                .await?;
        }
        Err(e) => {
            warn!("Failed to resolve '{}' in guild {}: {}", query, guild_id, e);
            let message = format!("❌ Could not play this track: {}", e);
            ctx.say(truncate_message(&message, DISCORD_MESSAGE_LIMIT)).await?;
        }
    }

    Ok(())
}

/// Join your voice channel
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_bot_permissions = "CONNECT | SPEAK"
)]
pub async fn join(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a server")?;
    let Some(channel_id) = author_voice_channel(ctx) else {
        ctx.say("You need to be in a voice channel!").await?;
        return Ok(());
    };

    let voice = voice_manager(ctx).await?;
    match ctx.data().music.connect(voice, guild_id, channel_id).await {
        Ok(_) => {
            ctx.say(format!("🔊 Joined <#{}>", channel_id)).await?;
        }
        Err(e) => {
            ctx.say(format!("❌ Error connecting to voice channel: {}", e))
                .await?;
        }
    }

    Ok(())
}

/// Stop playing and clear the queue
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn stop(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a server")?;
    if voice_manager(ctx).await?.get(guild_id).is_none() {
        ctx.say("I'm not in a voice channel!").await?;
        return Ok(());
    }

    ctx.data().music.stop(guild_id).await?;
    ctx.say("⏹️ Stopped playing and cleared the queue").await?;
    Ok(())
}

/// Skip the current song
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn skip(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a server")?;

    if ctx.data().music.skip(guild_id).await? {
        ctx.say("⏭️ Skipped current song").await?;
    } else {
        ctx.say("Nothing is playing!").await?;
    }
    Ok(())
}

/// Pause or resume the current song
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn pause(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a server")?;
    if voice_manager(ctx).await?.get(guild_id).is_none() {
        ctx.say("I'm not in a voice channel!").await?;
        return Ok(());
    }

    let reply = match ctx.data().music.toggle_pause(guild_id).await? {
        PauseOutcome::Paused => "⏸️ Paused",
        PauseOutcome::Resumed => "▶️ Resumed",
        PauseOutcome::NothingPlaying => "Nothing is playing!",
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Show the current queue
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn queue(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a server")?;
    let snapshot = ctx.data().music.snapshot(guild_id).await;

    if snapshot.pending.is_empty() {
        ctx.say("Queue is empty!").await?;
        return Ok(());
    }

    let mut embed = CreateEmbed::new().title("🎵 Queue").color(0x3498DB);
    let mut room = MAX_EMBED_FIELDS;
    if let Some(title) = &snapshot.now_playing {
        embed = embed.field("Now Playing", title, false);
        room -= 1;
    }

    // Leave one field for the overflow note.
    let shown = if snapshot.pending.len() > room {
        room - 1
    } else {
        snapshot.pending.len()
    };
    for (i, title) in snapshot.pending.iter().take(shown).enumerate() {
        embed = embed.field(format!("{}. ", i + 1), title, false);
    }
    if shown < snapshot.pending.len() {
        embed = embed.footer(serenity::CreateEmbedFooter::new(format!(
            "…and {} more",
            snapshot.pending.len() - shown
        )));
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Leave the voice channel
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn leave(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a server")?;
    let voice = voice_manager(ctx).await?;

    if voice.get(guild_id).is_some() {
        ctx.data().music.stop(guild_id).await?;
        voice.remove(guild_id).await?;
        ctx.data().music.forget(guild_id).await;
        ctx.say("👋 Left the voice channel").await?;
    } else {
        ctx.say("I'm not in a voice channel!").await?;
    }

    Ok(())
}
