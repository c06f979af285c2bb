use crate::music::MusicManager;
use poise::serenity_prelude as serenity;
use serenity::async_trait;
use songbird::{Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Advances the guild queue when the current track ends or errors.
#[derive(Clone)]
pub struct TrackEndHandler {
    pub manager: Arc<MusicManager>,
    pub songbird: Arc<Songbird>,
    pub guild_id: serenity::GuildId,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            let ended: Vec<_> = track_list.iter().map(|(_, handle)| (*handle).clone()).collect();
            let manager = self.manager.clone();
            let songbird = self.songbird.clone();
            let guild_id = self.guild_id;

            // The driver waits on this handler; queue work happens off its task.
            tokio::spawn(async move {
                for handle in ended {
                    let Some(ticket) = manager.track_finished(guild_id, &handle).await else {
                        debug!("Ignoring end event for replaced track in guild {}", guild_id);
                        continue;
                    };
                    match songbird.get(guild_id) {
                        Some(call) => manager.advance(guild_id, &call, ticket).await,
                        None => manager.forget(guild_id).await,
                    }
                }
            });
        }
        None
    }
}

/// Forgets the guild's playback once the bot is no longer in a voice channel.
pub struct DisconnectHandler {
    pub manager: Arc<MusicManager>,
    pub call: Weak<Mutex<Call>>,
    pub guild_id: serenity::GuildId,
}

#[async_trait]
impl VoiceEventHandler for DisconnectHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            info!(
                "Voice driver disconnected in guild {}: {:?}",
                self.guild_id, data.reason
            );
            let manager = self.manager.clone();
            let call = self.call.clone();
            let guild_id = self.guild_id;

            tokio::spawn(async move {
                if let Some(call) = call.upgrade() {
                    let mut handler = call.lock().await;
                    if handler.current_channel().is_some() {
                        // Reconnected or moved; the call is still ours.
                        return;
                    }
                    handler.remove_all_global_events();
                }
                manager.forget(guild_id).await;
            });
        }
        None
    }
}
