use crate::services::member_count::{member_count_label, MemberCountService};
use poise::serenity_prelude as serenity;
use serenity::{ChannelId, EditChannel, GuildId};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

/// Member count of a guild, from the cache when possible.
pub async fn guild_member_count(
    cache: &serenity::Cache,
    http: &serenity::Http,
    guild_id: GuildId,
) -> anyhow::Result<u64> {
    let cached = cache.guild(guild_id).map(|guild| guild.member_count);
    if let Some(count) = cached {
        return Ok(count);
    }

    http.get_guild_with_counts(guild_id)
        .await?
        .approximate_member_count
        .ok_or_else(|| anyhow::anyhow!("guild {} did not report a member count", guild_id))
}

/// Renames `channel_id` to the member-count label unless it already carries it.
/// Returns whether the channel was renamed.
pub async fn refresh_channel(
    cache: &serenity::Cache,
    http: &serenity::Http,
    guild_id: GuildId,
    channel_id: ChannelId,
) -> anyhow::Result<bool> {
    let label = member_count_label(guild_member_count(cache, http, guild_id).await?);

    let channel = channel_id
        .to_channel(http)
        .await?
        .guild()
        .ok_or_else(|| anyhow::anyhow!("channel {} is not a guild channel", channel_id))?;
    if channel.name == label {
        return Ok(false);
    }

    channel_id.edit(http, EditChannel::new().name(label)).await?;
    Ok(true)
}

/// Keeps every configured member-count channel up to date.
pub struct MemberCountUpdater {
    service: MemberCountService,
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
    period: Duration,
}

impl MemberCountUpdater {
    pub fn new(
        service: MemberCountService,
        http: Arc<serenity::Http>,
        cache: Arc<serenity::Cache>,
        period: Duration,
    ) -> Self {
        Self {
            service,
            http,
            cache,
            period,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.update_all().await {
                error!("Member count update cycle failed: {}", e);
            }
        }
    }

    async fn update_all(&self) -> anyhow::Result<()> {
        let channels = self.service.channels().await?;
        debug!("Refreshing {} member count channel(s)", channels.len());

        for (guild_id, channel_id) in channels {
            let guild_id = GuildId::new(guild_id);
            let channel_id = ChannelId::new(channel_id);
            match refresh_channel(&self.cache, &self.http, guild_id, channel_id).await {
                Ok(true) => info!("Updated member count channel in guild {}", guild_id),
                Ok(false) => {}
                Err(e) => error!("Error on member count update in guild {}: {}", guild_id, e),
            }
        }
        Ok(())
    }
}
