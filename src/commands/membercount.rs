use crate::member_count::refresh_channel;
use crate::services::member_count::MemberCountService;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use tracing::info;

/// Define the voice channel that will show the member count
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn setmembercount(
    ctx: Context<'_>,
    #[description = "Voice channel to rename"]
    #[channel_types("Voice")]
    channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    if channel.kind != serenity::ChannelType::Voice {
        ctx.say("❌ Please pick a voice channel.").await?;
        return Ok(());
    }

    let service = MemberCountService::new(ctx.data().db.clone());
    service.set_channel(guild_id.get(), channel.id.get()).await?;
    info!("Member count channel for guild {} set to {}", guild_id, channel.id);

    // Immediate update
    let serenity_ctx = ctx.serenity_context();
    refresh_channel(&serenity_ctx.cache, &serenity_ctx.http, guild_id, channel.id).await?;

    ctx.say(format!(
        "Channel <#{}> configured to show the member count!",
        channel.id
    ))
    .await?;
    Ok(())
}

/// Stop updating the member count
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn stopmembercount(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let service = MemberCountService::new(ctx.data().db.clone());

    if service.remove_channel(guild_id.get()).await? {
        ctx.say("Member count disabled!").await?;
    } else {
        ctx.say("No channel configured in this server!").await?;
    }
    Ok(())
}
