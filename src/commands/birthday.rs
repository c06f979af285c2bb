use crate::services::birthday::{parse_birthday, BirthdayService};
use crate::{Context, Error};
use poise::serenity_prelude as serenity;
use serenity::{CreateEmbed, UserId};
use tracing::info;

const MAX_LISTED: usize = 25;

/// Birthday commands
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    subcommands("add", "remove", "list", "setchannel", "removechannel")
)]
pub async fn birthday(ctx: Context<'_>) -> Result<(), Error> {
    let prefix = &ctx.data().config.command_prefix;
    ctx.say(format!(
        "Use `{p}birthday add <member> <dd-mm>` to add a birthday\n\
         Use `{p}birthday remove <member>` to remove a birthday\n\
         Use `{p}birthday list` to see all birthdays",
        p = prefix
    ))
    .await?;
    Ok(())
}

/// Add a member's birthday (format: dd-mm)
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "Member whose birthday it is"] member: serenity::Member,
    #[description = "Day and month, e.g. 25-12"] date: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let Some(date) = parse_birthday(&date) else {
        ctx.say("Invalid date format! Use dd-mm (example: 25-12)").await?;
        return Ok(());
    };

    let service = BirthdayService::new(ctx.data().db.clone());
    service
        .set(guild_id.get(), member.user.id.get(), date.clone())
        .await?;
    info!("Birthday of {} in guild {} set to {}", member.user.id, guild_id, date);

    ctx.say(format!("Birthday for <@{}> set to {}! 🎂", member.user.id, date))
        .await?;
    Ok(())
}

/// Remove a member's birthday
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Member to forget"] member: serenity::Member,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let service = BirthdayService::new(ctx.data().db.clone());

    if service.remove(guild_id.get(), member.user.id.get()).await? {
        ctx.say(format!("<@{}>'s birthday has been removed!", member.user.id))
            .await?;
    } else {
        ctx.say(format!("<@{}> doesn't have a birthday set!", member.user.id))
            .await?;
    }
    Ok(())
}

/// List all birthdays in this server
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let service = BirthdayService::new(ctx.data().db.clone());
    let birthdays = service.list(guild_id.get()).await?;

    let mut entries = Vec::new();
    for birthday in birthdays {
        // Members who left are not listed
        if let Ok(member) = guild_id.member(ctx, UserId::new(birthday.user_id)).await {
            entries.push((member.display_name().to_string(), birthday.date));
        }
        if entries.len() == MAX_LISTED {
            break;
        }
    }

    if entries.is_empty() {
        ctx.say("No birthdays set!").await?;
        return Ok(());
    }

    let embed = CreateEmbed::new()
        .title("🎂 Birthday List")
        .color(0x3498DB)
        .fields(entries.into_iter().map(|(name, date)| (name, date, true)));
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Set the birthday announcement channel
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn setchannel(
    ctx: Context<'_>,
    #[description = "Channel for announcements (defaults to this one)"] channel: Option<
        serenity::GuildChannel,
    >,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());

    let service = BirthdayService::new(ctx.data().db.clone());
    service.set_channel(guild_id.get(), channel_id.get()).await?;

    ctx.say(format!(
        "Birthday announcements will now be sent in <#{}>! 🎉",
        channel_id
    ))
    .await?;
    Ok(())
}

/// Remove the birthday announcement channel (the system channel is used instead)
#[poise::command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn removechannel(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let service = BirthdayService::new(ctx.data().db.clone());

    if service.remove_channel(guild_id.get()).await? {
        ctx.say("Birthday channel removed! Will use system channel instead.")
            .await?;
    } else {
        ctx.say("No birthday channel was set!").await?;
    }
    Ok(())
}
