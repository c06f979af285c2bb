use magna::birthdays::BirthdayAnnouncer;
use magna::member_count::MemberCountUpdater;
use magna::services::{birthday::BirthdayService, member_count::MemberCountService};
use magna::{commands, config::Config, Data, Error};
use poise::serenity_prelude as serenity;
use songbird::serenity::SerenityInit;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match &error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Command '{}' failed: {}", ctx.command().qualified_name, error);
        }
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start the bot: {}", error);
        }
        _ => {}
    }
    if let Err(e) = poise::builtins::on_error(error).await {
        error!("Error while handling error: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("Loaded configuration: {:?}", config);

    let discord_token = config.discord_token.clone();
    let prefix = config.command_prefix.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                ..Default::default()
            },
            on_error: |error| Box::pin(on_error(error)),
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "{} invoked '{}'",
                        ctx.author().name,
                        ctx.command().qualified_name
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    info!("Finished '{}'", ctx.command().qualified_name);
                })
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                info!("{} is ready!", ready.user.name);

                if config.register_commands {
                    let commands = &framework.options().commands;
                    match config.dev_guild_id {
                        Some(guild_id) => {
                            let guild_id = serenity::GuildId::new(guild_id);
                            poise::builtins::register_in_guild(ctx, commands, guild_id).await?;
                            info!("Registered slash commands in guild {}", guild_id);
                        }
                        None => {
                            poise::builtins::register_globally(ctx, commands).await?;
                            info!("Registered slash commands globally");
                        }
                    }
                }

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::playing(&config.status_message)));

                let db = magna::db::Database::new(&config)?;
                db.execute_init()?;

                let http_client = reqwest::Client::new();
                let llm_client = magna::llm::LlmClient::new(&config);
                let music = Arc::new(magna::music::MusicManager::new(
                    &config,
                    http_client.clone(),
                    ctx.http.clone(),
                ));

                tokio::spawn(
                    BirthdayAnnouncer::new(
                        BirthdayService::new(db.clone()),
                        ctx.http.clone(),
                        ctx.cache.clone(),
                        config.birthday_utc_offset_hours,
                    )
                    .run(),
                );
                tokio::spawn(
                    MemberCountUpdater::new(
                        MemberCountService::new(db.clone()),
                        ctx.http.clone(),
                        ctx.cache.clone(),
                        config.member_count_interval,
                    )
                    .run(),
                );
                tokio::spawn(magna::voice::cleanup::start_cleanup_task(
                    PathBuf::from(&config.youtube_download_dir),
                    config.youtube_cleanup_after,
                ));

                Ok(Data {
                    config,
                    http_client,
                    llm_client,
                    db,
                    music,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_VOICE_STATES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .register_songbird()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
