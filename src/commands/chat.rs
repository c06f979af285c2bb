use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::discord_text::split_message;
use crate::llm::LlmError;
use crate::{Context, Error};
use tracing::error;

/// Ask Magna Shanoa anything
#[poise::command(prefix_command, slash_command)]
pub async fn ask(
    ctx: Context<'_>,
    #[description = "Your question for Magna"]
    #[rest]
    question: String,
) -> Result<(), Error> {
    // Typing indicator for prefix use, deferred reply for slash use
    ctx.defer_or_broadcast().await?;

    let answer = match ctx.data().llm_client.ask(&question).await {
        Ok(answer) => answer,
        Err(LlmError::Blocked) => {
            ctx.say("⚠️ That question was blocked for safety reasons").await?;
            return Ok(());
        }
        Err(LlmError::Empty) => {
            ctx.say("No response generated").await?;
            return Ok(());
        }
        Err(e) => {
            error!("Persona request failed: {}", e);
            ctx.say("❌ Error with Magna's AI").await?;
            return Ok(());
        }
    };

    for chunk in split_message(&answer, DISCORD_MESSAGE_LIMIT) {
        ctx.say(chunk).await?;
    }

    Ok(())
}
