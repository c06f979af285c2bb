use crate::db::BirthdayRecord;
use crate::services::birthday::BirthdayService;
use chrono::{DateTime, Days, FixedOffset, Offset, TimeZone, Utc};
use poise::serenity_prelude as serenity;
use serenity::{ChannelId, CreateAllowedMentions, CreateEmbed, CreateMessage, GuildId, UserId};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

pub fn birthday_embed(user_id: UserId) -> CreateEmbed {
    CreateEmbed::new()
        .title("🎉 Feliz Aniversário! 🎂")
        .description(format!("Hoje é aniversário de <@{}>!\nParabéns! 🎈🎊", user_id))
        .color(0xF1C40F)
}

/// Time left until the next local midnight at `offset`.
pub fn until_next_midnight(now: DateTime<Utc>, offset: FixedOffset) -> Duration {
    let local = now.with_timezone(&offset);
    let next_midnight = local
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| offset.from_local_datetime(&midnight).single());

    match next_midnight {
        Some(midnight) => (midnight.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
        None => Duration::from_secs(24 * 60 * 60),
    }
}

/// Today's `dd-mm` key at `offset`.
pub fn local_date_key(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset).format("%d-%m").to_string()
}

const UNKNOWN_MEMBER: isize = 10007;
const UNKNOWN_USER: isize = 10013;

/// Whether Discord answered that the user is not (or no longer) in the guild.
fn is_unknown_member(error: &::serenity::Error) -> bool {
    match error {
        ::serenity::Error::Http(::serenity::http::HttpError::UnsuccessfulRequest(response)) => {
            is_unknown_member_response(response.status_code.as_u16(), response.error.code)
        }
        _ => false,
    }
}

fn is_unknown_member_response(status: u16, code: isize) -> bool {
    status == 404 && matches!(code, UNKNOWN_MEMBER | UNKNOWN_USER)
}

/// Announces birthdays once a day, right after local midnight.
pub struct BirthdayAnnouncer {
    service: BirthdayService,
    http: Arc<serenity::Http>,
    cache: Arc<serenity::Cache>,
    offset: FixedOffset,
}

impl BirthdayAnnouncer {
    pub fn new(
        service: BirthdayService,
        http: Arc<serenity::Http>,
        cache: Arc<serenity::Cache>,
        utc_offset_hours: i32,
    ) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours.saturating_mul(3600)).unwrap_or_else(|| {
            warn!("Invalid birthday UTC offset {}h, using UTC", utc_offset_hours);
            Utc.fix()
        });
        Self {
            service,
            http,
            cache,
            offset,
        }
    }

    pub async fn run(self) {
        loop {
            let wait = until_next_midnight(Utc::now(), self.offset);
            debug!("Next birthday check in {}", humantime::format_duration(wait));
            tokio::time::sleep(wait).await;

            let today = local_date_key(Utc::now(), self.offset);
            if let Err(e) = self.announce_day(&today).await {
                error!("Birthday announcement cycle failed: {}", e);
            }
        }
    }

    async fn announce_day(&self, date: &str) -> anyhow::Result<()> {
        let birthdays = self.service.on_date(date.to_string()).await?;
        info!("{} birthday(s) on {}", birthdays.len(), date);

        for birthday in birthdays {
            if let Err(e) = self.announce(&birthday).await {
                error!(
                    "Failed to announce birthday of {} in guild {}: {}",
                    birthday.user_id, birthday.guild_id, e
                );
            }
        }
        Ok(())
    }

    async fn announce(&self, birthday: &BirthdayRecord) -> anyhow::Result<()> {
        let guild_id = GuildId::new(birthday.guild_id);
        let user_id = UserId::new(birthday.user_id);

        match guild_id.member((&self.cache, self.http.as_ref()), user_id).await {
            Ok(_) => {}
            Err(e) if is_unknown_member(&e) => {
                debug!("Skipping birthday of {} in guild {}: no longer a member", user_id, guild_id);
                return Ok(());
            }
            Err(e) => {
                warn!(
                    "Could not check membership of {} in guild {}, announcing anyway: {}",
                    user_id, guild_id, e
                );
            }
        }

        let Some(channel_id) = self.announcement_channel(guild_id).await? else {
            warn!("Guild {} has no birthday or system channel", guild_id);
            return Ok(());
        };

        let message = CreateMessage::new()
            .embed(birthday_embed(user_id))
            .allowed_mentions(CreateAllowedMentions::new().users(vec![user_id]));
        channel_id.send_message(&self.http, message).await?;
        Ok(())
    }

    /// The configured birthday channel, falling back to the guild's system channel.
    async fn announcement_channel(&self, guild_id: GuildId) -> anyhow::Result<Option<ChannelId>> {
        if let Some(channel) = self.service.channel(guild_id.get()).await? {
            return Ok(Some(ChannelId::new(channel)));
        }

        let cached = self
            .cache
            .guild(guild_id)
            .map(|guild| guild.system_channel_id);
        match cached {
            Some(channel) => Ok(channel),
            None => Ok(self.http.get_guild(guild_id).await?.system_channel_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sao_paulo() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    #[test]
    fn test_until_next_midnight() {
        // 02:00 UTC is 23:00 the previous day at UTC-3
        let now = Utc.with_ymd_and_hms(2024, 12, 25, 2, 0, 0).unwrap();
        assert_eq!(until_next_midnight(now, sao_paulo()), Duration::from_secs(3600));

        // Exactly midnight local waits a full day
        let now = Utc.with_ymd_and_hms(2024, 12, 25, 3, 0, 0).unwrap();
        assert_eq!(
            until_next_midnight(now, sao_paulo()),
            Duration::from_secs(24 * 3600)
        );
    }

    #[test]
    fn test_local_date_key_uses_offset() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 1, 30, 0).unwrap();
        assert_eq!(local_date_key(now, sao_paulo()), "31-12");
        assert_eq!(local_date_key(now, FixedOffset::east_opt(0).unwrap()), "01-01");
    }

    #[test]
    fn test_only_unknown_member_responses_are_skipped() {
        assert!(is_unknown_member_response(404, 10007));
        assert!(is_unknown_member_response(404, 10013));
        // Rate limits and outages must not drop the announcement
        assert!(!is_unknown_member_response(429, 0));
        assert!(!is_unknown_member_response(502, 0));
        assert!(!is_unknown_member_response(404, 10003));

        let other = ::serenity::Error::Other("gateway closed");
        assert!(!is_unknown_member(&other));
    }

    #[test]
    fn test_month_rollover() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 12, 0, 0).unwrap();
        assert_eq!(local_date_key(now, sao_paulo()), "29-02");
        assert_eq!(until_next_midnight(now, sao_paulo()), Duration::from_secs(15 * 3600));
    }
}
