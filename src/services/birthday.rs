use crate::db::{BirthdayRecord, Database};
use chrono::NaiveDate;

/// Validates a `dd-mm` date and returns it zero-padded. 29-02 is accepted.
pub fn parse_birthday(input: &str) -> Option<String> {
    let (day, month) = input.trim().split_once('-')?;
    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    // A leap year, so every calendar day exists
    NaiveDate::from_ymd_opt(2000, month, day)?;
    Some(format!("{:02}-{:02}", day, month))
}

#[derive(Clone)]
pub struct BirthdayService {
    db: Database,
}

impl BirthdayService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn set(&self, guild_id: u64, user_id: u64, date: String) -> anyhow::Result<()> {
        self.db
            .run_blocking(move |db| db.set_birthday(guild_id, user_id, &date))
            .await
    }

    pub async fn remove(&self, guild_id: u64, user_id: u64) -> anyhow::Result<bool> {
        self.db
            .run_blocking(move |db| db.remove_birthday(guild_id, user_id))
            .await
    }

    pub async fn list(&self, guild_id: u64) -> anyhow::Result<Vec<BirthdayRecord>> {
        self.db.run_blocking(move |db| db.list_birthdays(guild_id)).await
    }

    pub async fn on_date(&self, date: String) -> anyhow::Result<Vec<BirthdayRecord>> {
        self.db.run_blocking(move |db| db.birthdays_on(&date)).await
    }

    pub async fn set_channel(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<()> {
        self.db
            .run_blocking(move |db| db.set_birthday_channel(guild_id, channel_id))
            .await
    }

    pub async fn remove_channel(&self, guild_id: u64) -> anyhow::Result<bool> {
        self.db
            .run_blocking(move |db| db.remove_birthday_channel(guild_id))
            .await
    }

    pub async fn channel(&self, guild_id: u64) -> anyhow::Result<Option<u64>> {
        self.db
            .run_blocking(move |db| db.get_birthday_channel(guild_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_birthday() {
        assert_eq!(parse_birthday("25-12").as_deref(), Some("25-12"));
        assert_eq!(parse_birthday("5-3").as_deref(), Some("05-03"));
        assert_eq!(parse_birthday("29-02").as_deref(), Some("29-02"));
        assert_eq!(parse_birthday("31-04"), None);
        assert_eq!(parse_birthday("12-25"), None);
        assert_eq!(parse_birthday("25/12"), None);
        assert_eq!(parse_birthday("tomorrow"), None);
    }

    #[tokio::test]
    async fn test_service_round_trip() {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        let service = BirthdayService::new(db);

        service.set(1, 10, "25-12".to_string()).await.unwrap();
        assert_eq!(service.on_date("25-12".to_string()).await.unwrap().len(), 1);
        assert!(service.remove(1, 10).await.unwrap());
        assert!(service.list(1).await.unwrap().is_empty());

        service.set_channel(1, 99).await.unwrap();
        assert_eq!(service.channel(1).await.unwrap(), Some(99));
    }
}
