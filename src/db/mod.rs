mod schema;

use crate::config::Config;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirthdayRecord {
    pub guild_id: u64,
    pub user_id: u64,
    /// `dd-mm`
    pub date: String,
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        if config.database_url != ":memory:" {
            if let Some(parent) = Path::new(&config.database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        Self::open(&config.database_url)
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))
    }

    /// Runs blocking database work on the blocking thread pool.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        self.conn()?.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    pub fn set_birthday(&self, guild_id: u64, user_id: u64, date: &str) -> anyhow::Result<()> {
        debug!("Database: Setting birthday of {} in guild {} to {}", user_id, guild_id, date);
        self.conn()?.execute(
            "INSERT INTO birthdays (guild_id, user_id, date) VALUES (?1, ?2, ?3)
             ON CONFLICT(guild_id, user_id) DO UPDATE SET date = excluded.date",
            (guild_id.to_string(), user_id.to_string(), date),
        )?;
        Ok(())
    }

    pub fn remove_birthday(&self, guild_id: u64, user_id: u64) -> anyhow::Result<bool> {
        let removed = self.conn()?.execute(
            "DELETE FROM birthdays WHERE guild_id = ?1 AND user_id = ?2",
            (guild_id.to_string(), user_id.to_string()),
        )?;
        Ok(removed > 0)
    }

    pub fn list_birthdays(&self, guild_id: u64) -> anyhow::Result<Vec<BirthdayRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT guild_id, user_id, date FROM birthdays
             WHERE guild_id = ?1
             ORDER BY substr(date, 4, 2), substr(date, 1, 2)",
        )?;
        let rows = stmt.query_map([guild_id.to_string()], read_birthday)?;
        collect_birthdays(rows)
    }

    /// Birthdays on `date` (`dd-mm`) across every guild.
    pub fn birthdays_on(&self, date: &str) -> anyhow::Result<Vec<BirthdayRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT guild_id, user_id, date FROM birthdays WHERE date = ?1 ORDER BY guild_id",
        )?;
        let rows = stmt.query_map([date], read_birthday)?;
        collect_birthdays(rows)
    }

    pub fn set_birthday_channel(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<()> {
        set_channel(&*self.conn()?, "birthday_channels", guild_id, channel_id)
    }

    pub fn remove_birthday_channel(&self, guild_id: u64) -> anyhow::Result<bool> {
        remove_channel(&*self.conn()?, "birthday_channels", guild_id)
    }

    pub fn get_birthday_channel(&self, guild_id: u64) -> anyhow::Result<Option<u64>> {
        let channel: Option<String> = self
            .conn()?
            .query_row(
                "SELECT channel_id FROM birthday_channels WHERE guild_id = ?1",
                [guild_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        channel.map(|c| parse_id(&c)).transpose()
    }

    pub fn set_member_count_channel(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<()> {
        set_channel(&*self.conn()?, "member_count_channels", guild_id, channel_id)
    }

    pub fn remove_member_count_channel(&self, guild_id: u64) -> anyhow::Result<bool> {
        remove_channel(&*self.conn()?, "member_count_channels", guild_id)
    }

    /// All `(guild_id, channel_id)` pairs with a member-count channel.
    pub fn member_count_channels(&self) -> anyhow::Result<Vec<(u64, u64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT guild_id, channel_id FROM member_count_channels")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut channels = Vec::new();
        for row in rows {
            let (guild_id, channel_id) = row?;
            channels.push((parse_id(&guild_id)?, parse_id(&channel_id)?));
        }
        Ok(channels)
    }
}

// Table names come from the constants above, never from user input.
fn set_channel(conn: &Connection, table: &str, guild_id: u64, channel_id: u64) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {table} (guild_id, channel_id) VALUES (?1, ?2)
             ON CONFLICT(guild_id) DO UPDATE SET channel_id = excluded.channel_id"
        ),
        (guild_id.to_string(), channel_id.to_string()),
    )?;
    Ok(())
}

fn remove_channel(conn: &Connection, table: &str, guild_id: u64) -> anyhow::Result<bool> {
    let removed = conn.execute(
        &format!("DELETE FROM {table} WHERE guild_id = ?1"),
        [guild_id.to_string()],
    )?;
    Ok(removed > 0)
}

fn read_birthday(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn collect_birthdays(
    rows: impl Iterator<Item = rusqlite::Result<(String, String, String)>>,
) -> anyhow::Result<Vec<BirthdayRecord>> {
    let mut records = Vec::new();
    for row in rows {
        let (guild_id, user_id, date) = row?;
        records.push(BirthdayRecord {
            guild_id: parse_id(&guild_id)?,
            user_id: parse_id(&user_id)?,
            date,
        });
    }
    Ok(records)
}

fn parse_id(raw: &str) -> anyhow::Result<u64> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid snowflake '{}' in database: {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    #[test]
    fn test_init_is_idempotent() {
        let db = test_db();
        db.execute_init().unwrap();
    }

    #[test]
    fn test_birthdays_are_per_guild() {
        let db = test_db();
        db.set_birthday(1, 10, "25-12").unwrap();
        db.set_birthday(1, 11, "01-01").unwrap();
        db.set_birthday(2, 10, "25-12").unwrap();

        let guild_one = db.list_birthdays(1).unwrap();
        assert_eq!(guild_one.len(), 2);
        // Ordered by month, then day
        assert_eq!(guild_one[0].user_id, 11);
        assert_eq!(guild_one[1].date, "25-12");

        let christmas = db.birthdays_on("25-12").unwrap();
        assert_eq!(christmas.len(), 2);
        assert_eq!(christmas[0].guild_id, 1);
        assert_eq!(christmas[1].guild_id, 2);
    }

    #[test]
    fn test_set_birthday_overwrites() {
        let db = test_db();
        db.set_birthday(1, 10, "25-12").unwrap();
        db.set_birthday(1, 10, "29-02").unwrap();
        let list = db.list_birthdays(1).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].date, "29-02");
    }

    #[test]
    fn test_remove_birthday() {
        let db = test_db();
        db.set_birthday(1, 10, "25-12").unwrap();
        assert!(db.remove_birthday(1, 10).unwrap());
        assert!(!db.remove_birthday(1, 10).unwrap());
        assert!(db.list_birthdays(1).unwrap().is_empty());
    }

    #[test]
    fn test_birthday_channel() {
        let db = test_db();
        assert_eq!(db.get_birthday_channel(1).unwrap(), None);
        db.set_birthday_channel(1, 100).unwrap();
        db.set_birthday_channel(1, 200).unwrap();
        assert_eq!(db.get_birthday_channel(1).unwrap(), Some(200));
        assert!(db.remove_birthday_channel(1).unwrap());
        assert!(!db.remove_birthday_channel(1).unwrap());
    }

    #[test]
    fn test_member_count_channels() {
        let db = test_db();
        db.set_member_count_channel(1, 100).unwrap();
        db.set_member_count_channel(2, 200).unwrap();
        let mut channels = db.member_count_channels().unwrap();
        channels.sort();
        assert_eq!(channels, vec![(1, 100), (2, 200)]);

        assert!(db.remove_member_count_channel(1).unwrap());
        assert_eq!(db.member_count_channels().unwrap(), vec![(2, 200)]);
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let db = test_db();
        db.run_blocking(|db| db.set_birthday(3, 30, "10-10")).await.unwrap();
        let list = db.run_blocking(|db| db.list_birthdays(3)).await.unwrap();
        assert_eq!(list.len(), 1);
    }
}
