pub const SCHEMA: &str = "
    -- Birthdays are kept per server: the same person may be celebrated in several
    CREATE TABLE IF NOT EXISTS birthdays (
        guild_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        date TEXT NOT NULL,
        PRIMARY KEY (guild_id, user_id)
    );
    CREATE INDEX IF NOT EXISTS idx_birthdays_date ON birthdays (date);

    CREATE TABLE IF NOT EXISTS birthday_channels (
        guild_id TEXT PRIMARY KEY,
        channel_id TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS member_count_channels (
        guild_id TEXT PRIMARY KEY,
        channel_id TEXT NOT NULL
    );
";
