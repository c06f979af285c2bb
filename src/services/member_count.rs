use crate::db::Database;

/// Channel name showing a guild's member count.
pub fn member_count_label(count: u64) -> String {
    format!("👥 Membros: {}", count)
}

#[derive(Clone)]
pub struct MemberCountService {
    db: Database,
}

impl MemberCountService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn set_channel(&self, guild_id: u64, channel_id: u64) -> anyhow::Result<()> {
        self.db
            .run_blocking(move |db| db.set_member_count_channel(guild_id, channel_id))
            .await
    }

    pub async fn remove_channel(&self, guild_id: u64) -> anyhow::Result<bool> {
        self.db
            .run_blocking(move |db| db.remove_member_count_channel(guild_id))
            .await
    }

    pub async fn channels(&self) -> anyhow::Result<Vec<(u64, u64)>> {
        self.db.run_blocking(|db| db.member_count_channels()).await
    }
}
