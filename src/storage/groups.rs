use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::event::ChatKind;
use crate::storage::Storage;

/// Cached knowledge of a group chat. Created on first sight, updated when the
/// chat's title or type drifts, never deleted here.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
    pub id: i64,
    pub kind: ChatKind,
    pub title: String,
}

/// Storage operations the router needs for group bookkeeping.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Record that `user_id` was seen in `group_id`. Idempotent.
    async fn add_user_to_group(&self, user_id: u64, group_id: i64) -> Result<()>;

    /// Fetch a cached group record; `Ok(None)` means the group is not yet known.
    async fn get_group(&self, group_id: i64) -> Result<Option<GroupRecord>>;

    async fn create_group(&self, group: &GroupRecord) -> Result<()>;

    async fn update_group(&self, group: &GroupRecord) -> Result<()>;
}

#[async_trait]
impl GroupStore for Storage {
    async fn add_user_to_group(&self, user_id: u64, group_id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?1, ?2)",
            rusqlite::params![user_id as i64, group_id],
        )
        .context("Failed to insert user/group association")?;
        Ok(())
    }

    async fn get_group(&self, group_id: i64) -> Result<Option<GroupRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT id, chat_type, title FROM groups WHERE id = ?1")
            .context("Failed to prepare group query")?;
        let mut rows = stmt
            .query_map(rusqlite::params![group_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("Failed to query group")?;
        match rows.next() {
            Some(Ok((id, chat_type, title))) => {
                let kind = ChatKind::parse(&chat_type)
                    .with_context(|| format!("Unknown chat type in groups table: {}", chat_type))?;
                Ok(Some(GroupRecord { id, kind, title }))
            }
            Some(Err(e)) => Err(e).context("Failed to read group row"),
            None => Ok(None),
        }
    }

    async fn create_group(&self, group: &GroupRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO groups (id, chat_type, title) VALUES (?1, ?2, ?3)",
            rusqlite::params![group.id, group.kind.as_str(), group.title],
        )
        .context("Failed to insert group")?;
        Ok(())
    }

    async fn update_group(&self, group: &GroupRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE groups SET chat_type = ?1, title = ?2, updated_at = datetime('now')
             WHERE id = ?3",
            rusqlite::params![group.kind.as_str(), group.title, group.id],
        )
        .context("Failed to update group")?;
        Ok(())
    }
}
