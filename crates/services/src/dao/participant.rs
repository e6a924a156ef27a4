use bson::doc;
use mongodb::Database;
use stagecast_db::models::ParticipantRecord;
use tracing::debug;

use super::base::{BaseDao, DaoResult};

/// Mirror of live participant state. The in-memory model is authoritative;
/// every write here is best-effort from the caller's point of view.
pub struct ParticipantDao {
    base: BaseDao<ParticipantRecord>,
}

impl ParticipantDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, ParticipantRecord::COLLECTION),
        }
    }

    pub async fn insert(&self, record: &ParticipantRecord) -> DaoResult<()> {
        self.base.insert_one(record).await?;
        debug!(participant_id = %record.id, room_id = %record.room_id, "participant mirrored");
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> DaoResult<bool> {
        Ok(self.base.delete_many(doc! { "_id": id }).await? > 0)
    }

    pub async fn remove_by_room(&self, room_id: &str) -> DaoResult<u64> {
        self.base.delete_many(doc! { "room_id": room_id }).await
    }

    pub async fn set_media_flags(
        &self,
        id: &str,
        has_audio: bool,
        has_video: bool,
    ) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "has_audio": has_audio, "has_video": has_video } },
            )
            .await
    }

    /// Crash recovery: the collection only mirrors live connections.
    pub async fn truncate(&self) -> DaoResult<u64> {
        self.base.delete_many(doc! {}).await
    }
}
