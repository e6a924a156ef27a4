use bson::{DateTime, doc};
use mongodb::Database;
use stagecast_db::models::Room;
use tracing::debug;

use super::base::{BaseDao, DaoError, DaoResult};

pub struct RoomDao {
    base: BaseDao<Room>,
}

impl RoomDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Room::COLLECTION),
        }
    }

    pub async fn get(&self, id: &str) -> DaoResult<Option<Room>> {
        self.base.find_one(doc! { "_id": id }).await
    }

    pub async fn create(&self, id: &str, name: &str) -> DaoResult<Room> {
        let now = DateTime::now();
        let room = Room {
            id: id.to_string(),
            name: name.to_string(),
            is_active: false,
            hls_url: None,
            created_at: now,
            updated_at: now,
        };
        self.base.insert_one(&room).await?;
        debug!(room_id = id, "room record created");
        Ok(room)
    }

    /// Fetches the room record, creating it when a client joins by direct
    /// URL before anyone called `POST /api/rooms`.
    pub async fn ensure(&self, id: &str, name: &str) -> DaoResult<Room> {
        if let Some(room) = self.get(id).await? {
            return Ok(room);
        }
        match self.create(id, name).await {
            Ok(room) => Ok(room),
            // lost a concurrent insert race; the existing record wins
            Err(DaoError::Mongo(_)) => self.get(id).await?.ok_or(DaoError::NotFound),
            Err(e) => Err(e),
        }
    }

    pub async fn list(&self) -> DaoResult<Vec<Room>> {
        self.base
            .find_many(doc! {}, Some(doc! { "created_at": -1 }))
            .await
    }

    /// Rooms currently emitting an HLS playlist.
    pub async fn list_streaming(&self) -> DaoResult<Vec<Room>> {
        self.base
            .find_many(
                doc! { "hls_url": { "$exists": true } },
                Some(doc! { "created_at": -1 }),
            )
            .await
    }

    pub async fn set_active(&self, id: &str, active: bool) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "is_active": active, "updated_at": DateTime::now() } },
            )
            .await
    }

    pub async fn update_hls_url(&self, id: &str, url: Option<&str>) -> DaoResult<bool> {
        let update = match url {
            Some(url) => doc! {
                "$set": { "hls_url": url, "updated_at": DateTime::now() },
            },
            None => doc! {
                "$set": { "updated_at": DateTime::now() },
                "$unset": { "hls_url": "" },
            },
        };
        self.base.update_one(doc! { "_id": id }, update).await
    }

    pub async fn delete(&self, id: &str) -> DaoResult<bool> {
        Ok(self.base.delete_many(doc! { "_id": id }).await? > 0)
    }

    /// Crash recovery: no room is live before the orchestrator starts.
    pub async fn deactivate_all(&self) -> DaoResult<u64> {
        self.base
            .update_many(
                doc! {},
                doc! { "$set": { "is_active": false }, "$unset": { "hls_url": "" } },
            )
            .await
    }
}
