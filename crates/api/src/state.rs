use mongodb::Database;
use stagecast_config::Settings;
use stagecast_services::{
    dao::{participant::ParticipantDao, room::RoomDao},
    media::{endpoints::EndpointRegistry, orchestrator::Orchestrator, worker_pool::WorkerPool},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::ws::storage::WsStorage;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub settings: Settings,
    pub rooms: Arc<RoomDao>,
    pub participants: Arc<ParticipantDao>,
    pub orchestrator: Arc<Orchestrator>,
    pub ws_storage: Arc<WsStorage>,
}

impl AppState {
    pub async fn new(db: Database, settings: Settings) -> anyhow::Result<Self> {
        let rooms = Arc::new(RoomDao::new(&db));
        let participants = Arc::new(ParticipantDao::new(&db));

        // Crash recovery: the mirror only ever reflects live state.
        let deactivated = rooms.deactivate_all().await?;
        let dropped = participants.truncate().await?;
        info!(deactivated, dropped, "store mirror reset");

        let worker_count = settings.media.worker_count(settings.app.env);
        let (worker_pool, lost_workers) = WorkerPool::start(&settings.media, worker_count).await?;
        info!(workers = worker_pool.worker_count(), "worker pool ready");

        let endpoints = EndpointRegistry::new(&settings.media);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(
            worker_pool,
            endpoints,
            Arc::clone(&rooms),
            Arc::clone(&participants),
            &settings.hls,
            events_tx,
        );
        orchestrator.watch_worker_deaths(lost_workers);

        let ws_storage = Arc::new(WsStorage::new());
        crate::ws::dispatcher::spawn_event_pump(Arc::clone(&ws_storage), events_rx);

        Ok(Self {
            db,
            settings,
            rooms,
            participants,
            orchestrator,
            ws_storage,
        })
    }
}
