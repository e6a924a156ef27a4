use mediasoup::worker::{Worker, WorkerId, WorkerSettings};
use mediasoup::worker_manager::WorkerManager;
use parking_lot::RwLock;
use stagecast_config::MediaSettings;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Pool of media workers with round-robin dispatch and crash supervision.
///
/// A worker that dies unexpectedly is replaced in-place at its pool index
/// before the next dispatch; the dead worker's id is forwarded on the
/// returned channel so rooms routed on it can be torn down.
pub struct WorkerPool {
    manager: WorkerManager,
    workers: RwLock<Vec<Worker>>,
    next: AtomicUsize,
    settings: MediaSettings,
    died_tx: mpsc::UnboundedSender<DeadWorker>,
}

struct DeadWorker {
    index: usize,
    worker_id: WorkerId,
}

impl WorkerPool {
    /// Boots `count` workers sequentially. Any failure aborts startup.
    pub async fn start(
        settings: &MediaSettings,
        count: usize,
    ) -> anyhow::Result<(Arc<Self>, mpsc::UnboundedReceiver<WorkerId>)> {
        let manager = WorkerManager::new();
        let (died_tx, mut died_rx) = mpsc::unbounded_channel();
        let (lost_tx, lost_rx) = mpsc::unbounded_channel();

        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let worker = spawn_worker(&manager, settings, index, died_tx.clone()).await?;
            info!(worker_id = %worker.id(), index, "media worker started");
            workers.push(worker);
        }

        let pool = Arc::new(Self {
            manager,
            workers: RwLock::new(workers),
            next: AtomicUsize::new(0),
            settings: settings.clone(),
            died_tx,
        });

        // Supervisor: one task reacting to every worker's death signal.
        let supervisor = Arc::clone(&pool);
        tokio::spawn(async move {
            while let Some(dead) = died_rx.recv().await {
                warn!(
                    worker_id = %dead.worker_id,
                    index = dead.index,
                    "media worker died, spawning replacement"
                );
                match spawn_worker(
                    &supervisor.manager,
                    &supervisor.settings,
                    dead.index,
                    supervisor.died_tx.clone(),
                )
                .await
                {
                    Ok(replacement) => {
                        info!(
                            worker_id = %replacement.id(),
                            index = dead.index,
                            "replacement media worker started"
                        );
                        supervisor.workers.write()[dead.index] = replacement;
                    }
                    Err(e) => {
                        error!(index = dead.index, %e, "failed to replace media worker");
                    }
                }
                let _ = lost_tx.send(dead.worker_id);
            }
        });

        Ok((pool, lost_rx))
    }

    /// Round-robin selection that never hands out a closed worker. `None`
    /// only while every slot is dead and replacements are still spawning.
    pub fn next_worker(&self) -> Option<Worker> {
        let workers = self.workers.read();
        let len = workers.len();
        for _ in 0..len {
            let idx = self.next.fetch_add(1, Ordering::Relaxed) % len;
            if !workers[idx].closed() {
                return Some(workers[idx].clone());
            }
        }
        None
    }

    pub fn worker_count(&self) -> usize {
        self.workers.read().len()
    }
}

async fn spawn_worker(
    manager: &WorkerManager,
    settings: &MediaSettings,
    index: usize,
    died_tx: mpsc::UnboundedSender<DeadWorker>,
) -> anyhow::Result<Worker> {
    let mut worker_settings = WorkerSettings::default();
    worker_settings.rtc_port_range = settings.rtc_min_port..=settings.rtc_max_port;

    let worker = manager
        .create_worker(worker_settings)
        .await
        .map_err(|e| anyhow::anyhow!("failed to create media worker {}: {}", index, e))?;

    let worker_id = worker.id();
    worker
        .on_dead(move |reason| {
            error!(?reason, %worker_id, "media worker died");
            let _ = died_tx.send(DeadWorker { index, worker_id });
        })
        .detach();

    Ok(worker)
}
