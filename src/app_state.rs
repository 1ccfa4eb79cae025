use sqlx::PgPool;
use std::sync::Arc;

use crate::db::jobs::PgJobStore;
use crate::services::{queue::JobQueue, storage::R2Client};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jobs: Arc<PgJobStore>,
    pub storage: Arc<R2Client>,
    pub queue: Arc<JobQueue>,
}

impl AppState {
    pub fn new(db: PgPool, storage: R2Client, queue: JobQueue) -> Self {
        let jobs = Arc::new(PgJobStore::new(db.clone()));
        Self {
            db,
            jobs,
            storage: Arc::new(storage),
            queue: Arc::new(queue),
        }
    }
}
