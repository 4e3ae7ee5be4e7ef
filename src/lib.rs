pub mod config;
pub mod error;
pub mod ipc;
pub mod notifications;
pub mod stats;
pub mod storage;
pub mod tasks;
pub mod timeclock;

use std::sync::Arc;

use config::DaemonConfig;
use notifications::NotificationDispatcher;
use stats::StatsAggregator;
use storage::Storage;
use tasks::TaskManager;
use timeclock::TimeEntryEngine;

/// Shared application state passed to every RPC handler and background job.
///
/// Components receive their store handle at construction; nothing reaches
/// for a global connection.
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub storage: Arc<Storage>,
    pub tasks: TaskManager,
    pub timeclock: TimeEntryEngine,
    pub notifier: NotificationDispatcher,
    pub stats: StatsAggregator,
    pub started_at: std::time::Instant,
}

impl AppContext {
    pub fn new(config: Arc<DaemonConfig>, storage: Arc<Storage>) -> Self {
        let pool = storage.pool();
        let notifier = NotificationDispatcher::new(pool.clone());
        Self {
            config,
            storage,
            tasks: TaskManager::new(pool.clone(), notifier.clone()),
            timeclock: TimeEntryEngine::new(pool.clone()),
            notifier,
            stats: StatsAggregator::new(pool),
            started_at: std::time::Instant::now(),
        }
    }
}
