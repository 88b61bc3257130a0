use std::sync::Arc;

use ar_config::AppConfig;
use ar_queue::JobQueue;
use ar_store::ProblemStore;

use crate::coordinator::LifecycleCoordinator;
use crate::streamer::ResultStreamer;

/// Shared handles injected into the routes. Constructed once at startup;
/// no module-level singletons.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProblemStore>,
    pub queue: Arc<dyn JobQueue>,
    pub coordinator: Arc<LifecycleCoordinator>,
    pub streamer: ResultStreamer,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ProblemStore>,
        queue: Arc<dyn JobQueue>,
        streamer: ResultStreamer,
        config: Arc<AppConfig>,
    ) -> Self {
        let coordinator = Arc::new(LifecycleCoordinator::new(store.clone(), queue.clone()));
        Self {
            store,
            queue,
            coordinator,
            streamer,
            config,
        }
    }
}
