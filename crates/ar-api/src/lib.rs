pub mod coordinator;
pub mod error;
pub mod routes;
pub mod state;
pub mod streamer;

pub use coordinator::{
    run_fanout_bridge, run_reconciliation_sweep, LifecycleCoordinator, ListenerSettings,
    ResultListener,
};
pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
pub use streamer::{ResultStreamer, Subscription};
