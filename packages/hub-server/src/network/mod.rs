//! Networking: server lifecycle, middleware, shutdown control, handlers,
//! and the background sweep.

pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;
pub mod sweeper;

pub use handlers::AppState;
pub use module::HubModule;
pub use shutdown::{HealthState, ShutdownController};
