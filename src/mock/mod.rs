//! Mock dev server: registry, dispatch middleware, watcher and proxy.

pub mod middleware;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod watcher;

pub use middleware::{mock_dispatch, MockDispatchState};
pub use registry::{
    MockContext, MockEntry, MockHandler, MockOutcome, MockRegistry, ReloadSummary, StaticMock,
};
pub use server::{run_server, Shutdown};
pub use watcher::start_mock_watcher;
