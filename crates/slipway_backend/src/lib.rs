mod agent_rpc;
mod services;
mod sqlite_store;
mod worktree;

pub use services::LocalSessionService;
pub use sqlite_store::SqliteStore;
