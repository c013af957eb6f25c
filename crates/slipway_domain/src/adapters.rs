use crate::PersistedAppState;
use std::path::PathBuf;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreatedWorktree {
    pub branch_name: String,
    pub worktree_path: PathBuf,
}

/// Host services the engine drives. Implementations run on blocking
/// threads, so parameters are owned and errors cross as plain strings.
pub trait SessionService: Send + Sync {
    fn load_app_state(&self) -> Result<PersistedAppState, String>;

    fn set_custom_thread_name(
        &self,
        thread_id: String,
        name: Option<String>,
    ) -> Result<(), String>;

    fn set_worktree_setup_script(
        &self,
        workspace_id: String,
        script: Option<String>,
    ) -> Result<(), String>;

    fn record_thread_activity(
        &self,
        workspace_id: String,
        thread_id: String,
        timestamp_unix_ms: u64,
    ) -> Result<(), String>;

    fn interrupt_turn(
        &self,
        workspace_id: String,
        thread_id: String,
        turn_id: String,
    ) -> Result<(), String>;

    fn create_worktree(
        &self,
        workspace_id: String,
        branch_name: String,
    ) -> Result<CreatedWorktree, String>;
}
