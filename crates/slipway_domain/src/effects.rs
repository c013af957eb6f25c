use crate::{ThreadId, TurnId, WorkspaceId};

/// Side effects requested by [`crate::AppState::apply`]. The engine executes
/// them in order; none of them feeds an error back into the reducer.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    LoadAppState,
    SaveCustomThreadName {
        thread_id: ThreadId,
        name: Option<String>,
    },
    SaveWorktreeSetupScript {
        workspace_id: WorkspaceId,
        script: Option<String>,
    },
    RecordThreadActivity {
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
        timestamp_unix_ms: u64,
    },
    NotifyMessageActivity {
        thread_id: ThreadId,
    },
    /// Fire-and-forget: delivery failures are logged and dropped.
    InterruptTurn {
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
        turn_id: TurnId,
    },
    CreateWorktree {
        workspace_id: WorkspaceId,
        branch_name: String,
    },
}
