use crate::app_server::AppServerEvent;
use crate::normalize::{RateLimitSnapshot, ThreadTokenUsage, TurnPlan};
use crate::{PersistedAppState, ThreadId, TurnId, WorkspaceId};
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub enum Action {
    AppStarted,
    AppStateLoaded {
        snapshot: PersistedAppState,
    },
    AppStateLoadFailed {
        message: String,
    },

    AppServerEventReceived {
        workspace_id: WorkspaceId,
        event: AppServerEvent,
    },

    EnsureThread {
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
    },
    SetThreadTimestamp {
        thread_id: ThreadId,
        timestamp_unix_ms: u64,
    },
    SetThreadName {
        thread_id: ThreadId,
        name: String,
    },
    SetCustomThreadName {
        thread_id: ThreadId,
        name: Option<String>,
    },
    SetThreadProcessing {
        thread_id: ThreadId,
        processing: bool,
    },
    SetThreadReviewing {
        thread_id: ThreadId,
        reviewing: bool,
    },
    SetActiveTurn {
        thread_id: ThreadId,
        turn_id: Option<TurnId>,
    },
    SetThreadPlan {
        thread_id: ThreadId,
        plan: TurnPlan,
    },
    SetThreadTokenUsage {
        thread_id: ThreadId,
        usage: ThreadTokenUsage,
    },
    SetRateLimits {
        workspace_id: WorkspaceId,
        limits: RateLimitSnapshot,
    },
    PushThreadError {
        thread_id: ThreadId,
        message: String,
    },
    AppendContextCompacted {
        thread_id: ThreadId,
        turn_id: TurnId,
    },

    RequestTurnInterrupt {
        thread_id: ThreadId,
    },

    OpenWorktreePrompt {
        workspace_id: WorkspaceId,
        workspace_name: String,
    },
    WorktreeBranchChanged {
        branch: String,
    },
    WorktreeSetupScriptChanged {
        script: String,
    },
    SaveWorktreeSetupScript,
    WorktreeSetupScriptSaved {
        workspace_id: WorkspaceId,
        script: Option<String>,
    },
    WorktreeSetupScriptSaveFailed {
        workspace_id: WorkspaceId,
        message: String,
    },
    ConfirmWorktreePrompt,
    CancelWorktreePrompt,
    WorktreeCreated {
        workspace_id: WorkspaceId,
        branch_name: String,
        worktree_path: PathBuf,
    },
    WorktreeCreateFailed {
        workspace_id: WorkspaceId,
        message: String,
    },

    ClearError,
}
