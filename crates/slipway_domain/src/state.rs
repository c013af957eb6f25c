use crate::normalize::{RateLimitSnapshot, ThreadTokenUsage, TurnPlan};
use crate::worktree_prompt::WorktreePromptState;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(pub(crate) String);

impl WorkspaceId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub(crate) String);

impl ThreadId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub(crate) String);

impl TurnId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Marker rows appended to a thread's transcript by turn events.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreadEntry {
    TurnError { message: String },
    ContextCompacted { turn_id: TurnId },
}

/// Everything the app tracks about one agent thread.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ThreadRecord {
    pub id: ThreadId,
    pub workspace_id: WorkspaceId,
    pub name: Option<String>,
    pub processing: bool,
    pub reviewing: bool,
    pub active_turn_id: Option<TurnId>,
    pub updated_at_unix_ms: u64,
    pub plan: Option<TurnPlan>,
    pub token_usage: Option<ThreadTokenUsage>,
    pub entries: Vec<ThreadEntry>,
}

impl ThreadRecord {
    pub fn new(id: ThreadId, workspace_id: WorkspaceId) -> Self {
        Self {
            id,
            workspace_id,
            name: None,
            processing: false,
            reviewing: false,
            active_turn_id: None,
            updated_at_unix_ms: 0,
            plan: None,
            token_usage: None,
            entries: Vec::new(),
        }
    }
}

/// Root application state. Mutated only through [`AppState::apply`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppState {
    pub threads: HashMap<ThreadId, ThreadRecord>,
    /// Names the user picked explicitly. A thread with an entry here never
    /// gets renamed from event previews.
    pub custom_thread_names: HashMap<ThreadId, String>,
    pub rate_limits: HashMap<WorkspaceId, RateLimitSnapshot>,
    /// Threads whose next `turn.started` must be interrupted instead of
    /// marked processing.
    pub pending_interrupts: HashSet<ThreadId>,
    pub worktree_setup_scripts: HashMap<WorkspaceId, String>,
    pub worktree_prompt: Option<WorktreePromptState>,
    pub last_error: Option<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread(&self, id: &ThreadId) -> Option<&ThreadRecord> {
        self.threads.get(id)
    }

    pub fn thread_display_name(&self, id: &ThreadId) -> Option<&str> {
        if let Some(name) = self.custom_thread_names.get(id) {
            return Some(name.as_str());
        }
        self.threads.get(id)?.name.as_deref()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedThreadName {
    pub thread_id: String,
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedSetupScript {
    pub workspace_id: String,
    pub script: String,
}

/// Durable slice of [`AppState`] loaded from the store at startup.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedAppState {
    pub thread_names: Vec<PersistedThreadName>,
    pub setup_scripts: Vec<PersistedSetupScript>,
}
