mod app_server;
pub use app_server::{AppServerEvent, AppServerTurnError};

mod adapters;
pub use adapters::{CreatedWorktree, SessionService};

mod normalize;
pub use normalize::{
    PlanStep, PlanStepStatus, RateLimitSnapshot, RateLimitWindow, ThreadTokenUsage, TokenCounts,
    TurnPlan, as_string, normalize_plan_update, normalize_rate_limits, normalize_token_usage,
    thread_timestamp,
};

mod worktree_prompt;
pub use worktree_prompt::{
    PromptIntent, PromptKey, WORKTREE_BRANCH_LABEL, WORKTREE_CANCEL_LABEL, WORKTREE_CONFIRM_LABEL,
    WORKTREE_PROMPT_TITLE, WORKTREE_SCRIPT_HINT, WORKTREE_SCRIPT_LABEL,
    WORKTREE_SCRIPT_PLACEHOLDER, WorktreePromptState,
};

mod actions;
pub use actions::Action;
mod effects;
pub use effects::Effect;

mod state;
pub use state::*;

mod reducer;
pub use reducer::derive_thread_name;

pub const THREAD_NAME_MAX_CHARS: usize = 38;
