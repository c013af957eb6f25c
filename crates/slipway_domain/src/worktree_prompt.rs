use crate::WorkspaceId;

pub const WORKTREE_PROMPT_TITLE: &str = "New worktree agent";
pub const WORKTREE_BRANCH_LABEL: &str = "Branch name";
pub const WORKTREE_SCRIPT_LABEL: &str = "Worktree setup script";
pub const WORKTREE_SCRIPT_HINT: &str =
    "Runs once in a dedicated terminal after each new worktree is created.";
pub const WORKTREE_SCRIPT_PLACEHOLDER: &str = "pnpm install";
pub const WORKTREE_CANCEL_LABEL: &str = "Cancel";
pub const WORKTREE_CONFIRM_LABEL: &str = "Create";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PromptKey {
    Escape,
    Enter,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PromptIntent {
    Cancel,
    Confirm,
}

/// Modal form model for creating a worktree agent. Lives in [`crate::AppState`]
/// while the dialog is open; every value a rendering shell needs is derived
/// here so the shell stays dumb.
#[derive(Clone, Debug, PartialEq)]
pub struct WorktreePromptState {
    pub workspace_id: WorkspaceId,
    pub workspace_name: String,
    pub branch: String,
    pub setup_script: String,
    pub saved_setup_script: Option<String>,
    pub busy: bool,
    pub saving_script: bool,
    pub error: Option<String>,
}

impl WorktreePromptState {
    pub fn open(
        workspace_id: WorkspaceId,
        workspace_name: String,
        saved_setup_script: Option<String>,
    ) -> Self {
        Self {
            workspace_id,
            workspace_name,
            branch: String::new(),
            setup_script: saved_setup_script.clone().unwrap_or_default(),
            saved_setup_script,
            busy: false,
            saving_script: false,
            error: None,
        }
    }

    pub fn subtitle(&self) -> String {
        format!("Create a worktree under \"{}\".", self.workspace_name)
    }

    /// The script as it would be saved: `None` when blank, otherwise the
    /// original untrimmed text.
    pub fn normalized_script(&self) -> Option<&str> {
        if self.setup_script.trim().is_empty() {
            None
        } else {
            Some(self.setup_script.as_str())
        }
    }

    pub fn script_changed(&self) -> bool {
        self.normalized_script() != self.saved_setup_script.as_deref()
    }

    pub fn can_confirm(&self) -> bool {
        !self.busy && !self.branch.trim().is_empty()
    }

    pub fn can_save_script(&self) -> bool {
        !self.busy && !self.saving_script && self.script_changed()
    }

    pub fn save_button_label(&self) -> &'static str {
        if self.saving_script {
            "Saving…"
        } else if self.script_changed() {
            "Save script"
        } else {
            "Saved"
        }
    }

    pub fn branch_input_disabled(&self) -> bool {
        self.busy
    }

    pub fn script_input_disabled(&self) -> bool {
        self.busy || self.saving_script
    }

    pub fn key_intent(&self, key: PromptKey) -> Option<PromptIntent> {
        if self.busy {
            return None;
        }
        match key {
            PromptKey::Escape => Some(PromptIntent::Cancel),
            PromptKey::Enter => Some(PromptIntent::Confirm),
        }
    }

    pub fn backdrop_intent(&self) -> Option<PromptIntent> {
        if self.busy {
            None
        } else {
            Some(PromptIntent::Cancel)
        }
    }
}
