use crate::app_server::AppServerEvent;
use crate::normalize::{
    as_string, normalize_plan_update, normalize_rate_limits, normalize_token_usage,
    thread_timestamp,
};
use crate::worktree_prompt::WorktreePromptState;
use crate::{
    Action, AppState, Effect, PersistedAppState, ThreadEntry, ThreadId, ThreadRecord, TurnId,
    WorkspaceId,
};
use std::collections::hash_map::Entry;

mod name;

pub use name::derive_thread_name;

fn now_unix_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

fn thread_id_opt(raw: String) -> Option<ThreadId> {
    if raw.is_empty() {
        None
    } else {
        Some(ThreadId::new(raw))
    }
}

fn turn_id_opt(raw: String) -> Option<TurnId> {
    if raw.is_empty() {
        None
    } else {
        Some(TurnId::new(raw))
    }
}

impl AppState {
    pub fn apply(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::AppStarted => vec![Effect::LoadAppState],
            Action::AppStateLoaded { snapshot } => {
                self.load_persisted(snapshot);
                Vec::new()
            }
            Action::AppStateLoadFailed { message } => {
                self.last_error = Some(message);
                Vec::new()
            }

            Action::AppServerEventReceived {
                workspace_id,
                event,
            } => self.handle_app_server_event(workspace_id, event),

            Action::EnsureThread {
                workspace_id,
                thread_id,
            } => {
                self.ensure_thread(workspace_id, &thread_id);
                Vec::new()
            }
            Action::SetThreadTimestamp {
                thread_id,
                timestamp_unix_ms,
            } => {
                if let Some(record) = self.threads.get_mut(&thread_id) {
                    record.updated_at_unix_ms = timestamp_unix_ms;
                }
                Vec::new()
            }
            Action::SetThreadName { thread_id, name } => {
                if let Some(record) = self.threads.get_mut(&thread_id) {
                    record.name = Some(name);
                }
                Vec::new()
            }
            Action::SetCustomThreadName { thread_id, name } => {
                match &name {
                    Some(value) => {
                        self.custom_thread_names
                            .insert(thread_id.clone(), value.clone());
                    }
                    None => {
                        self.custom_thread_names.remove(&thread_id);
                    }
                }
                vec![Effect::SaveCustomThreadName { thread_id, name }]
            }
            Action::SetThreadProcessing {
                thread_id,
                processing,
            } => {
                if let Some(record) = self.threads.get_mut(&thread_id) {
                    record.processing = processing;
                }
                Vec::new()
            }
            Action::SetThreadReviewing {
                thread_id,
                reviewing,
            } => {
                if let Some(record) = self.threads.get_mut(&thread_id) {
                    record.reviewing = reviewing;
                }
                Vec::new()
            }
            Action::SetActiveTurn { thread_id, turn_id } => {
                if let Some(record) = self.threads.get_mut(&thread_id) {
                    record.active_turn_id = turn_id;
                }
                Vec::new()
            }
            Action::SetThreadPlan { thread_id, plan } => {
                if let Some(record) = self.threads.get_mut(&thread_id) {
                    record.plan = Some(plan);
                }
                Vec::new()
            }
            Action::SetThreadTokenUsage { thread_id, usage } => {
                if let Some(record) = self.threads.get_mut(&thread_id) {
                    record.token_usage = Some(usage);
                }
                Vec::new()
            }
            Action::SetRateLimits {
                workspace_id,
                limits,
            } => {
                self.rate_limits.insert(workspace_id, limits);
                Vec::new()
            }
            Action::PushThreadError { thread_id, message } => {
                if let Some(record) = self.threads.get_mut(&thread_id) {
                    record.entries.push(ThreadEntry::TurnError { message });
                }
                Vec::new()
            }
            Action::AppendContextCompacted { thread_id, turn_id } => {
                if let Some(record) = self.threads.get_mut(&thread_id) {
                    record
                        .entries
                        .push(ThreadEntry::ContextCompacted { turn_id });
                }
                Vec::new()
            }

            Action::RequestTurnInterrupt { thread_id } => self.request_turn_interrupt(thread_id),

            Action::OpenWorktreePrompt {
                workspace_id,
                workspace_name,
            } => {
                let saved = self.worktree_setup_scripts.get(&workspace_id).cloned();
                self.worktree_prompt =
                    Some(WorktreePromptState::open(workspace_id, workspace_name, saved));
                Vec::new()
            }
            Action::WorktreeBranchChanged { branch } => {
                if let Some(prompt) = self.worktree_prompt.as_mut()
                    && !prompt.busy
                {
                    prompt.branch = branch;
                }
                Vec::new()
            }
            Action::WorktreeSetupScriptChanged { script } => {
                if let Some(prompt) = self.worktree_prompt.as_mut()
                    && !prompt.busy
                    && !prompt.saving_script
                {
                    prompt.setup_script = script;
                }
                Vec::new()
            }
            Action::SaveWorktreeSetupScript => self.save_worktree_setup_script(),
            Action::WorktreeSetupScriptSaved {
                workspace_id,
                script,
            } => {
                match &script {
                    Some(value) => {
                        self.worktree_setup_scripts
                            .insert(workspace_id.clone(), value.clone());
                    }
                    None => {
                        self.worktree_setup_scripts.remove(&workspace_id);
                    }
                }
                if let Some(prompt) = self.worktree_prompt.as_mut()
                    && prompt.workspace_id == workspace_id
                {
                    prompt.saving_script = false;
                    prompt.saved_setup_script = script;
                }
                Vec::new()
            }
            Action::WorktreeSetupScriptSaveFailed {
                workspace_id,
                message,
            } => {
                if let Some(prompt) = self.worktree_prompt.as_mut()
                    && prompt.workspace_id == workspace_id
                {
                    prompt.saving_script = false;
                    prompt.error = Some(message);
                }
                Vec::new()
            }
            Action::ConfirmWorktreePrompt => self.confirm_worktree_prompt(),
            Action::CancelWorktreePrompt => {
                if self
                    .worktree_prompt
                    .as_ref()
                    .is_some_and(|prompt| !prompt.busy)
                {
                    self.worktree_prompt = None;
                }
                Vec::new()
            }
            Action::WorktreeCreated { workspace_id, .. } => {
                if self
                    .worktree_prompt
                    .as_ref()
                    .is_some_and(|prompt| prompt.workspace_id == workspace_id)
                {
                    self.worktree_prompt = None;
                }
                Vec::new()
            }
            Action::WorktreeCreateFailed {
                workspace_id,
                message,
            } => {
                if let Some(prompt) = self.worktree_prompt.as_mut()
                    && prompt.workspace_id == workspace_id
                {
                    prompt.busy = false;
                    prompt.error = Some(message);
                }
                Vec::new()
            }

            Action::ClearError => {
                self.last_error = None;
                Vec::new()
            }
        }
    }

    fn load_persisted(&mut self, snapshot: PersistedAppState) {
        for row in snapshot.thread_names {
            self.custom_thread_names
                .insert(ThreadId::new(row.thread_id), row.name);
        }
        for row in snapshot.setup_scripts {
            self.worktree_setup_scripts
                .insert(WorkspaceId::new(row.workspace_id), row.script);
        }
    }

    /// Every event handler goes through here before touching a thread, so an
    /// event can never mutate a record that does not exist.
    fn ensure_thread(
        &mut self,
        workspace_id: WorkspaceId,
        thread_id: &ThreadId,
    ) -> &mut ThreadRecord {
        match self.threads.entry(thread_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                entry.insert(ThreadRecord::new(thread_id.clone(), workspace_id))
            }
        }
    }

    fn handle_app_server_event(
        &mut self,
        workspace_id: WorkspaceId,
        event: AppServerEvent,
    ) -> Vec<Effect> {
        match event {
            AppServerEvent::ThreadStarted { thread } => {
                self.on_thread_started(workspace_id, &thread)
            }
            AppServerEvent::TurnStarted { thread_id, turn_id } => {
                let Some(thread_id) = thread_id_opt(thread_id) else {
                    return Vec::new();
                };
                self.on_turn_started(workspace_id, thread_id, turn_id_opt(turn_id))
            }
            AppServerEvent::TurnCompleted { thread_id, .. } => {
                let Some(thread_id) = thread_id_opt(thread_id) else {
                    return Vec::new();
                };
                self.pending_interrupts.remove(&thread_id);
                if let Some(record) = self.threads.get_mut(&thread_id) {
                    record.processing = false;
                    record.active_turn_id = None;
                }
                Vec::new()
            }
            AppServerEvent::TurnPlanUpdated {
                thread_id,
                turn_id,
                explanation,
                plan,
            } => {
                let Some(thread_id) = thread_id_opt(thread_id) else {
                    return Vec::new();
                };
                let plan = normalize_plan_update(TurnId::new(turn_id), &explanation, &plan);
                let record = self.ensure_thread(workspace_id, &thread_id);
                record.plan = Some(plan);
                Vec::new()
            }
            AppServerEvent::ThreadTokenUsageUpdated {
                thread_id,
                token_usage,
            } => {
                let Some(thread_id) = thread_id_opt(thread_id) else {
                    return Vec::new();
                };
                let usage = normalize_token_usage(&token_usage);
                let record = self.ensure_thread(workspace_id, &thread_id);
                record.token_usage = Some(usage);
                Vec::new()
            }
            AppServerEvent::AccountRateLimitsUpdated { rate_limits } => {
                self.rate_limits
                    .insert(workspace_id, normalize_rate_limits(&rate_limits));
                Vec::new()
            }
            AppServerEvent::TurnFailed {
                thread_id, error, ..
            } => {
                let Some(thread_id) = thread_id_opt(thread_id) else {
                    return Vec::new();
                };
                if error.will_retry {
                    return Vec::new();
                }
                let message = if error.message.is_empty() {
                    "Turn failed.".to_owned()
                } else {
                    format!("Turn failed: {}", error.message)
                };
                let record = self.ensure_thread(workspace_id, &thread_id);
                record.processing = false;
                record.reviewing = false;
                record.active_turn_id = None;
                record.entries.push(ThreadEntry::TurnError { message });
                vec![Effect::NotifyMessageActivity { thread_id }]
            }
            AppServerEvent::ContextCompacted { thread_id, turn_id } => {
                let Some(thread_id) = thread_id_opt(thread_id) else {
                    return Vec::new();
                };
                self.on_context_compacted(workspace_id, thread_id, turn_id_opt(turn_id))
            }
        }
    }

    fn on_thread_started(
        &mut self,
        workspace_id: WorkspaceId,
        thread: &serde_json::Value,
    ) -> Vec<Effect> {
        let raw_id = as_string(thread.get("id"));
        if raw_id.is_empty() {
            return Vec::new();
        }
        let thread_id = ThreadId::new(raw_id);

        let payload_ms = thread_timestamp(thread);
        let timestamp_unix_ms = if payload_ms > 0 {
            payload_ms
        } else {
            now_unix_ms()
        };
        let derived_name = if self.custom_thread_names.contains_key(&thread_id) {
            None
        } else {
            derive_thread_name(&as_string(thread.get("preview")))
        };

        let record = self.ensure_thread(workspace_id.clone(), &thread_id);
        record.updated_at_unix_ms = timestamp_unix_ms;
        if let Some(name) = derived_name {
            record.name = Some(name);
        }

        vec![
            Effect::RecordThreadActivity {
                workspace_id,
                thread_id: thread_id.clone(),
                timestamp_unix_ms,
            },
            Effect::NotifyMessageActivity { thread_id },
        ]
    }

    fn on_turn_started(
        &mut self,
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
        turn_id: Option<TurnId>,
    ) -> Vec<Effect> {
        self.ensure_thread(workspace_id.clone(), &thread_id);

        // An interrupt requested before the turn existed fires now, once,
        // and the thread never shows as processing.
        if self.pending_interrupts.remove(&thread_id) {
            let Some(turn_id) = turn_id else {
                return Vec::new();
            };
            return vec![Effect::InterruptTurn {
                workspace_id,
                thread_id,
                turn_id,
            }];
        }

        if let Some(record) = self.threads.get_mut(&thread_id) {
            record.processing = true;
            if let Some(turn_id) = turn_id {
                record.active_turn_id = Some(turn_id);
            }
        }
        Vec::new()
    }

    fn on_context_compacted(
        &mut self,
        workspace_id: WorkspaceId,
        thread_id: ThreadId,
        turn_id: Option<TurnId>,
    ) -> Vec<Effect> {
        self.ensure_thread(workspace_id.clone(), &thread_id);
        let Some(turn_id) = turn_id else {
            return Vec::new();
        };
        if let Some(record) = self.threads.get_mut(&thread_id) {
            record
                .entries
                .push(ThreadEntry::ContextCompacted { turn_id });
        }
        vec![
            Effect::RecordThreadActivity {
                workspace_id,
                thread_id: thread_id.clone(),
                timestamp_unix_ms: now_unix_ms(),
            },
            Effect::NotifyMessageActivity { thread_id },
        ]
    }

    fn request_turn_interrupt(&mut self, thread_id: ThreadId) -> Vec<Effect> {
        let Some(record) = self.threads.get(&thread_id) else {
            return Vec::new();
        };
        if let Some(turn_id) = record.active_turn_id.clone() {
            return vec![Effect::InterruptTurn {
                workspace_id: record.workspace_id.clone(),
                thread_id,
                turn_id,
            }];
        }
        self.pending_interrupts.insert(thread_id);
        Vec::new()
    }

    fn save_worktree_setup_script(&mut self) -> Vec<Effect> {
        let Some(prompt) = self.worktree_prompt.as_mut() else {
            return Vec::new();
        };
        if !prompt.can_save_script() {
            return Vec::new();
        }
        prompt.saving_script = true;
        prompt.error = None;
        vec![Effect::SaveWorktreeSetupScript {
            workspace_id: prompt.workspace_id.clone(),
            script: prompt.normalized_script().map(str::to_owned),
        }]
    }

    fn confirm_worktree_prompt(&mut self) -> Vec<Effect> {
        let Some(prompt) = self.worktree_prompt.as_mut() else {
            return Vec::new();
        };
        if !prompt.can_confirm() {
            return Vec::new();
        }
        prompt.busy = true;
        prompt.error = None;
        vec![Effect::CreateWorktree {
            workspace_id: prompt.workspace_id.clone(),
            branch_name: prompt.branch.trim().to_owned(),
        }]
    }
}
