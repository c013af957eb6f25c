use anyhow::Context as _;
use slipway_domain::{
    Action, AppServerEvent, AppState, Effect, SessionService, ThreadId, WorkspaceId,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub async fn current_rev(&self) -> anyhow::Result<u64> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::GetRev { reply: tx })
            .await
            .context("engine unavailable")?;
        rx.await.context("engine stopped")?
    }

    pub async fn state(&self) -> anyhow::Result<AppState> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::GetState { reply: tx })
            .await
            .context("engine unavailable")?;
        rx.await.context("engine stopped")?
    }

    /// Applies `action` and every follow-up it triggers, returning the rev
    /// after the queue has drained.
    pub async fn dispatch(&self, action: Action) -> anyhow::Result<u64> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::DispatchAction {
                action: Box::new(action),
                reply: tx,
            })
            .await
            .context("engine unavailable")?;
        rx.await.context("engine stopped")
    }

    pub async fn app_server_event(
        &self,
        workspace_id: WorkspaceId,
        event: AppServerEvent,
    ) -> anyhow::Result<u64> {
        self.dispatch(Action::AppServerEventReceived {
            workspace_id,
            event,
        })
        .await
    }
}

pub enum EngineCommand {
    GetRev {
        reply: oneshot::Sender<anyhow::Result<u64>>,
    },
    GetState {
        reply: oneshot::Sender<anyhow::Result<AppState>>,
    },
    DispatchAction {
        action: Box<Action>,
        reply: oneshot::Sender<u64>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    StateUpdated { rev: u64 },
    MessageActivity { thread_id: ThreadId },
}

pub struct Engine {
    state: AppState,
    rev: u64,
    services: Arc<dyn SessionService>,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    pub fn start(
        services: Arc<dyn SessionService>,
    ) -> (EngineHandle, broadcast::Sender<EngineEvent>) {
        let (tx, mut rx) = mpsc::channel::<EngineCommand>(256);
        let (events, _) = broadcast::channel::<EngineEvent>(256);

        let mut engine = Self {
            state: AppState::new(),
            rev: 0,
            services,
            events: events.clone(),
        };

        tokio::spawn(async move {
            engine.bootstrap().await;
            while let Some(cmd) = rx.recv().await {
                engine.handle(cmd).await;
            }
        });

        (EngineHandle { tx }, events)
    }

    async fn bootstrap(&mut self) {
        self.process_action_queue(Action::AppStarted).await;
    }

    async fn handle(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::GetRev { reply } => {
                let _ = reply.send(Ok(self.rev));
            }
            EngineCommand::GetState { reply } => {
                let _ = reply.send(Ok(self.state.clone()));
            }
            EngineCommand::DispatchAction { action, reply } => {
                self.process_action_queue(*action).await;
                let _ = reply.send(self.rev);
            }
        }
    }

    async fn process_action_queue(&mut self, initial: Action) {
        let mut actions = VecDeque::from([initial]);
        let mut effects = VecDeque::<Effect>::new();

        while let Some(action) = actions.pop_front() {
            self.rev = self.rev.saturating_add(1);

            let new_effects = self.state.apply(action);
            self.publish_state_updated();

            effects.extend(new_effects);

            while let Some(effect) = effects.pop_front() {
                match self.run_effect(effect).await {
                    Ok(mut followups) => actions.append(&mut followups),
                    Err(err) => {
                        tracing::error!(error = %err, "effect failed");
                    }
                }
            }
        }
    }

    async fn run_effect(&mut self, effect: Effect) -> anyhow::Result<VecDeque<Action>> {
        match effect {
            Effect::LoadAppState => {
                let services = self.services.clone();
                let loaded = tokio::task::spawn_blocking(move || services.load_app_state())
                    .await
                    .ok()
                    .unwrap_or_else(|| Err("failed to join load task".to_owned()));
                let action = match loaded {
                    Ok(snapshot) => Action::AppStateLoaded { snapshot },
                    Err(message) => Action::AppStateLoadFailed { message },
                };
                Ok(VecDeque::from([action]))
            }
            Effect::SaveCustomThreadName { thread_id, name } => {
                let services = self.services.clone();
                let saved = tokio::task::spawn_blocking(move || {
                    services.set_custom_thread_name(thread_id.as_str().to_owned(), name)
                })
                .await
                .ok()
                .unwrap_or_else(|| Err("failed to join save name task".to_owned()));
                if let Err(message) = saved {
                    return Err(anyhow::anyhow!(message));
                }
                Ok(VecDeque::new())
            }
            Effect::SaveWorktreeSetupScript {
                workspace_id,
                script,
            } => {
                let services = self.services.clone();
                let wid = workspace_id.clone();
                let script_to_save = script.clone();
                let saved = tokio::task::spawn_blocking(move || {
                    services.set_worktree_setup_script(wid.as_str().to_owned(), script_to_save)
                })
                .await
                .ok()
                .unwrap_or_else(|| Err("failed to join save script task".to_owned()));
                let action = match saved {
                    Ok(()) => Action::WorktreeSetupScriptSaved {
                        workspace_id,
                        script,
                    },
                    Err(message) => Action::WorktreeSetupScriptSaveFailed {
                        workspace_id,
                        message,
                    },
                };
                Ok(VecDeque::from([action]))
            }
            Effect::RecordThreadActivity {
                workspace_id,
                thread_id,
                timestamp_unix_ms,
            } => {
                let services = self.services.clone();
                let recorded = tokio::task::spawn_blocking(move || {
                    services.record_thread_activity(
                        workspace_id.as_str().to_owned(),
                        thread_id.as_str().to_owned(),
                        timestamp_unix_ms,
                    )
                })
                .await
                .ok()
                .unwrap_or_else(|| Err("failed to join record activity task".to_owned()));
                if let Err(message) = recorded {
                    return Err(anyhow::anyhow!(message));
                }
                Ok(VecDeque::new())
            }
            Effect::NotifyMessageActivity { thread_id } => {
                let _ = self.events.send(EngineEvent::MessageActivity { thread_id });
                Ok(VecDeque::new())
            }
            Effect::InterruptTurn {
                workspace_id,
                thread_id,
                turn_id,
            } => {
                // The turn may already be over on the agent side; nothing
                // waits on this and a miss is not an error.
                let services = self.services.clone();
                tokio::spawn(async move {
                    let result = tokio::task::spawn_blocking(move || {
                        services.interrupt_turn(
                            workspace_id.as_str().to_owned(),
                            thread_id.as_str().to_owned(),
                            turn_id.as_str().to_owned(),
                        )
                    })
                    .await;
                    if let Ok(Err(err)) = result {
                        tracing::debug!(error = %err, "turn interrupt not delivered");
                    }
                });
                Ok(VecDeque::new())
            }
            Effect::CreateWorktree {
                workspace_id,
                branch_name,
            } => {
                let services = self.services.clone();
                let wid = workspace_id.clone();
                let created = tokio::task::spawn_blocking(move || {
                    services.create_worktree(wid.as_str().to_owned(), branch_name)
                })
                .await
                .ok()
                .unwrap_or_else(|| Err("failed to join create worktree task".to_owned()));
                let action = match created {
                    Ok(created) => Action::WorktreeCreated {
                        workspace_id,
                        branch_name: created.branch_name,
                        worktree_path: created.worktree_path,
                    },
                    Err(message) => Action::WorktreeCreateFailed {
                        workspace_id,
                        message,
                    },
                };
                Ok(VecDeque::from([action]))
            }
        }
    }

    fn publish_state_updated(&self) {
        let _ = self.events.send(EngineEvent::StateUpdated { rev: self.rev });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use slipway_backend::LocalSessionService;
    use slipway_domain::{
        CreatedWorktree, PersistedAppState, PersistedSetupScript, PersistedThreadName,
    };
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct TestServices {
        persisted: PersistedAppState,
        load_error: Option<String>,
        worktree_error: Option<String>,
        saved_scripts: Mutex<Vec<(String, Option<String>)>>,
        interrupt_tx: Option<mpsc::UnboundedSender<(String, String, String)>>,
    }

    impl SessionService for TestServices {
        fn load_app_state(&self) -> Result<PersistedAppState, String> {
            if let Some(err) = &self.load_error {
                return Err(err.clone());
            }
            Ok(self.persisted.clone())
        }

        fn set_custom_thread_name(
            &self,
            _thread_id: String,
            _name: Option<String>,
        ) -> Result<(), String> {
            Ok(())
        }

        fn set_worktree_setup_script(
            &self,
            workspace_id: String,
            script: Option<String>,
        ) -> Result<(), String> {
            self.saved_scripts
                .lock()
                .unwrap()
                .push((workspace_id, script));
            Ok(())
        }

        fn record_thread_activity(
            &self,
            _workspace_id: String,
            _thread_id: String,
            _timestamp_unix_ms: u64,
        ) -> Result<(), String> {
            Ok(())
        }

        fn interrupt_turn(
            &self,
            workspace_id: String,
            thread_id: String,
            turn_id: String,
        ) -> Result<(), String> {
            if let Some(tx) = &self.interrupt_tx {
                let _ = tx.send((workspace_id, thread_id, turn_id));
            }
            Ok(())
        }

        fn create_worktree(
            &self,
            _workspace_id: String,
            branch_name: String,
        ) -> Result<CreatedWorktree, String> {
            if let Some(err) = &self.worktree_error {
                return Err(err.clone());
            }
            Ok(CreatedWorktree {
                worktree_path: PathBuf::from("/tmp/slipway-worktrees").join(&branch_name),
                branch_name,
            })
        }
    }

    async fn app_server_event(engine: &EngineHandle, event: serde_json::Value) {
        let event: AppServerEvent = serde_json::from_value(event).expect("event should parse");
        engine
            .app_server_event(WorkspaceId::new("ws-1"), event)
            .await
            .expect("dispatch should work");
    }

    #[tokio::test]
    async fn bootstrap_loads_persisted_state() {
        let services = Arc::new(TestServices {
            persisted: PersistedAppState {
                thread_names: vec![PersistedThreadName {
                    thread_id: "t-1".to_owned(),
                    name: "Persisted name".to_owned(),
                }],
                setup_scripts: vec![PersistedSetupScript {
                    workspace_id: "ws-1".to_owned(),
                    script: "pnpm install".to_owned(),
                }],
            },
            ..Default::default()
        });
        let (engine, _events) = Engine::start(services);

        let state = engine.state().await.expect("state should be readable");
        assert_eq!(
            state
                .custom_thread_names
                .get(&ThreadId::new("t-1"))
                .map(String::as_str),
            Some("Persisted name")
        );
        assert_eq!(
            state
                .worktree_setup_scripts
                .get(&WorkspaceId::new("ws-1"))
                .map(String::as_str),
            Some("pnpm install")
        );
        assert!(engine.current_rev().await.expect("rev") >= 2);
    }

    #[tokio::test]
    async fn bootstrap_failure_surfaces_last_error() {
        let services = Arc::new(TestServices {
            load_error: Some("db exploded".to_owned()),
            ..Default::default()
        });
        let (engine, _events) = Engine::start(services);

        let state = engine.state().await.expect("state should be readable");
        assert_eq!(state.last_error.as_deref(), Some("db exploded"));
    }

    #[tokio::test]
    async fn save_script_flow_records_and_updates_prompt() {
        let services = Arc::new(TestServices::default());
        let (engine, _events) = Engine::start(services.clone());

        engine
            .dispatch(Action::OpenWorktreePrompt {
                workspace_id: WorkspaceId::new("ws-1"),
                workspace_name: "api".to_owned(),
            })
            .await
            .expect("open should work");
        engine
            .dispatch(Action::WorktreeSetupScriptChanged {
                script: "npm ci".to_owned(),
            })
            .await
            .expect("edit should work");
        engine
            .dispatch(Action::SaveWorktreeSetupScript)
            .await
            .expect("save should work");

        let state = engine.state().await.expect("state should be readable");
        let prompt = state.worktree_prompt.expect("prompt stays open");
        assert!(!prompt.saving_script);
        assert_eq!(prompt.saved_setup_script.as_deref(), Some("npm ci"));
        assert_eq!(
            state
                .worktree_setup_scripts
                .get(&WorkspaceId::new("ws-1"))
                .map(String::as_str),
            Some("npm ci")
        );
        assert_eq!(
            services.saved_scripts.lock().unwrap().as_slice(),
            &[("ws-1".to_owned(), Some("npm ci".to_owned()))]
        );
    }

    #[tokio::test]
    async fn worktree_failure_surfaces_on_the_prompt() {
        let services = Arc::new(TestServices {
            worktree_error: Some("git failed (exit status: 128)".to_owned()),
            ..Default::default()
        });
        let (engine, _events) = Engine::start(services);

        engine
            .dispatch(Action::OpenWorktreePrompt {
                workspace_id: WorkspaceId::new("ws-1"),
                workspace_name: "api".to_owned(),
            })
            .await
            .expect("open should work");
        engine
            .dispatch(Action::WorktreeBranchChanged {
                branch: "fix-login".to_owned(),
            })
            .await
            .expect("edit should work");
        engine
            .dispatch(Action::ConfirmWorktreePrompt)
            .await
            .expect("confirm should work");

        let state = engine.state().await.expect("state should be readable");
        let prompt = state.worktree_prompt.expect("prompt stays open on failure");
        assert!(!prompt.busy);
        assert_eq!(prompt.error.as_deref(), Some("git failed (exit status: 128)"));
    }

    #[tokio::test]
    async fn worktree_success_closes_the_prompt() {
        let services = Arc::new(TestServices::default());
        let (engine, _events) = Engine::start(services);

        let rev_opened = engine
            .dispatch(Action::OpenWorktreePrompt {
                workspace_id: WorkspaceId::new("ws-1"),
                workspace_name: "api".to_owned(),
            })
            .await
            .expect("open should work");
        engine
            .dispatch(Action::WorktreeBranchChanged {
                branch: "fix-login".to_owned(),
            })
            .await
            .expect("edit should work");
        let rev_confirmed = engine
            .dispatch(Action::ConfirmWorktreePrompt)
            .await
            .expect("confirm should work");

        assert!(rev_confirmed > rev_opened);
        let state = engine.state().await.expect("state should be readable");
        assert!(state.worktree_prompt.is_none());
    }

    #[tokio::test]
    async fn interrupt_requests_reach_the_agent_session() {
        let (interrupt_tx, mut interrupt_rx) = mpsc::unbounded_channel();
        let services = Arc::new(TestServices {
            interrupt_tx: Some(interrupt_tx),
            ..Default::default()
        });
        let (engine, _events) = Engine::start(services);

        app_server_event(
            &engine,
            json!({"type": "thread.started", "thread": {"id": "t-1", "preview": "Fix login"}}),
        )
        .await;
        app_server_event(
            &engine,
            json!({"type": "turn.started", "thread_id": "t-1", "turn_id": "turn-1"}),
        )
        .await;
        engine
            .dispatch(Action::RequestTurnInterrupt {
                thread_id: ThreadId::new("t-1"),
            })
            .await
            .expect("request should work");

        let delivered = tokio::time::timeout(Duration::from_secs(5), interrupt_rx.recv())
            .await
            .expect("interrupt should be delivered in time")
            .expect("channel should stay open");
        assert_eq!(
            delivered,
            ("ws-1".to_owned(), "t-1".to_owned(), "turn-1".to_owned())
        );
    }

    #[tokio::test]
    async fn message_activity_is_broadcast() {
        let services = Arc::new(TestServices::default());
        let (engine, events) = Engine::start(services);
        let mut rx = events.subscribe();

        app_server_event(
            &engine,
            json!({"type": "thread.started", "thread": {"id": "t-9", "preview": "Hello"}}),
        )
        .await;

        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event should arrive in time")
                .expect("channel should stay open");
            if let EngineEvent::MessageActivity { thread_id } = event {
                assert_eq!(thread_id.as_str(), "t-9");
                break;
            }
        }
    }

    #[tokio::test]
    async fn bootstrap_reads_state_from_a_real_backend() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let services =
            LocalSessionService::new(dir.path().to_path_buf()).expect("service should init");
        services
            .set_custom_thread_name("t-1".to_owned(), Some("Persisted".to_owned()))
            .expect("seed name should work");
        services
            .set_worktree_setup_script("ws-1".to_owned(), Some("pnpm install".to_owned()))
            .expect("seed script should work");

        let (engine, _events) = Engine::start(services);
        let state = engine.state().await.expect("state should be readable");
        assert_eq!(
            state
                .custom_thread_names
                .get(&ThreadId::new("t-1"))
                .map(String::as_str),
            Some("Persisted")
        );
        assert_eq!(
            state
                .worktree_setup_scripts
                .get(&WorkspaceId::new("ws-1"))
                .map(String::as_str),
            Some("pnpm install")
        );
    }
}
