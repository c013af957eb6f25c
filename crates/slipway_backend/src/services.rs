use anyhow::{Context as _, anyhow};
use slipway_domain::{CreatedWorktree, PersistedAppState, SessionService};
use std::{
    collections::HashMap,
    io::Write,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use crate::agent_rpc::AgentRpcRegistry;
use crate::sqlite_store::SqliteStore;
use crate::worktree;

/// Host-side services backed by sqlite, git and the live agent sessions.
pub struct LocalSessionService {
    workspace_roots: Mutex<HashMap<String, PathBuf>>,
    sessions: AgentRpcRegistry,
    sqlite: SqliteStore,
}

impl LocalSessionService {
    pub fn new(data_dir: PathBuf) -> anyhow::Result<Arc<Self>> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let sqlite =
            SqliteStore::new(data_dir.join("slipway.db")).context("failed to init sqlite store")?;

        Ok(Arc::new(Self {
            workspace_roots: Mutex::new(HashMap::new()),
            sessions: AgentRpcRegistry::new(),
            sqlite,
        }))
    }

    /// Maps a workspace id to the git repository its worktrees are created in.
    pub fn register_workspace_root(&self, workspace_id: String, repo_path: PathBuf) {
        let mut roots = self
            .workspace_roots
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        roots.insert(workspace_id, repo_path);
    }

    /// Hands over the stdin of a spawned agent session for rpc notifications.
    pub fn register_agent_session(&self, workspace_id: String, writer: Box<dyn Write + Send>) {
        self.sessions.register(workspace_id, writer);
    }

    pub fn drop_agent_session(&self, workspace_id: &str) {
        self.sessions.unregister(workspace_id);
    }

    fn workspace_root(&self, workspace_id: &str) -> anyhow::Result<PathBuf> {
        let roots = self
            .workspace_roots
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        roots
            .get(workspace_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown workspace: {workspace_id}"))
    }
}

impl SessionService for LocalSessionService {
    fn load_app_state(&self) -> Result<PersistedAppState, String> {
        self.sqlite.load_app_state().map_err(|e| format!("{e:#}"))
    }

    fn set_custom_thread_name(
        &self,
        thread_id: String,
        name: Option<String>,
    ) -> Result<(), String> {
        self.sqlite
            .set_thread_name(thread_id, name)
            .map_err(|e| format!("{e:#}"))
    }

    fn set_worktree_setup_script(
        &self,
        workspace_id: String,
        script: Option<String>,
    ) -> Result<(), String> {
        self.sqlite
            .set_worktree_setup_script(workspace_id, script)
            .map_err(|e| format!("{e:#}"))
    }

    fn record_thread_activity(
        &self,
        workspace_id: String,
        thread_id: String,
        timestamp_unix_ms: u64,
    ) -> Result<(), String> {
        self.sqlite
            .record_thread_activity(workspace_id, thread_id, timestamp_unix_ms)
            .map_err(|e| format!("{e:#}"))
    }

    fn interrupt_turn(
        &self,
        workspace_id: String,
        thread_id: String,
        turn_id: String,
    ) -> Result<(), String> {
        self.sessions
            .interrupt_turn(&workspace_id, &thread_id, &turn_id)
            .map_err(|e| format!("{e:#}"))
    }

    fn create_worktree(
        &self,
        workspace_id: String,
        branch_name: String,
    ) -> Result<CreatedWorktree, String> {
        let result: anyhow::Result<CreatedWorktree> = (|| {
            let repo_path = self.workspace_root(&workspace_id)?;
            worktree::create_worktree(&repo_path, &branch_name)
        })();

        result.map_err(|e| format!("{e:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_data_dir(test_name: &str) -> PathBuf {
        use std::time::{SystemTime, UNIX_EPOCH};
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be valid")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "slipway-{test_name}-{}-{}",
            std::process::id(),
            unique
        ))
    }

    #[test]
    fn persists_names_scripts_and_activity() {
        let data_dir = temp_data_dir("service-persists");
        let service = LocalSessionService::new(data_dir.clone()).expect("service should init");

        service
            .set_custom_thread_name("t-1".to_owned(), Some("Login fix".to_owned()))
            .expect("set name should work");
        service
            .set_worktree_setup_script("ws-1".to_owned(), Some("pnpm install".to_owned()))
            .expect("set script should work");
        service
            .record_thread_activity("ws-1".to_owned(), "t-1".to_owned(), 1_234)
            .expect("record activity should work");

        let state = service.load_app_state().expect("load should work");
        assert_eq!(state.thread_names.len(), 1);
        assert_eq!(state.thread_names[0].thread_id, "t-1");
        assert_eq!(state.thread_names[0].name, "Login fix");
        assert_eq!(state.setup_scripts.len(), 1);
        assert_eq!(state.setup_scripts[0].script, "pnpm install");

        drop(service);
        let _ = std::fs::remove_dir_all(&data_dir);
    }

    #[test]
    fn create_worktree_requires_registered_root() {
        let data_dir = temp_data_dir("service-unknown-workspace");
        let service = LocalSessionService::new(data_dir.clone()).expect("service should init");

        let err = service
            .create_worktree("ws-missing".to_owned(), "fix".to_owned())
            .expect_err("unknown workspace should fail");
        assert!(err.contains("unknown workspace"));

        drop(service);
        let _ = std::fs::remove_dir_all(&data_dir);
    }

    #[test]
    fn interrupt_goes_to_registered_session() {
        use std::sync::Mutex as StdMutex;

        #[derive(Clone)]
        struct SharedBuf(Arc<StdMutex<Vec<u8>>>);

        impl Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let data_dir = temp_data_dir("service-interrupt");
        let service = LocalSessionService::new(data_dir.clone()).expect("service should init");

        let buf = SharedBuf(Arc::new(StdMutex::new(Vec::new())));
        service.register_agent_session("ws-1".to_owned(), Box::new(buf.clone()));

        service
            .interrupt_turn("ws-1".to_owned(), "t-1".to_owned(), "turn-1".to_owned())
            .expect("interrupt should reach the session");
        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(written.contains("\"method\":\"turn/interrupt\""));

        service.drop_agent_session("ws-1");
        assert!(
            service
                .interrupt_turn("ws-1".to_owned(), "t-1".to_owned(), "turn-1".to_owned())
                .is_err()
        );

        drop(service);
        let _ = std::fs::remove_dir_all(&data_dir);
    }
}
