use anyhow::{Context as _, anyhow};
use serde_json::json;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

/// Writers into live agent sessions, keyed by workspace id. The host hands
/// over the session's stdin after spawning the agent process.
pub(crate) struct AgentRpcRegistry {
    writers: Mutex<HashMap<String, Box<dyn Write + Send>>>,
}

impl AgentRpcRegistry {
    pub(crate) fn new() -> Self {
        Self {
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn register(&self, workspace_id: String, writer: Box<dyn Write + Send>) {
        let mut writers = self.writers.lock().unwrap_or_else(|err| err.into_inner());
        writers.insert(workspace_id, writer);
    }

    pub(crate) fn unregister(&self, workspace_id: &str) {
        let mut writers = self.writers.lock().unwrap_or_else(|err| err.into_inner());
        writers.remove(workspace_id);
    }

    pub(crate) fn interrupt_turn(
        &self,
        workspace_id: &str,
        thread_id: &str,
        turn_id: &str,
    ) -> anyhow::Result<()> {
        self.send_notification(
            workspace_id,
            "turn/interrupt",
            json!({ "threadId": thread_id, "turnId": turn_id }),
        )
    }

    fn send_notification(
        &self,
        workspace_id: &str,
        method: &str,
        params: serde_json::Value,
    ) -> anyhow::Result<()> {
        let message = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        let mut line =
            serde_json::to_string(&message).context("failed to encode rpc notification")?;
        line.push('\n');

        let mut writers = self.writers.lock().unwrap_or_else(|err| err.into_inner());
        let writer = writers
            .get_mut(workspace_id)
            .ok_or_else(|| anyhow!("no agent session registered for workspace {workspace_id}"))?;
        writer
            .write_all(line.as_bytes())
            .with_context(|| format!("failed to write {method} notification"))?;
        writer
            .flush()
            .with_context(|| format!("failed to flush {method} notification"))?;
        Ok(())
    }
}
