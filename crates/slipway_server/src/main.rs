use anyhow::{Context as _, anyhow};
use slipway_domain::{AppServerEvent, WorkspaceId};
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt as _;
use tracing_subscriber::EnvFilter;

const DATA_DIR_ENV: &str = "SLIPWAY_DATA_DIR";
const WORKSPACE_ID_ENV: &str = "SLIPWAY_WORKSPACE_ID";

fn resolve_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        let dir = dir.trim();
        if dir.is_empty() {
            return Err(anyhow!("{DATA_DIR_ENV} is set but empty"));
        }
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var_os("HOME").ok_or_else(|| anyhow!("HOME is not set"))?;
    Ok(PathBuf::from(home).join(".slipway"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let data_dir = resolve_data_dir()?;
    let workspace_id = std::env::var(WORKSPACE_ID_ENV).unwrap_or_else(|_| "default".to_owned());

    let (engine, _events, services) = slipway_server::start(data_dir.clone())?;
    services.register_workspace_root(
        workspace_id.clone(),
        std::env::current_dir().context("failed to resolve the current directory")?,
    );

    tracing::info!(
        data_dir = %data_dir.display(),
        workspace_id = %workspace_id,
        "slipway engine running, reading app server events from stdin"
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Unknown or malformed notifications are skipped, the stream goes on.
        match serde_json::from_str::<AppServerEvent>(line) {
            Ok(event) => {
                if let Err(err) = engine
                    .app_server_event(WorkspaceId::new(workspace_id.clone()), event)
                    .await
                {
                    tracing::error!(error = %err, "failed to dispatch app server event");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unparseable app server event line");
            }
        }
    }

    Ok(())
}
