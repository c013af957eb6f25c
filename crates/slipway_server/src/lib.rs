pub mod engine;

pub use engine::{Engine, EngineEvent, EngineHandle};

use anyhow::Context as _;
use slipway_backend::LocalSessionService;
use slipway_domain::SessionService;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Boots the local services and the engine. The service handle is returned
/// for host wiring: workspace roots and agent session stdin registration.
pub fn start(
    data_dir: PathBuf,
) -> anyhow::Result<(
    EngineHandle,
    broadcast::Sender<EngineEvent>,
    Arc<LocalSessionService>,
)> {
    let services = LocalSessionService::new(data_dir).context("failed to init session services")?;
    let engine_services: Arc<dyn SessionService> = services.clone();
    let (engine, events) = Engine::start(engine_services);
    Ok((engine, events, services))
}
