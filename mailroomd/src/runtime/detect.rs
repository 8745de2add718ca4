//! Container engine detection.
//!
//! Resolution order: explicit override first (an unknown value fails before
//! any probing), then `docker --version`, then `container --version`. Probes
//! run under a bounded timeout so a hung CLI cannot stall startup.
//!
//! `resolve` is the constructed entry point; the result is a plain value
//! handed to the mount builder and lifecycle controller. `resolve_cached`
//! memoizes the first success for the daemon's lifetime: the installed
//! engine cannot change without a process restart.

use std::sync::Mutex;
use std::time::Duration;

use mailroom_core::{Engine, EngineError};
use tokio::process::Command;
use tracing::debug;

static RESOLVED: Mutex<Option<Engine>> = Mutex::new(None);

/// Resolve the container engine. Does not consult or update the memo.
pub async fn resolve(
    override_name: Option<&str>,
    probe_timeout: Duration,
) -> Result<Engine, EngineError> {
    if let Some(name) = override_name.map(str::trim).filter(|n| !n.is_empty()) {
        return Engine::from_name(name);
    }

    for engine in [Engine::Docker, Engine::AppleContainer] {
        if probe(engine, probe_timeout).await {
            debug!(engine = engine.as_str(), "container engine probe succeeded");
            return Ok(engine);
        }
    }

    Err(EngineError::NotFound)
}

/// Resolve once per process; later calls return the memoized engine.
/// Failures are not memoized, so a fixed environment can retry.
pub async fn resolve_cached(
    override_name: Option<&str>,
    probe_timeout: Duration,
) -> Result<Engine, EngineError> {
    if let Some(engine) = *RESOLVED.lock().expect("engine memo poisoned") {
        return Ok(engine);
    }

    let engine = resolve(override_name, probe_timeout).await?;
    *RESOLVED.lock().expect("engine memo poisoned") = Some(engine);
    Ok(engine)
}

async fn probe(engine: Engine, probe_timeout: Duration) -> bool {
    let output = Command::new(engine.binary())
        .args(engine.probe_args())
        .output();
    match tokio::time::timeout(probe_timeout, output).await {
        Ok(Ok(out)) => out.status.success(),
        Ok(Err(_)) | Err(_) => false,
    }
}

#[cfg(test)]
pub fn reset_resolved() {
    RESOLVED.lock().expect("engine memo poisoned").take();
}
