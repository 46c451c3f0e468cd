use mlua::{Function, Lua};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{HostError, Result};

/// Handle to a script function running detached from the run that spawned it.
///
/// Dropping the handle leaves the task running.
#[derive(Debug)]
pub struct DetachedTask {
    join: JoinHandle<Result<()>>,
}

impl DetachedTask {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn abort(&self) {
        self.join.abort();
    }

    /// Waits for the task and reports how it ended.
    pub async fn join(self) -> Result<()> {
        match self.join.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(HostError::Cancelled),
            Err(err) => Err(HostError::Join(err.to_string())),
        }
    }
}

/// Runs `function` on its own interpreter thread on the current tokio runtime.
///
/// The task stops early only when `shutdown` fires; failures are returned
/// through the handle and otherwise go nowhere.
pub(crate) fn spawn(lua: &Lua, function: Function, shutdown: CancellationToken) -> Result<DetachedTask> {
    let handle = Handle::try_current().map_err(|e| HostError::Runtime(e.to_string()))?;
    // Values only hold a weak reference to their state.
    let lua = lua.clone();
    let join = handle.spawn(async move {
        let result: Result<()> = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(HostError::Cancelled),
            r = function.call_async(()) => r.map_err(HostError::from),
        };
        if let Err(err) = &result {
            tracing::debug!(error = %err, "detached script task ended with an error");
        }
        drop(lua);
        result
    });
    Ok(DetachedTask { join })
}
