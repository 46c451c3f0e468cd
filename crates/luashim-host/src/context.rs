use std::future::Future;

use mlua::{FromLua, Function, IntoLua, Lua, MultiValue, Table};
use tokio_util::sync::CancellationToken;

use crate::error::{HostError, Result};
use crate::task::{self, DetachedTask};

/// One isolated interpreter state, built fresh for a single script run.
///
/// Cloning is cheap and shares the same state.
#[derive(Clone)]
pub struct ExecutionContext {
    lua: Lua,
    cancel: CancellationToken,
    detached: CancellationToken,
}

impl ExecutionContext {
    pub(crate) fn new(lua: Lua, cancel: CancellationToken, detached: CancellationToken) -> Self {
        Self {
            lua,
            cancel,
            detached,
        }
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn globals(&self) -> Table {
        self.lua.globals()
    }

    pub fn set_global(&self, name: &str, value: impl IntoLua) -> Result<()> {
        self.lua.globals().set(name, value)?;
        Ok(())
    }

    pub fn get_global<V: FromLua>(&self, name: &str) -> Result<V> {
        Ok(self.lua.globals().get(name)?)
    }

    /// The run's cancellation signal.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// `require(module)`, abandoned if the run is cancelled first.
    pub async fn require(&self, module: &str) -> Result<()> {
        let require: Function = self.lua.globals().get("require")?;
        let loading = async {
            require
                .call_async(module)
                .await
                .map(|_: MultiValue| ())
                .map_err(|source| HostError::ModuleLoad {
                    module: module.to_string(),
                    source,
                })
        };
        cancellable(&self.cancel, loading).await
    }

    /// Runs `text` to completion, or until the run is cancelled.
    pub async fn exec(&self, chunk_name: &str, text: &str) -> Result<()> {
        let chunk = self.lua.load(text).set_name(chunk_name);
        cancellable(&self.cancel, async { chunk.exec_async().await.map_err(HostError::from) }).await
    }

    /// Starts `function` on a fresh interpreter thread, detached from this run.
    ///
    /// Cancelling the run does not stop it; only host shutdown does.
    pub fn spawn_detached(&self, function: Function) -> Result<DetachedTask> {
        task::spawn(&self.lua, function, self.detached.clone())
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Races `fut` against `cancel`, preferring cancellation when both are ready.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    if cancel.is_cancelled() {
        return Err(HostError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HostError::Cancelled),
        result = fut => result,
    }
}
