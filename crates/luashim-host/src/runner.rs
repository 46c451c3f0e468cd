use std::future::Future;
use std::path::PathBuf;

use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

use crate::context::{cancellable, ExecutionContext};
use crate::error::{HostError, Result};

/// A script kept in memory, e.g. bundled with the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptAsset {
    pub name: String,
    pub text: String,
}

impl ScriptAsset {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// What a run executes.
#[derive(Debug, Clone)]
pub enum ScriptSource {
    Text(String),
    File(PathBuf),
    Asset(ScriptAsset),
}

impl ScriptSource {
    /// Chunk name and body. Files are read here, after the context exists.
    pub(crate) async fn resolve(self) -> Result<(String, String)> {
        match self {
            ScriptSource::Text(text) => Ok(("=(string)".to_string(), text)),
            ScriptSource::Asset(asset) => Ok((format!("={}", asset.name), asset.text)),
            ScriptSource::File(path) => {
                let text = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| HostError::Io {
                        path: path.clone(),
                        source,
                    })?;
                Ok((format!("@{}", path.display()), text))
            }
        }
    }
}

/// Setup run against the fresh context before the script body.
pub type PreHook =
    Box<dyn FnOnce(ExecutionContext, CancellationToken) -> BoxFuture<'static, Result<()>> + Send>;

/// Boxes an async closure into a [`PreHook`].
pub fn pre_hook<F, Fut>(f: F) -> PreHook
where
    F: FnOnce(ExecutionContext, CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move |ctx, cancel| f(ctx, cancel).boxed())
}

/// Hook, then body. Nothing after the first failure or cancellation runs.
pub(crate) async fn execute(
    ctx: ExecutionContext,
    source: ScriptSource,
    hook: Option<PreHook>,
    cancel: &CancellationToken,
) -> Result<()> {
    if let Some(hook) = hook {
        cancellable(cancel, hook(ctx.clone(), cancel.clone())).await?;
    }
    let (chunk_name, text) = cancellable(cancel, source.resolve()).await?;
    tracing::debug!(chunk = %chunk_name, "executing script body");
    ctx.exec(&chunk_name, &text).await
}
