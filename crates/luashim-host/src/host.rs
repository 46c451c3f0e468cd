use std::path::Path;
use std::sync::Arc;

use mlua::{Lua, LuaOptions, StdLib};
use tokio_util::sync::CancellationToken;

use crate::builtins::{self, WaitUnit};
use crate::config::HostConfig;
use crate::context::ExecutionContext;
use crate::error::{HostError, Result};
use crate::loader::{self, FsModuleLoader, ModuleLoader};
use crate::log::{LogSink, TracingSink};
use crate::registry::{FunctionRegistry, HostFunction, ModuleRequirements};
use crate::runner::{self, PreHook, ScriptAsset, ScriptSource};

/// Owns the host functions and module requirements shared by every run.
///
/// Configure it up front; runs only borrow it, so registration cannot race
/// with execution.
pub struct ScriptHost {
    functions: FunctionRegistry,
    modules: ModuleRequirements,
    loader: Option<Arc<dyn ModuleLoader>>,
    sink: Arc<dyn LogSink>,
    detached: CancellationToken,
}

impl ScriptHost {
    /// Host logging through `tracing`.
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self::configured(sink, WaitUnit::default())
    }

    pub fn from_config(config: &HostConfig, sink: Arc<dyn LogSink>) -> Self {
        let mut host = Self::configured(sink, config.wait_unit);
        if let Some(root) = &config.module_root {
            host.set_module_loader(FsModuleLoader::new(root));
        }
        for module in &config.modules {
            host.require_module(module.as_str());
        }
        host
    }

    fn configured(sink: Arc<dyn LogSink>, wait_unit: WaitUnit) -> Self {
        let detached = CancellationToken::new();
        let mut functions = FunctionRegistry::new();
        if let Err(err) = builtins::register_defaults(&mut functions, &sink, wait_unit, &detached) {
            sink.log_warning(&err.to_string());
        }
        Self {
            functions,
            modules: ModuleRequirements::new(),
            loader: None,
            sink,
            detached,
        }
    }

    /// Replaces the interpreter's default module search.
    pub fn set_module_loader(&mut self, loader: impl ModuleLoader) {
        self.loader = Some(Arc::new(loader));
    }

    pub fn with_module_loader(mut self, loader: impl ModuleLoader) -> Self {
        self.set_module_loader(loader);
        self
    }

    /// Adds a host function. A name that is already taken keeps its first
    /// function; the attempt is logged as a warning and `false` is returned.
    pub fn register(&mut self, name: impl Into<String>, function: impl HostFunction) -> bool {
        let inserted = self.functions.insert(name, function);
        self.warn_on_conflict(inserted)
    }

    /// Adds a module to require into every context. Duplicates are ignored
    /// with a warning.
    pub fn require_module(&mut self, path: impl Into<String>) -> bool {
        let inserted = self.modules.insert(path);
        self.warn_on_conflict(inserted)
    }

    fn warn_on_conflict(&self, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                self.sink.log_warning(&err.to_string());
                false
            }
        }
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn modules(&self) -> &ModuleRequirements {
        &self.modules
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    /// Assembles a fresh context: safe standard libraries, module loader, required
    /// modules in order, then host functions over any standard names.
    pub async fn build_context(&self, cancel: &CancellationToken) -> Result<ExecutionContext> {
        if cancel.is_cancelled() {
            return Err(HostError::Cancelled);
        }
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())?;
        if let Some(loader) = &self.loader {
            loader::install(&lua, loader.clone())?;
        }
        let ctx = ExecutionContext::new(lua, cancel.clone(), self.detached.clone());

        for module in self.modules.iter() {
            tracing::debug!(module, "requiring module");
            ctx.require(module).await?;
        }

        self.functions.install_into(ctx.lua())?;
        Ok(ctx)
    }

    /// Builds a context, runs `hook` against it if given, then the script.
    pub async fn run(
        &self,
        source: ScriptSource,
        hook: Option<PreHook>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let ctx = self.build_context(&cancel).await?;
        runner::execute(ctx, source, hook, &cancel).await
    }

    pub async fn run_string(
        &self,
        source: impl Into<String>,
        hook: Option<PreHook>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.run(ScriptSource::Text(source.into()), hook, cancel).await
    }

    pub async fn run_file(
        &self,
        path: impl AsRef<Path>,
        hook: Option<PreHook>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.run(ScriptSource::File(path.as_ref().to_path_buf()), hook, cancel)
            .await
    }

    pub async fn run_asset(
        &self,
        asset: &ScriptAsset,
        hook: Option<PreHook>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.run(ScriptSource::Asset(asset.clone()), hook, cancel).await
    }

    /// Stops every detached task still running. Runs are unaffected.
    pub fn shutdown(&self) {
        self.detached.cancel();
    }
}

impl Default for ScriptHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHost")
            .field("functions", &self.functions)
            .field("modules", &self.modules)
            .field("custom_loader", &self.loader.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::loader::MemoryModuleLoader;
    use crate::log::{LogLevel, MemorySink};
    use crate::runner::pre_hook;

    fn host() -> (ScriptHost, Arc<MemorySink>) {
        let sink = MemorySink::new();
        (ScriptHost::with_sink(sink.clone()), sink)
    }

    #[test]
    fn builtins_are_registered() {
        let (host, _) = host();
        assert_eq!(
            host.functions().names().collect::<Vec<_>>(),
            vec!["print", "warn", "error", "wait", "coroutine"]
        );
    }

    #[test]
    fn duplicate_function_warns_once() {
        let (mut host, sink) = host();
        let first = host.register("print", |lua: &Lua| lua.create_function(|_, ()| Ok(())));
        assert!(!first);
        assert_eq!(sink.messages(LogLevel::Warning), vec!["print is already registered".to_string()]);
    }

    #[test]
    fn duplicate_module_keeps_one_entry() {
        let (mut host, sink) = host();
        assert!(host.require_module("utils"));
        assert!(!host.require_module("utils"));
        assert_eq!(host.modules().len(), 1);
        assert_eq!(sink.messages(LogLevel::Warning).len(), 1);
    }

    #[tokio::test]
    async fn contexts_open_only_safe_libraries() {
        let (host, _) = host();
        let ctx = host.build_context(&CancellationToken::new()).await.unwrap();
        assert!(ctx.get_global::<Option<mlua::Table>>("debug").unwrap().is_none());
        assert!(ctx.get_global::<Option<mlua::Table>>("string").unwrap().is_some());
    }

    #[tokio::test]
    async fn modules_load_in_order_before_host_functions() {
        let (mut host, sink) = host();
        host.set_module_loader(
            MemoryModuleLoader::new()
                .with_module("first", "order = (order or '') .. 'first'")
                .with_module("second", "order = order .. 'second'; print('from module')"),
        );
        host.require_module("first");
        host.require_module("second");

        let ctx = host.build_context(&CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.get_global::<String>("order").unwrap(), "firstsecond");
        // Modules ran against the standard `print`.
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn module_failure_aborts_the_build() {
        let (mut host, _) = host();
        host.set_module_loader(MemoryModuleLoader::new().with_module("bad", "local t = nil; t.x = 1"));
        host.require_module("bad");

        let err = host.build_context(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, HostError::ModuleLoad { ref module, .. } if module == "bad"));
    }

    #[tokio::test]
    async fn custom_functions_reach_scripts() {
        let (mut host, sink) = host();
        assert!(host.register("double", |lua: &Lua| lua.create_function(|_, x: i64| Ok(x * 2))));

        host.run_string("print(double(21))", None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sink.entries(), vec![(LogLevel::Info, "print: 42".to_string())]);
    }

    #[tokio::test]
    async fn hook_runs_before_the_body() {
        let (host, sink) = host();
        let hook_sink = sink.clone();
        let hook = pre_hook(move |ctx, _| async move {
            hook_sink.log("hook");
            ctx.set_global("greeting", "hi")
        });

        host.run_string("print(greeting)", Some(hook), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            sink.entries(),
            vec![
                (LogLevel::Info, "hook".to_string()),
                (LogLevel::Info, "print: hi".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn hook_failure_skips_the_body() {
        let (host, sink) = host();
        let hook = pre_hook(|_, _| async { Err(HostError::Config("not ready".into())) });

        let err = host
            .run_string("print('body')", Some(hook), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid config: not ready");
        assert!(sink.entries().is_empty());
    }

    #[tokio::test]
    async fn runs_files_and_assets() {
        let (host, sink) = host();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.lua");
        std::fs::write(&path, "print('file')").unwrap();

        host.run_file(&path, None, CancellationToken::new()).await.unwrap();
        host.run_asset(&ScriptAsset::new("intro", "print('asset')"), None, CancellationToken::new())
            .await
            .unwrap();
        assert!(sink.contains("print: file"));
        assert!(sink.contains("print: asset"));

        let err = host
            .run_file(dir.path().join("missing.lua"), None, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Io { .. }));
    }

    #[tokio::test]
    async fn asset_errors_name_the_asset() {
        let (host, _) = host();
        let err = host
            .run_asset(&ScriptAsset::new("intro", "local t = nil; t.x = 1"), None, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("intro:1"), "{err}");
    }

    #[tokio::test]
    async fn contexts_do_not_share_globals() {
        let (host, sink) = host();
        host.run_string("leak = 'x'", None, CancellationToken::new()).await.unwrap();
        host.run_string("print(leak)", None, CancellationToken::new()).await.unwrap();
        assert_eq!(sink.entries(), vec![(LogLevel::Info, "print: nil".to_string())]);
    }

    #[tokio::test]
    async fn cancel_during_wait_stops_the_script() {
        let (host, sink) = host();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = host
            .run_string("print('before'); wait(1); print('after')", None, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::Cancelled));
        assert!(sink.contains("print: before"));
        assert!(!sink.contains("print: after"));
    }

    #[test]
    fn config_applies_modules_and_loader() {
        let config = HostConfig {
            modules: vec!["a".into(), "b".into(), "a".into()],
            module_root: Some("scripts".into()),
            ..HostConfig::default()
        };
        let sink = MemorySink::new();
        let host = ScriptHost::from_config(&config, sink.clone());
        assert_eq!(host.modules().iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(sink.messages(LogLevel::Warning), vec!["a is already registered".to_string()]);
        assert!(format!("{host:?}").contains("custom_loader: true"));
    }
}
