//! Lua host: host functions, required modules and async script runs
//! on fresh interpreter states.

pub mod builtins;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod loader;
pub mod log;
pub mod registry;
pub mod runner;
pub mod task;

pub use builtins::{join_args, WaitUnit};
pub use config::{default_config_path, HostConfig};
pub use context::ExecutionContext;
pub use error::{ArgShape, HostError, Result};
pub use host::ScriptHost;
pub use loader::{FsModuleLoader, MemoryModuleLoader, ModuleLoader, ModuleSource};
pub use log::{LogLevel, LogSink, MemorySink, TracingSink};
pub use registry::{FunctionRegistry, HostFunction, ModuleRequirements};
pub use runner::{pre_hook, PreHook, ScriptAsset, ScriptSource};
pub use task::DetachedTask;

// Re-exported so embedders use the same interpreter and signal types.
pub use mlua;
pub use tokio_util::sync::CancellationToken;
