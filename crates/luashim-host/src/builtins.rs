//! Host functions every script sees: `print`, `warn`, `error`, `wait`, `coroutine`.

use std::sync::Arc;
use std::time::Duration;

use mlua::{Function, Lua, MultiValue, Value};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{ArgShape, HostError};
use crate::log::{LogLevel, LogSink};
use crate::registry::{FunctionRegistry, HostFunction};
use crate::task;

/// Unit applied to the argument of `wait`.
///
/// `Days` is what existing scripts were written against, even though the
/// argument is named `seconds`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUnit {
    #[default]
    Days,
    Seconds,
}

impl WaitUnit {
    fn seconds_per_unit(self) -> f64 {
        match self {
            WaitUnit::Days => 86_400.0,
            WaitUnit::Seconds => 1.0,
        }
    }

    pub fn duration(self, amount: f64) -> Result<Duration, HostError> {
        Duration::try_from_secs_f64(amount * self.seconds_per_unit()).map_err(|e| {
            HostError::InvalidArgument {
                function: "wait",
                message: format!("cannot wait for {amount}: {e}"),
            }
        })
    }
}

/// Registers the built-ins into `registry`.
pub(crate) fn register_defaults(
    registry: &mut FunctionRegistry,
    sink: &Arc<dyn LogSink>,
    wait_unit: WaitUnit,
    detached: &CancellationToken,
) -> crate::Result<()> {
    registry.insert("print", Echo::new("print", LogLevel::Info, sink.clone()))?;
    registry.insert("warn", Echo::new("warn", LogLevel::Error, sink.clone()))?;
    // Logs like `warn` and keeps the script running.
    registry.insert("error", Echo::new("error", LogLevel::Error, sink.clone()))?;
    registry.insert(
        "wait",
        Wait {
            sink: sink.clone(),
            unit: wait_unit,
        },
    )?;
    registry.insert(
        "coroutine",
        Coroutine {
            sink: sink.clone(),
            shutdown: detached.clone(),
        },
    )?;
    Ok(())
}

/// Joins values with tabs, the way `print` lays them out.
pub fn join_args(args: &MultiValue) -> String {
    let mut line = String::new();
    for (i, value) in args.iter().enumerate() {
        if i > 0 {
            line.push('\t');
        }
        push_value(&mut line, value);
    }
    line
}

/// Lua's own `tostring`, `__tostring` included.
fn push_value(out: &mut String, value: &Value) {
    match value.to_string() {
        Ok(text) => out.push_str(&text),
        Err(_) => out.push_str(&format!("{}: {:?}", value.type_name(), value.to_pointer())),
    }
}

/// `print` / `warn` / `error`: log the joined line, hand it back to the script.
struct Echo {
    label: &'static str,
    level: LogLevel,
    sink: Arc<dyn LogSink>,
}

impl Echo {
    fn new(label: &'static str, level: LogLevel, sink: Arc<dyn LogSink>) -> Self {
        Self { label, level, sink }
    }
}

impl HostFunction for Echo {
    fn install(&self, lua: &Lua) -> mlua::Result<Function> {
        let (label, level, sink) = (self.label, self.level, self.sink.clone());
        lua.create_function(move |_, args: MultiValue| {
            let line = join_args(&args);
            sink.emit(level, &format!("{label}: {line}"));
            Ok(line)
        })
    }
}

struct Wait {
    sink: Arc<dyn LogSink>,
    unit: WaitUnit,
}

impl HostFunction for Wait {
    fn install(&self, lua: &Lua) -> mlua::Result<Function> {
        let (sink, unit) = (self.sink.clone(), self.unit);
        lua.create_async_function(move |_, args: MultiValue| {
            let sink = sink.clone();
            async move {
                if let Err(err) = ArgShape::AtLeast(1).check("wait", args.len()) {
                    sink.log_warning(&err.to_string());
                    return Ok(());
                }
                let amount = match args.iter().next() {
                    Some(Value::Integer(i)) => *i as f64,
                    Some(Value::Number(n)) => *n,
                    Some(other) => {
                        return Err(HostError::InvalidArgument {
                            function: "wait",
                            message: format!("expected a number, got {}", other.type_name()),
                        }
                        .into_lua())
                    }
                    None => return Ok(()),
                };
                let duration = unit.duration(amount).map_err(HostError::into_lua)?;
                tokio::time::sleep(duration).await;
                Ok(())
            }
        })
    }
}

/// `coroutine(fn)`: start `fn` detached and return immediately.
struct Coroutine {
    sink: Arc<dyn LogSink>,
    shutdown: CancellationToken,
}

impl HostFunction for Coroutine {
    fn install(&self, lua: &Lua) -> mlua::Result<Function> {
        let (sink, shutdown) = (self.sink.clone(), self.shutdown.clone());
        lua.create_function(move |lua, args: MultiValue| {
            if let Err(err) = ArgShape::Exactly(1).check("coroutine", args.len()) {
                sink.log_warning(&err.to_string());
                return Ok(());
            }
            let function = match args.into_iter().next() {
                Some(Value::Function(f)) => f,
                other => {
                    let got = other.as_ref().map_or("no value", Value::type_name);
                    return Err(HostError::InvalidArgument {
                        function: "coroutine",
                        message: format!("expected a function, got {got}"),
                    }
                    .into_lua());
                }
            };
            // Unsupervised: the handle is dropped on purpose.
            task::spawn(lua, function, shutdown.clone()).map_err(HostError::into_lua)?;
            Ok(())
        })
    }
}
