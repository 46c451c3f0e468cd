use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while configuring the host or running a script.
#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Lua(#[from] mlua::Error),

    #[error("script run cancelled")]
    Cancelled,

    #[error("{0} is already registered")]
    AlreadyRegistered(String),

    /// Built-ins report this as a warning and return nothing.
    #[error("{function} expects {expected}, got {got}")]
    ArgumentShape {
        function: &'static str,
        expected: ArgShape,
        got: usize,
    },

    #[error("{function}: {message}")]
    InvalidArgument {
        function: &'static str,
        message: String,
    },

    #[error("failed to require module '{module}'")]
    ModuleLoad {
        module: String,
        #[source]
        source: mlua::Error,
    },

    #[error("reading {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Config(String),

    #[error("no async runtime available: {0}")]
    Runtime(String),

    #[error("detached task failed to join: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, HostError>;

impl HostError {
    /// Wraps the error so it can be raised inside a running script.
    pub fn into_lua(self) -> mlua::Error {
        match self {
            HostError::Lua(err) => err,
            other => mlua::Error::external(other),
        }
    }
}

/// Accepted argument counts for a host function, checked before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgShape {
    Any,
    Exactly(usize),
    AtLeast(usize),
}

impl ArgShape {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            ArgShape::Any => true,
            ArgShape::Exactly(n) => count == n,
            ArgShape::AtLeast(n) => count >= n,
        }
    }

    pub fn check(&self, function: &'static str, count: usize) -> Result<()> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(HostError::ArgumentShape {
                function,
                expected: *self,
                got: count,
            })
        }
    }
}

impl std::fmt::Display for ArgShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match *self {
            ArgShape::Any => write!(f, "any number of arguments"),
            ArgShape::Exactly(n) => write!(f, "exactly {n} argument{}", plural(n)),
            ArgShape::AtLeast(n) => write!(f, "at least {n} argument{}", plural(n)),
        }
    }
}
