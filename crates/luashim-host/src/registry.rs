use std::sync::Arc;

use mlua::{Function, Lua};

use crate::error::{HostError, Result};

/// A function implemented on the host side and exposed to scripts as a global.
///
/// Every execution context is a fresh interpreter state, so a host function is
/// a recipe: `install` is called once per context to build the callable.
pub trait HostFunction: Send + Sync + 'static {
    fn install(&self, lua: &Lua) -> mlua::Result<Function>;
}

impl<F> HostFunction for F
where
    F: Fn(&Lua) -> mlua::Result<Function> + Send + Sync + 'static,
{
    fn install(&self, lua: &Lua) -> mlua::Result<Function> {
        self(lua)
    }
}

/// Host functions by name, kept in registration order. First registration wins.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    entries: Vec<(String, Arc<dyn HostFunction>)>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, function: impl HostFunction) -> Result<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(HostError::AlreadyRegistered(name));
        }
        self.entries.push((name, Arc::new(function)));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sets every function as a global of `lua`, replacing whatever was there.
    ///
    /// All functions are created before any global changes, so none of them
    /// sees a standard table already shadowed by a host function.
    pub fn install_into(&self, lua: &Lua) -> mlua::Result<()> {
        let created = self
            .entries
            .iter()
            .map(|(name, function)| Ok((name.as_str(), function.install(lua)?)))
            .collect::<mlua::Result<Vec<_>>>()?;
        let globals = lua.globals();
        for (name, function) in created {
            globals.set(name, function)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Modules `require`d into every new context, in load order, without duplicates.
#[derive(Debug, Default, Clone)]
pub struct ModuleRequirements {
    paths: Vec<String>,
}

impl ModuleRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>) -> Result<()> {
        let path = path.into();
        if self.paths.contains(&path) {
            return Err(HostError::AlreadyRegistered(path));
        }
        self.paths.push(path);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
