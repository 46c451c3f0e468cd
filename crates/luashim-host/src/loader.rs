//! Pluggable module resolution for `require`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mlua::{Function, IntoLuaMulti, Lua, MultiValue, Table};

use crate::error::{HostError, Result};

/// Source text of a resolved module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    /// Chunk name reported in interpreter errors.
    pub chunk_name: String,
    pub text: String,
}

pub trait ModuleLoader: Send + Sync + 'static {
    /// `Ok(None)` when this loader does not know `name`.
    fn load(&self, name: &str) -> Result<Option<ModuleSource>>;
}

/// Resolves `a.b` to `<root>/a/b.lua`, then `<root>/a/b/init.lua`.
#[derive(Debug, Clone)]
pub struct FsModuleLoader {
    root: PathBuf,
}

impl FsModuleLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidates(&self, name: &str) -> [PathBuf; 2] {
        let rel: PathBuf = name.split('.').collect();
        [
            self.root.join(&rel).with_extension("lua"),
            self.root.join(&rel).join("init.lua"),
        ]
    }
}

impl ModuleLoader for FsModuleLoader {
    fn load(&self, name: &str) -> Result<Option<ModuleSource>> {
        for path in self.candidates(name) {
            if !path.is_file() {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|source| HostError::Io {
                path: path.clone(),
                source,
            })?;
            return Ok(Some(ModuleSource {
                chunk_name: format!("@{}", path.display()),
                text,
            }));
        }
        Ok(None)
    }
}

/// Modules held as in-memory text assets.
#[derive(Debug, Clone, Default)]
pub struct MemoryModuleLoader {
    modules: HashMap<String, String>,
}

impl MemoryModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.modules.insert(name.into(), text.into());
    }
}

impl ModuleLoader for MemoryModuleLoader {
    fn load(&self, name: &str) -> Result<Option<ModuleSource>> {
        Ok(self.modules.get(name).map(|text| ModuleSource {
            chunk_name: format!("={name}"),
            text: text.clone(),
        }))
    }
}

/// Replaces `package.searchers` with `{ preload, host loader }`, so only
/// `package.preload` and `loader` can satisfy a `require`.
pub(crate) fn install(lua: &Lua, loader: Arc<dyn ModuleLoader>) -> mlua::Result<()> {
    let package: Table = lua.globals().get("package")?;
    let searchers: Table = package.get("searchers")?;
    let preload: Function = searchers.get(1)?;

    let host = lua.create_function(move |lua, name: String| -> mlua::Result<MultiValue> {
        match loader.load(&name).map_err(HostError::into_lua)? {
            Some(module) => {
                let chunk = lua
                    .load(module.text)
                    .set_name(module.chunk_name.clone())
                    .into_function()?;
                (chunk, module.chunk_name).into_lua_multi(lua)
            }
            None => format!("no module '{name}' in host loader").into_lua_multi(lua),
        }
    })?;

    package.set("searchers", lua.create_sequence_from([preload, host])?)?;
    tracing::trace!("installed host module searcher");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_loader_serves_require() {
        let lua = Lua::new();
        let loader = MemoryModuleLoader::new().with_module("utils", "return { twice = function(x) return x * 2 end }");
        install(&lua, Arc::new(loader)).unwrap();

        let got: i64 = lua.load("return require('utils').twice(21)").eval().unwrap();
        assert_eq!(got, 42);
    }

    #[test]
    fn preload_still_resolves() {
        let lua = Lua::new();
        install(&lua, Arc::new(MemoryModuleLoader::new())).unwrap();

        let got: String = lua
            .load("package.preload.hello = function() return 'hi' end; return require('hello')")
            .eval()
            .unwrap();
        assert_eq!(got, "hi");
    }

    #[test]
    fn unknown_module_reports_host_loader() {
        let lua = Lua::new();
        install(&lua, Arc::new(MemoryModuleLoader::new())).unwrap();

        let err = lua.load("require('nope')").exec().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("module 'nope' not found"), "{msg}");
        assert!(msg.contains("no module 'nope' in host loader"), "{msg}");
    }

    #[test]
    fn fs_loader_resolves_dotted_names_and_init() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("game/ui")).unwrap();
        fs::write(dir.path().join("game/util.lua"), "return 'util'").unwrap();
        fs::write(dir.path().join("game/ui/init.lua"), "return 'ui'").unwrap();

        let loader = FsModuleLoader::new(dir.path());
        let util = loader.load("game.util").unwrap().unwrap();
        assert_eq!(util.text, "return 'util'");
        assert!(util.chunk_name.starts_with('@'));
        assert_eq!(loader.load("game.ui").unwrap().unwrap().text, "return 'ui'");
        assert!(loader.load("game.missing").unwrap().is_none());

        let lua = Lua::new();
        install(&lua, Arc::new(loader)).unwrap();
        let got: String = lua.load("return require('game.util') .. require('game.ui')").eval().unwrap();
        assert_eq!(got, "utilui");
    }

    #[test]
    fn loader_failure_surfaces_from_require() {
        struct Broken;
        impl ModuleLoader for Broken {
            fn load(&self, name: &str) -> Result<Option<ModuleSource>> {
                Err(HostError::Config(format!("cannot load {name}")))
            }
        }

        let lua = Lua::new();
        install(&lua, Arc::new(Broken)).unwrap();
        let err = lua.load("require('x')").exec().unwrap_err();
        assert!(err.to_string().contains("cannot load x"), "{err}");
    }
}
