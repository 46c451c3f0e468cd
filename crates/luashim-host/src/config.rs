use std::{fs, path::Path, path::PathBuf};

use directories::ProjectDirs;
use mlua::{Lua, LuaSerdeExt, Value};
use serde::{Deserialize, Serialize};

use crate::builtins::WaitUnit;
use crate::error::{HostError, Result};

/// Host setup that can live in a config file.
///
/// ```lua
/// return {
///   modules = { "utils", "game.state" },
///   module_root = "scripts",
///   wait_unit = "seconds",
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Required into every context, in this order.
    pub modules: Vec<String>,
    /// Resolve `require` from this directory instead of `package.path`.
    pub module_root: Option<PathBuf>,
    pub wait_unit: WaitUnit,
}

impl HostConfig {
    /// Loads `config.lua`, `config.yaml` or `config.yml` from the user config
    /// dir; defaults when none exists.
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Picks the format from the file extension; anything but yaml is Lua.
    pub fn load(path: &Path) -> Result<Self> {
        let src = fs::read_to_string(path).map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml_str(&src),
            _ => Self::from_lua_str(&src, &format!("@{}", path.display())),
        }
    }

    /// Evaluates a chunk that returns the config table.
    pub fn from_lua_str(src: &str, chunk_name: &str) -> Result<Self> {
        // Sandbox state: the config chunk never sees the host functions.
        let lua = Lua::new();
        let value = lua
            .load(src)
            .set_name(chunk_name)
            .eval::<Value>()
            .map_err(|e| HostError::Config(e.to_string()))?;

        match value {
            Value::Nil => Ok(Self::default()),
            Value::Table(_) => lua
                .from_value(value)
                .map_err(|e| HostError::Config(e.to_string())),
            other => Err(HostError::Config(format!(
                "config chunk must return a table, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn from_yaml_str(src: &str) -> Result<Self> {
        if src.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(src).map_err(|e| HostError::Config(e.to_string()))
    }
}

/// XDG: ~/.config/luashim/config.lua (also config.yaml / config.yml)
pub fn default_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("dev", "luashim", "luashim")?;
    let base = proj.config_dir();
    let lua = base.join("config.lua");
    if lua.exists() {
        return Some(lua);
    }
    ["config.yaml", "config.yml"]
        .into_iter()
        .map(|name| base.join(name))
        .find(|p| p.exists())
        .or(Some(lua))
}
