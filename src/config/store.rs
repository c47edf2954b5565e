use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::{debug, info, warn};

use crate::opts::Value;

/// Errors from reading or writing config files
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid [{section}] section: {source}")]
    Section {
        section: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Sectioned on-disk store shared by all modules of an agent.
///
/// Files are read from the working directory, the user config directory and
/// an optional forced path, in that order, later files overriding earlier
/// ones. Writes go to the forced path if given, otherwise to the user config
/// directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    name: String,
    cwd_file: PathBuf,
    user_file: Option<PathBuf>,
    forced_file: Option<PathBuf>,
    table: toml::Table,
}

impl ConfigStore {
    /// Create a store for config `name`, e.g. `pifon` reads `pifon.toml`
    pub fn new(name: &str, forced_file: Option<PathBuf>) -> Self {
        let file_name = format!("{}.toml", name);
        let user_file = ProjectDirs::from("", "", "pifon").map(|d| d.config_dir().join(&file_name));
        Self::with_paths(name, PathBuf::from(file_name), user_file, forced_file)
    }

    /// Create a store with explicit file locations
    pub fn with_paths(
        name: &str,
        cwd_file: PathBuf,
        user_file: Option<PathBuf>,
        forced_file: Option<PathBuf>,
    ) -> Self {
        Self {
            name: name.to_string(),
            cwd_file,
            user_file,
            forced_file,
            table: toml::Table::new(),
        }
    }

    /// A store that never touches the disk
    pub fn in_memory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cwd_file: PathBuf::new(),
            user_file: None,
            forced_file: None,
            table: toml::Table::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn read_files(&self) -> Vec<&Path> {
        let mut files = Vec::new();
        if !self.cwd_file.as_os_str().is_empty() && self.cwd_file.is_file() {
            files.push(self.cwd_file.as_path());
        }
        if let Some(user) = self.user_file.as_deref().filter(|p| p.is_file()) {
            files.push(user);
        }
        if let Some(forced) = self.forced_file.as_deref().filter(|p| p.is_file()) {
            files.push(forced);
        }
        files
    }

    /// File that `save` writes to
    pub fn write_file(&self) -> Option<&Path> {
        self.forced_file.as_deref().or(self.user_file.as_deref())
    }

    /// Read all config files. Returns `None` when none is readable.
    pub fn load(&mut self) -> Result<Option<Vec<PathBuf>>, ConfigError> {
        let files: Vec<PathBuf> = self.read_files().into_iter().map(Path::to_path_buf).collect();
        if files.is_empty() {
            debug!(target: "config", "No config file found for {}", self.name);
            return Ok(None);
        }

        for path in &files {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let parsed: toml::Table =
                toml::from_str(&content).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
            merge(&mut self.table, parsed);
            info!(target: "config", "Loaded config from {}", path.display());
        }
        Ok(Some(files))
    }

    /// Write the store. Returns `None` when there is no write location.
    pub fn save(&self) -> Result<Option<PathBuf>, ConfigError> {
        let Some(path) = self.write_file() else {
            return Ok(None);
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = toml::to_string_pretty(&self.table)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(target: "config", "Saved config to {}", path.display());
        Ok(Some(path.to_path_buf()))
    }

    /// Project a section onto `defaults`.
    ///
    /// Keys missing from the section are written with their default. Present
    /// keys are coerced to the type of their default; values that cannot be
    /// coerced fall back to the default.
    pub fn get_section(
        &mut self,
        section: &str,
        defaults: &BTreeMap<String, Value>,
    ) -> BTreeMap<String, Value> {
        let mut table = take_section(&mut self.table, section);
        let mut result = BTreeMap::new();

        for (key, default) in defaults {
            let value = match table.get(key) {
                Some(raw) => coerce(default, raw).unwrap_or_else(|| {
                    warn!(
                        target: "config",
                        "Ignoring [{}] {} = {}: not a valid {}",
                        section,
                        key,
                        raw,
                        default.field_type()
                    );
                    default.clone()
                }),
                None => {
                    table.insert(key.clone(), to_toml(default));
                    default.clone()
                }
            };
            result.insert(key.clone(), value);
        }
        self.table
            .insert(section.to_string(), toml::Value::Table(table));
        result
    }

    /// Replace the given keys of a section
    pub fn set_section(&mut self, section: &str, values: &BTreeMap<String, Value>) {
        let mut table = take_section(&mut self.table, section);
        for (key, value) in values {
            table.insert(key.clone(), to_toml(value));
        }
        self.table
            .insert(section.to_string(), toml::Value::Table(table));
    }

    /// Raw section, if present
    pub fn section(&self, section: &str) -> Option<&toml::Table> {
        self.table.get(section).and_then(toml::Value::as_table)
    }

    /// Deserialize a section into a typed settings struct
    pub fn typed_section<T>(&self, section: &str) -> Result<T, ConfigError>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match self.section(section) {
            Some(table) => toml::Value::Table(table.clone())
                .try_into()
                .map_err(|source| ConfigError::Section {
                    section: section.to_string(),
                    source,
                }),
            None => Ok(T::default()),
        }
    }
}

fn take_section(table: &mut toml::Table, section: &str) -> toml::Table {
    match table.remove(section) {
        Some(toml::Value::Table(t)) => t,
        Some(other) => {
            warn!(target: "config", "Replacing non-table entry {} = {} with a section", section, other);
            toml::Table::new()
        }
        None => toml::Table::new(),
    }
}

fn merge(into: &mut toml::Table, from: toml::Table) {
    for (key, value) in from {
        match (into.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge(existing, incoming)
            }
            (_, value) => {
                into.insert(key, value);
            }
        }
    }
}

fn to_toml(value: &Value) -> toml::Value {
    match value {
        Value::Bool(b) => toml::Value::Boolean(*b),
        Value::Int(i) => toml::Value::Integer(*i),
        Value::Str(s) => toml::Value::String(s.clone()),
    }
}

/// Coerce a stored value to the type of `default`. Empty strings count as
/// absent.
fn coerce(default: &Value, raw: &toml::Value) -> Option<Value> {
    if let toml::Value::String(s) = raw {
        if s.is_empty() {
            return None;
        }
    }
    match (default, raw) {
        (Value::Bool(_), toml::Value::Boolean(b)) => Some(Value::Bool(*b)),
        (Value::Bool(_), toml::Value::Integer(i)) => Some(Value::Bool(*i != 0)),
        (Value::Bool(_), toml::Value::String(s)) => Some(Value::Bool(matches!(
            s.to_ascii_lowercase().as_str(),
            "on" | "1" | "true"
        ))),
        (Value::Int(_), toml::Value::Integer(i)) => Some(Value::Int(*i)),
        (Value::Int(_), toml::Value::String(s)) => s.trim().parse().ok().map(Value::Int),
        (Value::Str(_), toml::Value::String(s)) => Some(Value::Str(s.clone())),
        (Value::Str(_), toml::Value::Integer(i)) => Some(Value::Str(i.to_string())),
        (Value::Str(_), toml::Value::Boolean(b)) => Some(Value::Str(b.to_string())),
        (Value::Str(_), toml::Value::Float(f)) => Some(Value::Str(f.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn defaults() -> BTreeMap<String, Value> {
        BTreeMap::from([
            ("level".to_string(), Value::Int(10)),
            ("mute".to_string(), Value::Bool(false)),
            ("label".to_string(), Value::Str("hall".to_string())),
        ])
    }

    fn store_in(dir: &TempDir) -> ConfigStore {
        ConfigStore::with_paths(
            "test",
            dir.path().join("cwd.toml"),
            Some(dir.path().join("user").join("test.toml")),
            None,
        )
    }

    #[test]
    fn test_load_without_files() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_get_section_writes_defaults() {
        let mut store = ConfigStore::in_memory("test");
        let values = store.get_section("mixer", &defaults());
        assert_eq!(values, defaults());
        let section = store.section("mixer").unwrap();
        assert_eq!(section.get("level"), Some(&toml::Value::Integer(10)));
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let mut values = defaults();
        values.insert("level".to_string(), Value::Int(42));
        store.set_section("mixer", &values);
        let path = store.save().unwrap().unwrap();
        assert!(path.ends_with("user/test.toml"));

        let mut fresh = store_in(&dir);
        let paths = fresh.load().unwrap().unwrap();
        assert_eq!(paths, vec![path]);
        assert_eq!(fresh.get_section("mixer", &defaults()), values);
    }

    #[test]
    fn test_coercion_from_strings() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("cwd.toml");
        fs::write(
            &file,
            "[mixer]\nlevel = \"7\"\nmute = \"On\"\nlabel = \"\"\n",
        )
        .unwrap();
        let mut store = store_in(&dir);
        store.load().unwrap();
        let values = store.get_section("mixer", &defaults());
        assert_eq!(values["level"], Value::Int(7));
        assert_eq!(values["mute"], Value::Bool(true));
        assert_eq!(values["label"], Value::Str("hall".to_string()));
    }

    #[test]
    fn test_uncoercible_value_uses_default() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cwd.toml"), "[mixer]\nlevel = \"loud\"\n").unwrap();
        let mut store = store_in(&dir);
        store.load().unwrap();
        assert_eq!(store.get_section("mixer", &defaults())["level"], Value::Int(10));
    }

    #[test]
    fn test_later_files_override() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cwd.toml"), "[mixer]\nlevel = 1\nmute = true\n").unwrap();
        let forced = dir.path().join("forced.toml");
        fs::write(&forced, "[mixer]\nlevel = 2\n").unwrap();
        let mut store = ConfigStore::with_paths(
            "test",
            dir.path().join("cwd.toml"),
            None,
            Some(forced.clone()),
        );
        assert_eq!(store.load().unwrap().unwrap().len(), 2);
        let values = store.get_section("mixer", &defaults());
        assert_eq!(values["level"], Value::Int(2));
        assert_eq!(values["mute"], Value::Bool(true));
        assert_eq!(store.write_file(), Some(forced.as_path()));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cwd.toml"), "[mixer\n").unwrap();
        let mut store = store_in(&dir);
        assert!(matches!(store.load(), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_in_memory_save_has_no_target() {
        let store = ConfigStore::in_memory("test");
        assert!(store.save().unwrap().is_none());
    }
}
