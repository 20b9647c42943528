//! 键值存储后端（本地存储的替代）

use anyhow::Context;
use error::GameError;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A string key-value store, the persistence collaborator's storage medium.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, GameError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), GameError>;
    fn remove(&mut self, key: &str) -> Result<(), GameError>;
}

/// In-memory store, used by tests and when no save directory is configured.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, GameError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), GameError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), GameError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// 文件存储：每个键对应存档目录中的一个 `<key>.json` 文件
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// 初始化存储（目录不存在时创建）
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, GameError> {
        let dir = dir.as_ref();
        if !dir.exists() {
            fs::create_dir_all(dir).context("Failed to create save directory")?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{sanitized}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, GameError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), GameError> {
        let path = self.path_for(key);

        // 先写临时文件，再原子性重命名
        let temp_path = path.with_extension("tmp");
        let mut file =
            fs::File::create(&temp_path).context("Failed to create temporary save file")?;
        file.write_all(value.as_bytes())
            .context("Failed to write save data")?;
        file.flush().context("Failed to flush save data")?;
        fs::rename(temp_path, path).context("Failed to commit save file")?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), GameError> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path).context("Failed to delete save file")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("saves")).unwrap();
        assert_eq!(store.get("slot").unwrap(), None);

        store.set("slot", "{\"a\":1}").unwrap();
        assert_eq!(store.get("slot").unwrap().as_deref(), Some("{\"a\":1}"));
        assert!(store.dir().join("slot.json").exists());

        store.remove("slot").unwrap();
        assert_eq!(store.get("slot").unwrap(), None);
        // removing twice is fine
        store.remove("slot").unwrap();
    }

    #[test]
    fn keys_are_sanitized_into_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path()).unwrap();
        store.set("../escape:me", "x").unwrap();
        assert!(dir.path().join("___escape_me.json").exists());
    }
}
