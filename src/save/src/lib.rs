//! 存档系统
//!
//! 整个游戏状态被序列化为一个带版本号的 JSON 信封 `{version, lastSaved, state}`，
//! 写入键值存储中的单个键。读取时：
//! - 没有存档返回 `Ok(None)`
//! - 版本高于当前支持的版本返回 [`GameError::UnsupportedVersion`]
//! - JSON 损坏时删除该条目并返回 [`GameError::CorruptedSave`]

pub mod store;

pub use store::{FileStore, KeyValueStore, MemoryStore};

use error::GameError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Current save format version
pub const SAVE_VERSION: u32 = 2;

/// Default storage key for the single save slot.
pub const DEFAULT_SAVE_KEY: &str = "tile-adventure-save";

/// 存档信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEnvelope<T> {
    pub version: u32,
    /// Milliseconds since the Unix epoch.
    pub last_saved: u64,
    pub state: T,
}

/// Rewrites a raw `state` value saved by an older version into the current shape.
pub type Migration = fn(state: &mut serde_json::Value, from_version: u32);

/// Reads and writes the versioned envelope through a [`KeyValueStore`].
pub struct SaveManager<S: KeyValueStore> {
    store: S,
    key: String,
    supported_version: u32,
    migration: Option<Migration>,
}

impl<S: KeyValueStore> SaveManager<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            supported_version: SAVE_VERSION,
            migration: None,
        }
    }

    pub fn with_migration(mut self, migration: Migration) -> Self {
        self.migration = Some(migration);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn has_save(&self) -> bool {
        matches!(self.store.get(&self.key), Ok(Some(_)))
    }

    /// 保存游戏状态，返回写入的时间戳
    pub fn save<T: Serialize>(&mut self, state: &T) -> Result<u64, GameError> {
        let last_saved = now_millis();
        let envelope = SaveEnvelope {
            version: self.supported_version,
            last_saved,
            state,
        };
        let json = serde_json::to_string(&envelope)
            .map_err(|e| GameError::SerializationError(e.to_string()))?;
        self.store.set(&self.key, &json)?;
        tracing::debug!(key = %self.key, bytes = json.len(), "save written");
        Ok(last_saved)
    }

    /// 加载游戏状态
    pub fn load<T: DeserializeOwned>(&mut self) -> Result<Option<SaveEnvelope<T>>, GameError> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(None);
        };

        let mut envelope: SaveEnvelope<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(err) => return Err(self.discard(err)),
        };

        if envelope.version > self.supported_version {
            tracing::warn!(
                found = envelope.version,
                supported = self.supported_version,
                "save written by a newer version, refusing to load"
            );
            return Err(GameError::UnsupportedVersion {
                found: envelope.version,
                supported: self.supported_version,
            });
        }

        if envelope.version < self.supported_version {
            if let Some(migrate) = self.migration {
                migrate(&mut envelope.state, envelope.version);
            }
            tracing::info!(
                from = envelope.version,
                to = self.supported_version,
                "migrated legacy save"
            );
            envelope.version = self.supported_version;
        }

        let state = match serde_json::from_value(envelope.state) {
            Ok(state) => state,
            Err(err) => return Err(self.discard(err)),
        };

        Ok(Some(SaveEnvelope {
            version: envelope.version,
            last_saved: envelope.last_saved,
            state,
        }))
    }

    /// 删除存档
    pub fn clear(&mut self) -> Result<(), GameError> {
        self.store.remove(&self.key)
    }

    fn discard(&mut self, err: serde_json::Error) -> GameError {
        tracing::error!(key = %self.key, error = %err, "corrupted save discarded");
        if let Err(remove_err) = self.store.remove(&self.key) {
            tracing::warn!(error = %remove_err, "failed to remove corrupted save");
        }
        GameError::CorruptedSave
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// 自动保存节流：两次自动保存之间至少间隔 `interval`
#[derive(Debug, Clone)]
pub struct AutoSave {
    pub interval: Duration,
    pub last_save: Option<Instant>,
}

impl AutoSave {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_save: None,
        }
    }

    /// 检查是否需要自动保存
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_save {
            Some(last) => now.duration_since(last) >= self.interval,
            None => true,
        }
    }

    pub fn mark_saved(&mut self, now: Instant) {
        self.last_save = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Progress {
        depth: u32,
        #[serde(default)]
        gold: u32,
    }

    fn manager() -> SaveManager<MemoryStore> {
        SaveManager::new(MemoryStore::new(), DEFAULT_SAVE_KEY)
    }

    #[test]
    fn load_without_save_is_none() {
        let mut saves = manager();
        assert!(saves.load::<Progress>().unwrap().is_none());
        assert!(!saves.has_save());
    }

    #[test]
    fn envelope_uses_camel_case_fields() {
        let mut saves = manager();
        saves.save(&Progress { depth: 3, gold: 10 }).unwrap();
        let raw = saves.store().get(DEFAULT_SAVE_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], SAVE_VERSION);
        assert!(value["lastSaved"].as_u64().unwrap() > 0);
        assert_eq!(value["state"]["depth"], 3);
    }

    #[test]
    fn round_trip_preserves_state() {
        let mut saves = manager();
        let state = Progress { depth: 4, gold: 99 };
        let stamp = saves.save(&state).unwrap();
        let loaded = saves.load::<Progress>().unwrap().unwrap();
        assert_eq!(loaded.state, state);
        assert_eq!(loaded.last_saved, stamp);
        assert_eq!(loaded.version, SAVE_VERSION);
    }

    #[test]
    fn newer_version_is_rejected_but_kept() {
        let mut saves = manager();
        saves
            .store_mut()
            .set(
                DEFAULT_SAVE_KEY,
                r#"{"version":99,"lastSaved":1,"state":{"depth":1}}"#,
            )
            .unwrap();
        let err = saves.load::<Progress>().unwrap_err();
        assert!(matches!(
            err,
            GameError::UnsupportedVersion { found: 99, supported: SAVE_VERSION }
        ));
        assert!(saves.has_save());
    }

    #[test]
    fn corrupt_json_clears_the_entry() {
        let mut saves = manager();
        saves.store_mut().set(DEFAULT_SAVE_KEY, "{\"version\": 2, ").unwrap();
        let err = saves.load::<Progress>().unwrap_err();
        assert!(matches!(err, GameError::CorruptedSave));
        assert!(!saves.has_save());
    }

    #[test]
    fn state_shape_mismatch_is_treated_as_corruption() {
        let mut saves = manager();
        saves
            .store_mut()
            .set(
                DEFAULT_SAVE_KEY,
                r#"{"version":2,"lastSaved":1,"state":{"depth":"deep"}}"#,
            )
            .unwrap();
        assert!(matches!(
            saves.load::<Progress>().unwrap_err(),
            GameError::CorruptedSave
        ));
        assert!(saves.store().is_empty());
    }

    #[test]
    fn legacy_saves_are_migrated() {
        fn migrate(state: &mut serde_json::Value, from: u32) {
            if from < 2 {
                state["gold"] = serde_json::json!(state["coins"].as_u64().unwrap_or(0));
            }
        }

        let mut saves = manager().with_migration(migrate);
        saves
            .store_mut()
            .set(
                DEFAULT_SAVE_KEY,
                r#"{"version":1,"lastSaved":5,"state":{"depth":2,"coins":7}}"#,
            )
            .unwrap();
        let loaded = saves.load::<Progress>().unwrap().unwrap();
        assert_eq!(loaded.state, Progress { depth: 2, gold: 7 });
        assert_eq!(loaded.version, SAVE_VERSION);
    }

    #[test]
    fn auto_save_respects_interval() {
        let start = Instant::now();
        let mut auto = AutoSave::new(Duration::from_secs(30));
        assert!(auto.is_due(start));
        auto.mark_saved(start);
        assert!(!auto.is_due(start + Duration::from_secs(10)));
        assert!(auto.is_due(start + Duration::from_secs(30)));
    }
}
