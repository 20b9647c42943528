//! Runtime configuration.
//!
//! Every timing constant of the turn core lives here so tests and the binary
//! can tune them. Missing files fall back to defaults; a malformed file is an
//! error.

use error::GameError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// 世界种子；`None` 时由启动时间派生
    pub seed: Option<u64>,
    pub zone_width: i32,
    pub zone_height: i32,
    pub turn: TurnConfig,
    pub input: InputConfig,
    pub save: SaveConfig,
    pub log_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Pause after each enemy acts.
    pub enemy_move_delay_ms: u64,
    /// How long a player attack takes to resolve before enemies may act.
    pub attack_resolution_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Presses held longer than this count as taps regardless of movement.
    pub tap_max_duration_ms: u64,
    pub tap_max_distance: f32,
    pub swipe_min_distance: f32,
    pub double_tap_window_ms: u64,
    pub double_tap_tolerance: f32,
    pub path_step_delay_ms: u64,
    /// Open the radial menu as soon as a touch lands on the player's tile.
    pub radial_menu_on_press: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    pub directory: PathBuf,
    pub key: String,
    /// 每次敌人阶段结束后自动保存
    pub autosave: bool,
    pub autosave_interval_secs: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            seed: None,
            zone_width: 21,
            zone_height: 13,
            turn: TurnConfig::default(),
            input: InputConfig::default(),
            save: SaveConfig::default(),
            log_file: PathBuf::from("tile_adventure.log"),
        }
    }
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            enemy_move_delay_ms: 150,
            attack_resolution_ms: 120,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            tap_max_duration_ms: 250,
            tap_max_distance: 10.0,
            swipe_min_distance: 30.0,
            double_tap_window_ms: 300,
            double_tap_tolerance: 20.0,
            path_step_delay_ms: 150,
            radial_menu_on_press: true,
        }
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("saves"),
            key: save::DEFAULT_SAVE_KEY.to_string(),
            autosave: true,
            autosave_interval_secs: 0,
        }
    }
}

impl GameConfig {
    /// 从 JSON 文件加载配置，文件不存在时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GameError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| GameError::ConfigError(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GameError> {
        if self.zone_width < 7 || self.zone_height < 7 {
            return Err(GameError::ConfigError(format!(
                "zone must be at least 7x7, got {}x{}",
                self.zone_width, self.zone_height
            )));
        }
        if self.input.swipe_min_distance <= self.input.tap_max_distance {
            return Err(GameError::ConfigError(
                "swipe_min_distance must exceed tap_max_distance".into(),
            ));
        }
        Ok(())
    }
}

impl TurnConfig {
    pub fn enemy_move_delay(&self) -> Duration {
        Duration::from_millis(self.enemy_move_delay_ms)
    }

    pub fn attack_resolution(&self) -> Duration {
        Duration::from_millis(self.attack_resolution_ms)
    }
}

impl InputConfig {
    pub fn tap_max_duration(&self) -> Duration {
        Duration::from_millis(self.tap_max_duration_ms)
    }

    pub fn double_tap_window(&self) -> Duration {
        Duration::from_millis(self.double_tap_window_ms)
    }

    pub fn path_step_delay(&self) -> Duration {
        Duration::from_millis(self.path_step_delay_ms)
    }
}

impl SaveConfig {
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }
}
