//! 游戏错误处理模块
//!
//! 处理回合核心运行过程中可能出现的各种错误：存档、序列化、IO、
//! 平台协作者（指针捕获、音频、坐标转换）以及协作者缺失等契约错误。

use thiserror::Error;

/// 游戏运行过程中可能出现的错误类型
#[derive(Debug, Error)]
pub enum GameError {
    /// 存档系统错误
    #[error("Save system error: {0}")]
    SaveError(#[from] anyhow::Error),

    /// IO操作错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// 存档数据损坏（已丢弃）
    #[error("Corrupted save data")]
    CorruptedSave,

    /// 存档版本高于当前支持的版本
    #[error("Unsupported save version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// 游戏状态无效
    #[error("Invalid game state: {0}")]
    InvalidGameState(String),

    /// 必需的协作者未配置
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// 配置文件错误
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// 屏幕坐标无法转换为格子坐标
    #[error("Viewport error: {0}")]
    ViewportError(String),

    /// 平台暂时性失败（指针捕获、音频自动播放等）
    #[error("Platform error: {0}")]
    PlatformError(String),
}

impl From<serde_json::Error> for GameError {
    fn from(err: serde_json::Error) -> Self {
        // 语法或数据错误意味着存档损坏，IO 错误单独上报
        if err.is_io() {
            GameError::IoError(err.into())
        } else if err.is_syntax() || err.is_data() || err.is_eof() {
            GameError::CorruptedSave
        } else {
            GameError::SerializationError(err.to_string())
        }
    }
}

impl GameError {
    /// Transient platform failures are logged and ignored by callers.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GameError::PlatformError(_) | GameError::ViewportError(_)
        )
    }
}

/// 处理游戏错误并转换为用户友好的消息
pub fn handle_error(error: &GameError) -> String {
    match error {
        GameError::CorruptedSave => "存档数据已损坏，已重新开始".to_string(),
        GameError::UnsupportedVersion { found, .. } => {
            format!("存档版本不兼容: {}", found)
        }
        GameError::IoError(e) => match e.kind() {
            std::io::ErrorKind::NotFound => "存档文件不存在".to_string(),
            std::io::ErrorKind::PermissionDenied => "没有权限访问存档文件".to_string(),
            _ => format!("IO错误: {}", e),
        },
        _ => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_maps_to_corrupted_save() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(GameError::from(err), GameError::CorruptedSave));
    }

    #[test]
    fn transient_errors_are_flagged() {
        assert!(GameError::PlatformError("capture".into()).is_transient());
        assert!(!GameError::CorruptedSave.is_transient());
    }

    #[test]
    fn version_message_is_user_friendly() {
        let msg = handle_error(&GameError::UnsupportedVersion {
            found: 9,
            supported: 2,
        });
        assert!(msg.contains('9'));
    }
}
