//! 房间信息模块的错误类型

use thiserror::Error;

/// 房间信息远程 / 本地操作的领域错误
#[derive(Error, Debug)]
pub enum RoomInfoError {
    /// 服务器上不存在对应的房间或用户
    #[error("记录不存在: {0}")]
    NotFound(String),

    /// 权限或认证被拒绝
    #[error("未授权: {0}")]
    Unauthorized(String),

    /// 网络 / 超时类错误
    #[error("网络错误: {0}")]
    Transient(String),

    /// 响应缺少必需字段或无法解析
    #[error("响应格式错误: {0}")]
    Malformed(String),

    /// 本地存储错误
    #[error("本地存储错误: {0}")]
    Storage(#[from] anyhow::Error),
}

impl RoomInfoError {
    /// 错误类别名称，用于日志
    pub fn kind(&self) -> &'static str {
        match self {
            RoomInfoError::NotFound(_) => "NotFound",
            RoomInfoError::Unauthorized(_) => "Unauthorized",
            RoomInfoError::Transient(_) => "Transient",
            RoomInfoError::Malformed(_) => "Malformed",
            RoomInfoError::Storage(_) => "Storage",
        }
    }
}

impl From<reqwest::Error> for RoomInfoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RoomInfoError::Malformed(e.to_string())
        } else {
            RoomInfoError::Transient(e.to_string())
        }
    }
}

pub type RoomInfoResult<T> = std::result::Result<T, RoomInfoError>;
