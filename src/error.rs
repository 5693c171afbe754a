use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::ActionError;

/// 审核引擎错误类型
///
/// 引擎正常运行范围内的错误都不是致命的：配置缺失回落到默认值，
/// 能力缺失和授权失败在动作点降级处理。这里的错误只会返回给
/// 手动审核操作和配置校验的调用方。
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ModerationError {
    /// 参数校验失败（范围、格式）
    #[error("Validation error: {0}")]
    Validation(String),
    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// 动作执行器返回的失败
    #[error("Action failed: {0}")]
    Action(#[from] ActionError),
    /// 所需能力不可用（例如没有可用的禁言角色）
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),
    /// 目标状态与请求冲突（例如已被禁言）
    #[error("Conflict: {0}")]
    Conflict(String),
    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ModerationError>;
