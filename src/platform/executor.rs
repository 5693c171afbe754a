use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ChannelId, MessageId, RoleId, TenantId, UserId};

/// 动作执行器的失败结果
///
/// 平台操作必须区分“无权限”和“目标不存在”，不能抛出不透明的错误。
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ActionError {
    /// 权限不足
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// 目标不存在（消息已删除、角色已移除、成员已离开）
    #[error("not found: {0}")]
    NotFound(String),
    /// 其它技术性失败（网络、平台异常）
    #[error("failed: {0}")]
    Failed(String),
}

pub type ActionResult<T> = std::result::Result<T, ActionError>;

/// 平台动作执行器（能力接口）
///
/// 审核引擎只通过这个接口对平台产生副作用。
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// 删除消息
    async fn delete_message(
        &self,
        tenant_id: TenantId,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> ActionResult<()>;

    /// 授予角色
    async fn grant_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> ActionResult<()>;

    /// 移除角色。角色本就不存在时应返回 Ok 或 NotFound，两者都视为成功
    async fn revoke_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> ActionResult<()>;

    /// 查询用户当前是否持有角色
    async fn has_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> ActionResult<bool>;

    /// 平台原生的限时禁言
    async fn timebox_restrict(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        duration: Duration,
        reason: &str,
    ) -> ActionResult<()>;

    /// 解除平台原生的限时禁言
    async fn lift_restriction(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        reason: &str,
    ) -> ActionResult<()>;

    /// 踢出社区
    async fn kick(&self, tenant_id: TenantId, user_id: UserId, reason: &str) -> ActionResult<()>;

    /// 永久封禁
    async fn ban(&self, tenant_id: TenantId, user_id: UserId, reason: &str) -> ActionResult<()>;

    /// 解除封禁
    async fn unban(&self, tenant_id: TenantId, user_id: UserId, reason: &str)
        -> ActionResult<()>;

    /// 是否支持原生限时禁言
    fn supports_timebox(&self) -> bool {
        true
    }

    /// 按名称（大小写不敏感）查找角色，用于未配置禁言角色时的回退
    async fn find_role_by_name(
        &self,
        _tenant_id: TenantId,
        _names: &[String],
    ) -> ActionResult<Option<RoleId>> {
        Ok(None)
    }
}
