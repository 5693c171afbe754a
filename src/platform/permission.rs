use async_trait::async_trait;

use crate::model::{TenantId, UserId};

/// 权限解析器
///
/// 版主（拥有消息管理权限的成员）的消息跳过所有自动审核检查。
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn is_moderator(&self, tenant_id: TenantId, user_id: UserId) -> bool;
}
