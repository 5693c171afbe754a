use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use super::executor::{ActionError, ActionExecutor, ActionResult};
use super::permission::PermissionResolver;
use crate::model::{ChannelId, MessageId, RoleId, TenantId, UserId};

/// 平台操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformOp {
    DeleteMessage,
    GrantRole,
    RevokeRole,
    HasRole,
    TimeboxRestrict,
    LiftRestriction,
    Kick,
    Ban,
    Unban,
}

/// 已执行的平台操作记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutedAction {
    pub op: PlatformOp,
    pub tenant_id: TenantId,
    pub target: u64,
    pub detail: String,
}

/// 内存平台（用于测试和离线回放）
///
/// 同时实现动作执行器和权限解析器，不调用真实 API，只维护内存状态并打印日志。
/// 可以按操作类型注入“无权限”或“技术失败”来模拟平台异常。
pub struct InMemoryPlatform {
    roles: DashMap<(TenantId, UserId), HashSet<RoleId>>,
    role_names: DashMap<(TenantId, String), RoleId>,
    moderators: DashSet<(TenantId, UserId)>,
    deleted_messages: DashSet<(TenantId, MessageId)>,
    restrictions: DashMap<(TenantId, UserId), Duration>,
    kicked: DashSet<(TenantId, UserId)>,
    banned: DashSet<(TenantId, UserId)>,
    forbidden: DashSet<PlatformOp>,
    failing: DashSet<PlatformOp>,
    timebox_supported: AtomicBool,
    journal: Mutex<Vec<ExecutedAction>>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self {
            roles: DashMap::new(),
            role_names: DashMap::new(),
            moderators: DashSet::new(),
            deleted_messages: DashSet::new(),
            restrictions: DashMap::new(),
            kicked: DashSet::new(),
            banned: DashSet::new(),
            forbidden: DashSet::new(),
            failing: DashSet::new(),
            timebox_supported: AtomicBool::new(true),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// 注册一个具名角色
    pub fn define_role(&self, tenant_id: TenantId, name: &str, role_id: RoleId) {
        self.role_names
            .insert((tenant_id, name.to_lowercase()), role_id);
    }

    pub fn add_moderator(&self, tenant_id: TenantId, user_id: UserId) {
        self.moderators.insert((tenant_id, user_id));
    }

    /// 直接给成员加角色（不经过执行器，不记录日志）
    pub fn assign_role(&self, tenant_id: TenantId, user_id: UserId, role_id: RoleId) {
        self.roles
            .entry((tenant_id, user_id))
            .or_default()
            .insert(role_id);
    }

    pub fn forbid(&self, op: PlatformOp) {
        self.forbidden.insert(op);
    }

    pub fn allow(&self, op: PlatformOp) {
        self.forbidden.remove(&op);
        self.failing.remove(&op);
    }

    pub fn fail(&self, op: PlatformOp) {
        self.failing.insert(op);
    }

    pub fn set_timebox_supported(&self, supported: bool) {
        self.timebox_supported.store(supported, Ordering::Relaxed);
    }

    pub fn user_has_role(&self, tenant_id: TenantId, user_id: UserId, role_id: RoleId) -> bool {
        self.roles
            .get(&(tenant_id, user_id))
            .map(|roles| roles.contains(&role_id))
            .unwrap_or(false)
    }

    pub fn is_message_deleted(&self, tenant_id: TenantId, message_id: MessageId) -> bool {
        self.deleted_messages.contains(&(tenant_id, message_id))
    }

    pub fn restriction(&self, tenant_id: TenantId, user_id: UserId) -> Option<Duration> {
        self.restrictions.get(&(tenant_id, user_id)).map(|d| *d)
    }

    pub fn is_kicked(&self, tenant_id: TenantId, user_id: UserId) -> bool {
        self.kicked.contains(&(tenant_id, user_id))
    }

    pub fn is_banned(&self, tenant_id: TenantId, user_id: UserId) -> bool {
        self.banned.contains(&(tenant_id, user_id))
    }

    /// 已执行操作的快照
    pub fn journal(&self) -> Vec<ExecutedAction> {
        self.journal.lock().clone()
    }

    pub fn count_ops(&self, op: PlatformOp) -> usize {
        self.journal.lock().iter().filter(|a| a.op == op).count()
    }

    fn guard(&self, op: PlatformOp) -> ActionResult<()> {
        if self.forbidden.contains(&op) {
            return Err(ActionError::Forbidden(format!("{:?} not permitted", op)));
        }
        if self.failing.contains(&op) {
            return Err(ActionError::Failed(format!("{:?} unavailable", op)));
        }
        Ok(())
    }

    fn record(&self, op: PlatformOp, tenant_id: TenantId, target: u64, detail: String) {
        info!(
            "[MEMORY PLATFORM] {:?}: tenant={}, target={}, {}",
            op, tenant_id, target, detail
        );
        self.journal.lock().push(ExecutedAction {
            op,
            tenant_id,
            target,
            detail,
        });
    }
}

impl Default for InMemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionExecutor for InMemoryPlatform {
    async fn delete_message(
        &self,
        tenant_id: TenantId,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> ActionResult<()> {
        self.guard(PlatformOp::DeleteMessage)?;
        if !self.deleted_messages.insert((tenant_id, message_id)) {
            return Err(ActionError::NotFound(format!("message {}", message_id)));
        }
        self.record(
            PlatformOp::DeleteMessage,
            tenant_id,
            message_id,
            format!("channel={}", channel_id),
        );
        Ok(())
    }

    async fn grant_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> ActionResult<()> {
        self.guard(PlatformOp::GrantRole)?;
        self.assign_role(tenant_id, user_id, role_id);
        self.record(
            PlatformOp::GrantRole,
            tenant_id,
            user_id,
            format!("role={}, reason={}", role_id, reason),
        );
        Ok(())
    }

    async fn revoke_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> ActionResult<()> {
        self.guard(PlatformOp::RevokeRole)?;
        let removed = self
            .roles
            .get_mut(&(tenant_id, user_id))
            .map(|mut roles| roles.remove(&role_id))
            .unwrap_or(false);
        if !removed {
            return Err(ActionError::NotFound(format!("role {}", role_id)));
        }
        self.record(
            PlatformOp::RevokeRole,
            tenant_id,
            user_id,
            format!("role={}, reason={}", role_id, reason),
        );
        Ok(())
    }

    async fn has_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> ActionResult<bool> {
        self.guard(PlatformOp::HasRole)?;
        Ok(self.user_has_role(tenant_id, user_id, role_id))
    }

    async fn timebox_restrict(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        duration: Duration,
        reason: &str,
    ) -> ActionResult<()> {
        self.guard(PlatformOp::TimeboxRestrict)?;
        self.restrictions.insert((tenant_id, user_id), duration);
        self.record(
            PlatformOp::TimeboxRestrict,
            tenant_id,
            user_id,
            format!("duration={}s, reason={}", duration.as_secs(), reason),
        );
        Ok(())
    }

    async fn lift_restriction(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        reason: &str,
    ) -> ActionResult<()> {
        self.guard(PlatformOp::LiftRestriction)?;
        if self.restrictions.remove(&(tenant_id, user_id)).is_none() {
            return Err(ActionError::NotFound(format!("restriction for {}", user_id)));
        }
        self.record(
            PlatformOp::LiftRestriction,
            tenant_id,
            user_id,
            format!("reason={}", reason),
        );
        Ok(())
    }

    async fn kick(&self, tenant_id: TenantId, user_id: UserId, reason: &str) -> ActionResult<()> {
        self.guard(PlatformOp::Kick)?;
        self.kicked.insert((tenant_id, user_id));
        self.record(
            PlatformOp::Kick,
            tenant_id,
            user_id,
            format!("reason={}", reason),
        );
        Ok(())
    }

    async fn ban(&self, tenant_id: TenantId, user_id: UserId, reason: &str) -> ActionResult<()> {
        self.guard(PlatformOp::Ban)?;
        self.banned.insert((tenant_id, user_id));
        self.record(
            PlatformOp::Ban,
            tenant_id,
            user_id,
            format!("reason={}", reason),
        );
        Ok(())
    }

    async fn unban(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        reason: &str,
    ) -> ActionResult<()> {
        self.guard(PlatformOp::Unban)?;
        if self.banned.remove(&(tenant_id, user_id)).is_none() {
            return Err(ActionError::NotFound(format!("ban for {}", user_id)));
        }
        self.record(
            PlatformOp::Unban,
            tenant_id,
            user_id,
            format!("reason={}", reason),
        );
        Ok(())
    }

    fn supports_timebox(&self) -> bool {
        self.timebox_supported.load(Ordering::Relaxed)
    }

    async fn find_role_by_name(
        &self,
        tenant_id: TenantId,
        names: &[String],
    ) -> ActionResult<Option<RoleId>> {
        Ok(names.iter().find_map(|name| {
            self.role_names
                .get(&(tenant_id, name.to_lowercase()))
                .map(|role| *role)
        }))
    }
}

#[async_trait]
impl PermissionResolver for InMemoryPlatform {
    async fn is_moderator(&self, tenant_id: TenantId, user_id: UserId) -> bool {
        self.moderators.contains(&(tenant_id, user_id))
    }
}
