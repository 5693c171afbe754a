use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use super::config_store::TenantConfigStore;
use super::escalation::EscalationEngine;
use super::reversal::{PendingReversal, ReversalScheduler};
use super::warning_ledger::WarningLedger;
use crate::domain::events::{ManualActionKind, ManualActionRecord, ModerationEvent};
use crate::error::{ModerationError, Result};
use crate::infra::NotificationSink;
use crate::model::{RoleId, TenantId, UserId};
use crate::platform::{ActionError, ActionExecutor};

/// 手动限时禁言的最长时长（28 天）
pub const MAX_TIMEOUT_MINUTES: u64 = 40_320;

/// 手动审核操作
///
/// 版主命令在引擎侧的实现，命令解析和调用方鉴权不在这里。
/// 与自动审核不同，这里的失败会返回给调用方。每次成功操作都会发出一条记录。
pub struct ManualModeration {
    executor: Arc<dyn ActionExecutor>,
    store: Arc<TenantConfigStore>,
    ledger: Arc<WarningLedger>,
    escalation: Arc<EscalationEngine>,
    reversals: Arc<ReversalScheduler>,
    sink: Arc<dyn NotificationSink>,
}

impl ManualModeration {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        store: Arc<TenantConfigStore>,
        ledger: Arc<WarningLedger>,
        escalation: Arc<EscalationEngine>,
        reversals: Arc<ReversalScheduler>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            executor,
            store,
            ledger,
            escalation,
            reversals,
            sink,
        }
    }

    /// 手动警告（只计数，不触发升级）
    pub fn warn(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        moderator_id: UserId,
        reason: &str,
    ) -> u32 {
        let count = self.ledger.add_warning(tenant_id, user_id);
        info!(
            "⚠️ 手动警告: tenant={}, user={}, moderator={}, warnings={}",
            tenant_id, user_id, moderator_id, count
        );
        self.emit(
            tenant_id,
            user_id,
            moderator_id,
            ManualActionKind::Warn,
            reason,
            None,
            Some(count),
        );
        count
    }

    pub fn warnings(&self, tenant_id: TenantId, user_id: UserId) -> u32 {
        self.ledger.get_warnings(tenant_id, user_id)
    }

    pub fn clear_warnings(&self, tenant_id: TenantId, user_id: UserId, moderator_id: UserId) {
        self.ledger.clear_warnings(tenant_id, user_id);
        info!(
            "🧹 清除警告: tenant={}, user={}, moderator={}",
            tenant_id, user_id, moderator_id
        );
        self.emit(
            tenant_id,
            user_id,
            moderator_id,
            ManualActionKind::ClearWarnings,
            "warnings cleared",
            None,
            Some(0),
        );
    }

    /// 禁言；给定时长时安排自动撤销
    pub async fn mute(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        moderator_id: UserId,
        duration: Option<Duration>,
        reason: &str,
    ) -> Result<Option<PendingReversal>> {
        let role_id = self.mute_role(tenant_id).await?;
        if self.executor.has_role(tenant_id, user_id, role_id).await? {
            return Err(ModerationError::Conflict(format!(
                "user {} is already muted",
                user_id
            )));
        }

        self.executor
            .grant_role(tenant_id, user_id, role_id, reason)
            .await?;
        let reversal = duration.map(|after| {
            self.reversals
                .schedule_reversal(tenant_id, user_id, role_id, after)
        });

        info!(
            "🔇 手动禁言: tenant={}, user={}, moderator={}, duration={:?}",
            tenant_id, user_id, moderator_id, duration
        );
        self.emit(
            tenant_id,
            user_id,
            moderator_id,
            ManualActionKind::Mute,
            reason,
            duration,
            None,
        );
        Ok(reversal)
    }

    pub async fn unmute(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        moderator_id: UserId,
        reason: &str,
    ) -> Result<()> {
        let role_id = self.mute_role(tenant_id).await?;
        if !self.executor.has_role(tenant_id, user_id, role_id).await? {
            return Err(ModerationError::Conflict(format!(
                "user {} is not muted",
                user_id
            )));
        }

        match self
            .executor
            .revoke_role(tenant_id, user_id, role_id, reason)
            .await
        {
            Ok(()) | Err(ActionError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        info!(
            "🔊 手动解除禁言: tenant={}, user={}, moderator={}",
            tenant_id, user_id, moderator_id
        );
        self.emit(
            tenant_id,
            user_id,
            moderator_id,
            ManualActionKind::Unmute,
            reason,
            None,
            None,
        );
        Ok(())
    }

    /// 平台原生限时禁言，时长范围 1..=40320 分钟
    pub async fn timeout(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        moderator_id: UserId,
        minutes: u64,
        reason: &str,
    ) -> Result<()> {
        if !(1..=MAX_TIMEOUT_MINUTES).contains(&minutes) {
            return Err(ModerationError::Validation(format!(
                "timeout must be between 1 and {} minutes",
                MAX_TIMEOUT_MINUTES
            )));
        }
        if !self.executor.supports_timebox() {
            return Err(ModerationError::CapabilityUnavailable(
                "native time-boxed restriction is not supported".to_string(),
            ));
        }

        let duration = Duration::from_secs(minutes * 60);
        self.executor
            .timebox_restrict(tenant_id, user_id, duration, reason)
            .await?;

        info!(
            "⏳ 手动限时禁言: tenant={}, user={}, moderator={}, minutes={}",
            tenant_id, user_id, moderator_id, minutes
        );
        self.emit(
            tenant_id,
            user_id,
            moderator_id,
            ManualActionKind::Timeout,
            reason,
            Some(duration),
            None,
        );
        Ok(())
    }

    /// 解除平台原生限时禁言；当前没有限时禁言时返回冲突
    pub async fn untimeout(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        moderator_id: UserId,
        reason: &str,
    ) -> Result<()> {
        match self
            .executor
            .lift_restriction(tenant_id, user_id, reason)
            .await
        {
            Ok(()) => {}
            Err(ActionError::NotFound(_)) => {
                return Err(ModerationError::Conflict(format!(
                    "user {} is not timed out",
                    user_id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            "⏳ 手动解除限时禁言: tenant={}, user={}, moderator={}",
            tenant_id, user_id, moderator_id
        );
        self.emit(
            tenant_id,
            user_id,
            moderator_id,
            ManualActionKind::Untimeout,
            reason,
            None,
            None,
        );
        Ok(())
    }

    pub async fn kick(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        moderator_id: UserId,
        reason: &str,
    ) -> Result<()> {
        self.executor.kick(tenant_id, user_id, reason).await?;
        info!(
            "👢 手动踢出: tenant={}, user={}, moderator={}",
            tenant_id, user_id, moderator_id
        );
        self.emit(
            tenant_id,
            user_id,
            moderator_id,
            ManualActionKind::Kick,
            reason,
            None,
            None,
        );
        Ok(())
    }

    pub async fn ban(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        moderator_id: UserId,
        reason: &str,
    ) -> Result<()> {
        self.executor.ban(tenant_id, user_id, reason).await?;
        info!(
            "🔨 手动封禁: tenant={}, user={}, moderator={}",
            tenant_id, user_id, moderator_id
        );
        self.emit(
            tenant_id,
            user_id,
            moderator_id,
            ManualActionKind::Ban,
            reason,
            None,
            None,
        );
        Ok(())
    }

    pub async fn unban(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        moderator_id: UserId,
        reason: &str,
    ) -> Result<()> {
        self.executor.unban(tenant_id, user_id, reason).await?;
        info!(
            "🕊️ 手动解封: tenant={}, user={}, moderator={}",
            tenant_id, user_id, moderator_id
        );
        self.emit(
            tenant_id,
            user_id,
            moderator_id,
            ManualActionKind::Unban,
            reason,
            None,
            None,
        );
        Ok(())
    }

    async fn mute_role(&self, tenant_id: TenantId) -> Result<RoleId> {
        self.escalation
            .resolve_mute_role(tenant_id)
            .await
            .ok_or_else(|| {
                ModerationError::CapabilityUnavailable("no mute role configured".to_string())
            })
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        moderator_id: UserId,
        kind: ManualActionKind,
        reason: &str,
        duration: Option<Duration>,
        warning_count: Option<u32>,
    ) {
        let logs_target = self.store.get_config(tenant_id).logs_target;
        self.sink
            .notify(ModerationEvent::ManualAction(ManualActionRecord {
                tenant_id,
                user_id,
                moderator_id,
                logs_target,
                kind,
                reason: reason.to_string(),
                duration,
                warning_count,
                occurred_at: Utc::now(),
            }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::EventBus;
    use crate::model::TenantSetting;
    use crate::moderation::escalation::EscalationPolicy;
    use crate::platform::{InMemoryPlatform, PlatformOp};

    struct Fixture {
        manual: ManualModeration,
        platform: Arc<InMemoryPlatform>,
        store: Arc<TenantConfigStore>,
        bus: Arc<EventBus>,
    }

    fn fixture() -> Fixture {
        let platform = Arc::new(InMemoryPlatform::new());
        let store = Arc::new(TenantConfigStore::default());
        let bus = Arc::new(EventBus::new(64));
        let reversals = Arc::new(ReversalScheduler::new(platform.clone(), bus.clone()));
        let escalation = Arc::new(EscalationEngine::new(
            platform.clone(),
            store.clone(),
            reversals.clone(),
            EscalationPolicy::default(),
        ));
        let manual = ManualModeration::new(
            platform.clone(),
            store.clone(),
            Arc::new(WarningLedger::new()),
            escalation,
            reversals,
            bus.clone(),
        );
        Fixture {
            manual,
            platform,
            store,
            bus,
        }
    }

    #[test]
    fn test_warn_does_not_escalate() {
        let f = fixture();
        for expected in 1..=4 {
            assert_eq!(f.manual.warn(1, 10, 99, "rude"), expected);
        }
        assert_eq!(f.manual.warnings(1, 10), 4);
        assert!(f.platform.journal().is_empty());

        f.manual.clear_warnings(1, 10, 99);
        assert_eq!(f.manual.warnings(1, 10), 0);
    }

    #[tokio::test]
    async fn test_warn_emits_record_with_logs_target() {
        let f = fixture();
        f.store.set_setting(1, TenantSetting::LogsTarget(Some(555)));
        let mut rx = f.bus.subscribe();

        f.manual.warn(1, 10, 99, "rude");
        match rx.recv().await.unwrap() {
            ModerationEvent::ManualAction(record) => {
                assert_eq!(record.kind, ManualActionKind::Warn);
                assert_eq!(record.logs_target, Some(555));
                assert_eq!(record.warning_count, Some(1));
                assert_eq!(record.moderator_id, 99);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mute_rejects_already_muted() {
        let f = fixture();
        f.store.set_setting(1, TenantSetting::MuteRole(Some(42)));

        assert!(f.manual.mute(1, 10, 99, None, "noise").await.unwrap().is_none());
        assert!(f.platform.user_has_role(1, 10, 42));

        let again = f.manual.mute(1, 10, 99, None, "noise").await;
        assert!(matches!(again, Err(ModerationError::Conflict(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_mute_is_reversed() {
        let f = fixture();
        f.store.set_setting(1, TenantSetting::MuteRole(Some(42)));

        let reversal = f
            .manual
            .mute(1, 10, 99, Some(Duration::from_secs(300)), "noise")
            .await
            .unwrap();
        assert_eq!(reversal.map(|r| r.delay), Some(Duration::from_secs(300)));

        tokio::time::sleep(Duration::from_secs(301)).await;
        tokio::task::yield_now().await;
        assert!(!f.platform.user_has_role(1, 10, 42));
    }

    #[tokio::test]
    async fn test_unmute_requires_muted_member() {
        let f = fixture();
        f.store.set_setting(1, TenantSetting::MuteRole(Some(42)));

        let result = f.manual.unmute(1, 10, 99, "ok").await;
        assert!(matches!(result, Err(ModerationError::Conflict(_))));

        f.platform.assign_role(1, 10, 42);
        f.manual.unmute(1, 10, 99, "ok").await.unwrap();
        assert!(!f.platform.user_has_role(1, 10, 42));
    }

    #[tokio::test]
    async fn test_mute_without_role_is_capability_error() {
        let f = fixture();
        let result = f.manual.mute(1, 10, 99, None, "noise").await;
        assert!(matches!(
            result,
            Err(ModerationError::CapabilityUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_range() {
        let f = fixture();
        for minutes in [0, MAX_TIMEOUT_MINUTES + 1] {
            let result = f.manual.timeout(1, 10, 99, minutes, "x").await;
            assert!(matches!(result, Err(ModerationError::Validation(_))));
        }

        f.manual.timeout(1, 10, 99, 15, "x").await.unwrap();
        assert_eq!(f.platform.restriction(1, 10), Some(Duration::from_secs(900)));
    }

    #[tokio::test]
    async fn test_untimeout_lifts_restriction() {
        let f = fixture();
        let result = f.manual.untimeout(1, 10, 99, "x").await;
        assert!(matches!(result, Err(ModerationError::Conflict(_))));

        f.manual.timeout(1, 10, 99, 15, "x").await.unwrap();
        let mut rx = f.bus.subscribe();
        f.manual.untimeout(1, 10, 99, "calmed down").await.unwrap();
        assert_eq!(f.platform.restriction(1, 10), None);
        match rx.recv().await.unwrap() {
            ModerationEvent::ManualAction(record) => {
                assert_eq!(record.kind, ManualActionKind::Untimeout);
                assert_eq!(record.reason, "calmed down");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        f.platform.forbid(PlatformOp::LiftRestriction);
        f.manual.timeout(1, 10, 99, 15, "x").await.unwrap();
        let forbidden = f.manual.untimeout(1, 10, 99, "x").await;
        assert!(matches!(
            forbidden,
            Err(ModerationError::Action(ActionError::Forbidden(_)))
        ));
    }

    #[tokio::test]
    async fn test_forbidden_is_returned_to_caller() {
        let f = fixture();
        f.platform.forbid(PlatformOp::Kick);
        let result = f.manual.kick(1, 10, 99, "x").await;
        assert!(matches!(
            result,
            Err(ModerationError::Action(ActionError::Forbidden(_)))
        ));
    }

    #[tokio::test]
    async fn test_ban_then_unban() {
        let f = fixture();
        f.manual.ban(1, 10, 99, "x").await.unwrap();
        assert!(f.platform.is_banned(1, 10));
        f.manual.unban(1, 10, 99, "x").await.unwrap();
        assert!(!f.platform.is_banned(1, 10));

        let again = f.manual.unban(1, 10, 99, "x").await;
        assert!(matches!(
            again,
            Err(ModerationError::Action(ActionError::NotFound(_)))
        ));
    }
}
