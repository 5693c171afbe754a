use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::config_store::TenantConfigStore;
use super::reversal::{PendingReversal, ReversalScheduler};
use crate::model::{RoleId, TenantId, TenantSetting, UserId};
use crate::platform::{ActionError, ActionExecutor};

/// 处罚等级（由警告总数决定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTier {
    Warn,
    Mute,
    Restrict,
    Kick,
    Ban,
}

impl EscalationTier {
    /// 1 → 警告，2 → 禁言，3 → 限时限制，4 → 踢出，≥5 → 封禁
    pub fn from_count(count: u32) -> Self {
        match count {
            0 | 1 => EscalationTier::Warn,
            2 => EscalationTier::Mute,
            3 => EscalationTier::Restrict,
            4 => EscalationTier::Kick,
            _ => EscalationTier::Ban,
        }
    }
}

/// 降级原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// 没有可用的禁言角色
    MuteUnavailable,
    /// 执行器返回无权限
    Forbidden,
    /// 其它失败
    TechnicalError,
}

impl From<&ActionError> for DegradeReason {
    fn from(err: &ActionError) -> Self {
        match err {
            ActionError::Forbidden(_) => DegradeReason::Forbidden,
            ActionError::NotFound(_) | ActionError::Failed(_) => DegradeReason::TechnicalError,
        }
    }
}

/// 实际执行的处罚
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionTaken {
    Warned,
    Muted {
        role_id: RoleId,
        duration: Duration,
    },
    /// `via_role` 为 Some 时表示平台不支持原生限时限制，改用禁言角色
    Restricted {
        duration: Duration,
        via_role: Option<RoleId>,
    },
    Kicked,
    Banned,
    /// 目标处罚未能执行，退化为仅警告
    Degraded {
        attempted: EscalationTier,
        reason: DegradeReason,
    },
}

impl ActionTaken {
    /// 可读标签，供日志和通知使用
    pub fn label(&self) -> String {
        match self {
            ActionTaken::Warned => "Warn only".to_string(),
            ActionTaken::Muted { duration, .. } => {
                format!("Temporary mute, {}", human_duration(*duration))
            }
            ActionTaken::Restricted { duration, .. } => format!(
                "Temporary communication restriction, {}",
                human_duration(*duration)
            ),
            ActionTaken::Kicked => "Removal from community (kick)".to_string(),
            ActionTaken::Banned => "Permanent exclusion (ban)".to_string(),
            ActionTaken::Degraded { reason, .. } => match reason {
                DegradeReason::MuteUnavailable => "Warn only (mute unavailable)".to_string(),
                DegradeReason::Forbidden => {
                    "Warn only (action failed: insufficient permissions)".to_string()
                }
                DegradeReason::TechnicalError => {
                    "Warn only (action failed: technical error)".to_string()
                }
            },
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ActionTaken::Degraded { .. })
    }
}

pub(crate) fn human_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (value, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if value == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", value, unit)
    }
}

/// 处罚参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPolicy {
    /// 第 2 级禁言时长
    pub mute_duration: Duration,
    /// 第 3 级限时限制时长
    pub restriction_duration: Duration,
    /// 未配置禁言角色时按名称查找
    pub mute_role_names: Vec<String>,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            mute_duration: Duration::from_secs(600),
            restriction_duration: Duration::from_secs(3600),
            mute_role_names: vec![
                "muted".to_string(),
                "muet".to_string(),
                "silence".to_string(),
            ],
        }
    }
}

/// 一次升级的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationOutcome {
    pub tier: EscalationTier,
    pub action: ActionTaken,
    /// 限时处罚安排的撤销任务
    pub reversal: Option<PendingReversal>,
}

impl EscalationOutcome {
    fn applied(tier: EscalationTier, action: ActionTaken) -> Self {
        Self {
            tier,
            action,
            reversal: None,
        }
    }

    fn degraded(tier: EscalationTier, reason: DegradeReason) -> Self {
        Self::applied(
            tier,
            ActionTaken::Degraded {
                attempted: tier,
                reason,
            },
        )
    }
}

/// 处罚升级状态机
///
/// 等级完全由 `WarningLedger::add_warning` 返回的计数决定，计数与处罚是否成功无关。
/// 执行器的任何失败都在这里降级为“仅警告”，不会向上传播。
pub struct EscalationEngine {
    executor: Arc<dyn ActionExecutor>,
    store: Arc<TenantConfigStore>,
    reversals: Arc<ReversalScheduler>,
    policy: EscalationPolicy,
}

impl EscalationEngine {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        store: Arc<TenantConfigStore>,
        reversals: Arc<ReversalScheduler>,
        policy: EscalationPolicy,
    ) -> Self {
        Self {
            executor,
            store,
            reversals,
            policy,
        }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// 按本次违规后的警告总数执行对应处罚
    pub async fn escalate(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        warning_count: u32,
        reason: &str,
    ) -> EscalationOutcome {
        let tier = EscalationTier::from_count(warning_count);
        let outcome = match tier {
            EscalationTier::Warn => EscalationOutcome::applied(tier, ActionTaken::Warned),
            EscalationTier::Mute => self.mute(tenant_id, user_id, reason).await,
            EscalationTier::Restrict => self.restrict(tenant_id, user_id, reason).await,
            EscalationTier::Kick => {
                let result = self.executor.kick(tenant_id, user_id, reason).await;
                self.settle(tier, ActionTaken::Kicked, result)
            }
            EscalationTier::Ban => {
                let result = self.executor.ban(tenant_id, user_id, reason).await;
                self.settle(tier, ActionTaken::Banned, result)
            }
        };

        if outcome.action.is_degraded() {
            warn!(
                "⚠️ 处罚降级: tenant={}, user={}, warnings={}, {}",
                tenant_id,
                user_id,
                warning_count,
                outcome.action.label()
            );
        } else {
            info!(
                "🔨 处罚执行: tenant={}, user={}, warnings={}, {}",
                tenant_id,
                user_id,
                warning_count,
                outcome.action.label()
            );
        }
        outcome
    }

    /// 解析禁言角色：优先使用配置，否则按名称查找并写回配置
    pub async fn resolve_mute_role(&self, tenant_id: TenantId) -> Option<RoleId> {
        if let Some(role_id) = self.store.get_config(tenant_id).mute_role_id {
            return Some(role_id);
        }
        match self
            .executor
            .find_role_by_name(tenant_id, &self.policy.mute_role_names)
            .await
        {
            Ok(Some(role_id)) => {
                info!("🔍 按名称找到禁言角色: tenant={}, role={}", tenant_id, role_id);
                self.store
                    .set_setting(tenant_id, TenantSetting::MuteRole(Some(role_id)));
                Some(role_id)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("⚠️ 查找禁言角色失败: tenant={}, error={}", tenant_id, e);
                None
            }
        }
    }

    async fn mute(&self, tenant_id: TenantId, user_id: UserId, reason: &str) -> EscalationOutcome {
        let tier = EscalationTier::Mute;
        let Some(role_id) = self.resolve_mute_role(tenant_id).await else {
            return EscalationOutcome::degraded(tier, DegradeReason::MuteUnavailable);
        };
        let duration = self.policy.mute_duration;
        self.mute_with_role(tier, tenant_id, user_id, role_id, duration, reason)
            .await
    }

    async fn restrict(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        reason: &str,
    ) -> EscalationOutcome {
        let tier = EscalationTier::Restrict;
        let duration = self.policy.restriction_duration;

        if self.executor.supports_timebox() {
            let result = self
                .executor
                .timebox_restrict(tenant_id, user_id, duration, reason)
                .await;
            return self.settle(
                tier,
                ActionTaken::Restricted {
                    duration,
                    via_role: None,
                },
                result,
            );
        }

        let Some(role_id) = self.resolve_mute_role(tenant_id).await else {
            return EscalationOutcome::degraded(tier, DegradeReason::MuteUnavailable);
        };
        self.mute_with_role(tier, tenant_id, user_id, role_id, duration, reason)
            .await
    }

    /// 授予禁言角色并安排撤销；失败时返回降级结果
    async fn mute_with_role(
        &self,
        tier: EscalationTier,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
        duration: Duration,
        reason: &str,
    ) -> EscalationOutcome {
        if let Err(e) = self
            .executor
            .grant_role(tenant_id, user_id, role_id, reason)
            .await
        {
            return EscalationOutcome::degraded(tier, DegradeReason::from(&e));
        }

        let reversal = self
            .reversals
            .schedule_reversal(tenant_id, user_id, role_id, duration);
        let action = match tier {
            EscalationTier::Restrict => ActionTaken::Restricted {
                duration,
                via_role: Some(role_id),
            },
            _ => ActionTaken::Muted { role_id, duration },
        };
        EscalationOutcome {
            tier,
            action,
            reversal: Some(reversal),
        }
    }

    fn settle(
        &self,
        tier: EscalationTier,
        action: ActionTaken,
        result: Result<(), ActionError>,
    ) -> EscalationOutcome {
        match result {
            Ok(()) => EscalationOutcome::applied(tier, action),
            Err(e) => EscalationOutcome::degraded(tier, DegradeReason::from(&e)),
        }
    }
}
