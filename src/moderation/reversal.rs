use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::events::{ModerationEvent, ReversalRecord};
use crate::infra::NotificationSink;
use crate::model::{RoleId, TenantId, UserId};
use crate::platform::{ActionError, ActionExecutor};

const REVERSAL_REASON: &str = "Automatic unmute";

/// 已安排的撤销任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingReversal {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role_id: RoleId,
    pub delay: Duration,
    pub scheduled_at: DateTime<Utc>,
}

/// 撤销任务统计
#[derive(Debug, Default)]
struct ReversalStats {
    pending: AtomicUsize,
    fired: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// 统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReversalStatsSnapshot {
    /// 尚未触发的任务
    pub pending: usize,
    /// 实际移除了角色
    pub fired: u64,
    /// 触发时角色已不存在
    pub skipped: u64,
    /// 移除失败（已记录日志）
    pub failed: u64,
}

/// 定时撤销管理器
///
/// 每次调用启动一个独立的后台任务，到期后检查用户是否仍持有角色，持有则移除。
/// 没有取消机制：同一用户的多个撤销任务互不合并，角色在最后一个任务触发前一直保留。
/// 角色已不存在时移除是幂等的空操作，因此冗余的任务是安全的。
pub struct ReversalScheduler {
    executor: Arc<dyn ActionExecutor>,
    sink: Arc<dyn NotificationSink>,
    stats: Arc<ReversalStats>,
}

impl ReversalScheduler {
    pub fn new(executor: Arc<dyn ActionExecutor>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            executor,
            sink,
            stats: Arc::new(ReversalStats::default()),
        }
    }

    /// 安排在 `after` 之后移除角色
    ///
    /// 必须在 tokio 运行时内调用。任务失败只记录日志，不会向调用方传播。
    pub fn schedule_reversal(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
        after: Duration,
    ) -> PendingReversal {
        let pending = PendingReversal {
            tenant_id,
            user_id,
            role_id,
            delay: after,
            scheduled_at: Utc::now(),
        };

        self.stats.pending.fetch_add(1, Ordering::Relaxed);
        debug!(
            "⏰ 安排撤销: tenant={}, user={}, role={}, {}s 后",
            tenant_id,
            user_id,
            role_id,
            after.as_secs()
        );

        let executor = self.executor.clone();
        let sink = self.sink.clone();
        let stats = self.stats.clone();
        let task = pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(task.delay).await;
            fire(executor.as_ref(), sink.as_ref(), &stats, &task).await;
            stats.pending.fetch_sub(1, Ordering::Relaxed);
        });

        pending
    }

    pub fn stats(&self) -> ReversalStatsSnapshot {
        ReversalStatsSnapshot {
            pending: self.stats.pending.load(Ordering::Relaxed),
            fired: self.stats.fired.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }
}

async fn fire(
    executor: &dyn ActionExecutor,
    sink: &dyn NotificationSink,
    stats: &ReversalStats,
    task: &PendingReversal,
) {
    // 查询失败时仍尝试移除，移除本身是幂等的
    match executor
        .has_role(task.tenant_id, task.user_id, task.role_id)
        .await
    {
        Ok(false) => {
            debug!(
                "⏭️ 撤销跳过，角色已不存在: tenant={}, user={}, role={}",
                task.tenant_id, task.user_id, task.role_id
            );
            stats.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        Ok(true) => {}
        Err(e) => {
            warn!(
                "⚠️ 撤销前查询角色失败: tenant={}, user={}, error={}",
                task.tenant_id, task.user_id, e
            );
        }
    }

    match executor
        .revoke_role(task.tenant_id, task.user_id, task.role_id, REVERSAL_REASON)
        .await
    {
        Ok(()) => {
            info!(
                "🔓 撤销生效: tenant={}, user={}, role={}",
                task.tenant_id, task.user_id, task.role_id
            );
            stats.fired.fetch_add(1, Ordering::Relaxed);
            sink.notify(ModerationEvent::ReversalApplied(ReversalRecord {
                tenant_id: task.tenant_id,
                user_id: task.user_id,
                role_id: task.role_id,
                scheduled_at: task.scheduled_at,
                fired_at: Utc::now(),
            }));
        }
        Err(ActionError::NotFound(_)) => {
            stats.skipped.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            warn!(
                "⚠️ 撤销失败: tenant={}, user={}, role={}, error={}",
                task.tenant_id, task.user_id, task.role_id, e
            );
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
