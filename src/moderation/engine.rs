use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config_store::TenantConfigStore;
use super::escalation::{EscalationEngine, EscalationPolicy};
use super::evaluator::{Evaluation, ViolationEvaluator};
use super::manual::ManualModeration;
use super::rate_tracker::SlidingWindowTracker;
use super::reversal::ReversalScheduler;
use super::warning_ledger::WarningLedger;
use crate::config::AutomodConfig;
use crate::domain::events::{ModerationEvent, ViolationRecord};
use crate::error::{ModerationError, Result};
use crate::infra::{HandlerLimiter, NotificationSink};
use crate::model::{MessageEvent, TenantConfig};
use crate::platform::{ActionError, ActionExecutor, PermissionResolver};

const DEFAULT_MAX_INFLIGHT: usize = 256;

#[derive(Debug, Default)]
struct EngineStats {
    processed: AtomicU64,
    exempt: AtomicU64,
    flagged: AtomicU64,
    violations: AtomicU64,
}

/// 引擎计数快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStatsSnapshot {
    pub processed: u64,
    pub exempt: u64,
    /// 至少触发一项违规的消息数
    pub flagged: u64,
    pub violations: u64,
}

/// 自动审核引擎
///
/// 消费消息事件：评估 → 删除消息 → 每项违规各自记一次警告并升级处罚 → 发出记录。
/// 同一条消息的多项违规互相独立，一条消息可能连跳两级。
pub struct AutoModerator {
    store: Arc<TenantConfigStore>,
    ledger: Arc<WarningLedger>,
    evaluator: ViolationEvaluator,
    escalation: Arc<EscalationEngine>,
    reversals: Arc<ReversalScheduler>,
    manual: ManualModeration,
    executor: Arc<dyn ActionExecutor>,
    sink: Arc<dyn NotificationSink>,
    limiter: HandlerLimiter,
    stats: EngineStats,
}

impl AutoModerator {
    pub fn builder() -> AutoModeratorBuilder {
        AutoModeratorBuilder::new()
    }

    /// 处理一条消息，返回本次产生的违规记录（已同时发往通知出口）
    pub async fn handle_event(&self, event: &MessageEvent) -> Vec<ViolationRecord> {
        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        let config = self.store.get_config(event.tenant_id);

        let violations = match self.evaluator.evaluate(event, &config).await {
            Evaluation::Exempt(_) => {
                self.stats.exempt.fetch_add(1, Ordering::Relaxed);
                return Vec::new();
            }
            Evaluation::Violations(violations) if violations.is_empty() => return Vec::new(),
            Evaluation::Violations(violations) => violations,
        };

        self.stats.flagged.fetch_add(1, Ordering::Relaxed);

        let mut records = Vec::with_capacity(violations.len());
        for violation in violations {
            // 每项违规各自尝试删除，消息已被前一项删除时返回 NotFound，视为已删除
            let message_removed = self.remove_message(event).await;
            let warning_count = self.ledger.add_warning(event.tenant_id, event.author_id);
            let outcome = self
                .escalation
                .escalate(
                    event.tenant_id,
                    event.author_id,
                    warning_count,
                    &violation.reason,
                )
                .await;

            info!(
                "🚨 违规处理: tenant={}, user={}, kind={:?}, warnings={}, action={}",
                event.tenant_id,
                event.author_id,
                violation.kind,
                warning_count,
                outcome.action.label()
            );

            let record = ViolationRecord {
                incident_id: Uuid::new_v4(),
                tenant_id: event.tenant_id,
                user_id: event.author_id,
                channel_id: event.channel_id,
                message_id: event.message_id,
                logs_target: config.logs_target,
                kind: violation.kind,
                reason: violation.reason,
                evidence: violation.evidence,
                message_removed,
                warning_count,
                action_label: outcome.action.label(),
                action: outcome.action,
                occurred_at: Utc::now(),
            };
            self.stats.violations.fetch_add(1, Ordering::Relaxed);
            self.sink
                .notify(ModerationEvent::AutoModeration(record.clone()));
            records.push(record);
        }
        records
    }

    /// 消费事件源直到关闭，每个事件一个任务
    ///
    /// 并发任务数受 `HandlerLimiter` 限制，满载时等待而不是丢弃。
    /// 事件源关闭后等待所有在途任务完成再返回。
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<MessageEvent>) -> Result<()> {
        info!(
            "🚀 自动审核引擎启动 (max_inflight={})",
            self.limiter.max_inflight()
        );

        while let Some(event) = events.recv().await {
            let permit = self.limiter.acquire().await?;
            let engine = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                engine.handle_event(&event).await;
            });
        }

        self.limiter.wait_idle().await?;
        info!("🛑 事件源已关闭，引擎退出: {:?}", self.stats());
        Ok(())
    }

    /// 删除违规消息；已不存在视为已删除，其它失败只记录
    async fn remove_message(&self, event: &MessageEvent) -> bool {
        match self
            .executor
            .delete_message(event.tenant_id, event.channel_id, event.message_id)
            .await
        {
            Ok(()) => true,
            Err(ActionError::NotFound(_)) => {
                debug!("消息已不存在: message={}", event.message_id);
                true
            }
            Err(ActionError::Forbidden(e)) => {
                warn!(
                    "⚠️ 无权删除消息: tenant={}, message={}, {}",
                    event.tenant_id, event.message_id, e
                );
                false
            }
            Err(e) => {
                error!(
                    "❌ 删除消息失败: tenant={}, message={}, {}",
                    event.tenant_id, event.message_id, e
                );
                false
            }
        }
    }

    pub fn store(&self) -> &Arc<TenantConfigStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<WarningLedger> {
        &self.ledger
    }

    pub fn manual(&self) -> &ManualModeration {
        &self.manual
    }

    pub fn reversals(&self) -> &Arc<ReversalScheduler> {
        &self.reversals
    }

    pub fn limiter(&self) -> &HandlerLimiter {
        &self.limiter
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            processed: self.stats.processed.load(Ordering::Relaxed),
            exempt: self.stats.exempt.load(Ordering::Relaxed),
            flagged: self.stats.flagged.load(Ordering::Relaxed),
            violations: self.stats.violations.load(Ordering::Relaxed),
        }
    }
}

/// AutoModerator 构建器
pub struct AutoModeratorBuilder {
    executor: Option<Arc<dyn ActionExecutor>>,
    permissions: Option<Arc<dyn PermissionResolver>>,
    sink: Option<Arc<dyn NotificationSink>>,
    defaults: TenantConfig,
    policy: EscalationPolicy,
    max_inflight: usize,
}

impl AutoModeratorBuilder {
    pub fn new() -> Self {
        Self {
            executor: None,
            permissions: None,
            sink: None,
            defaults: TenantConfig::default(),
            policy: EscalationPolicy::default(),
            max_inflight: DEFAULT_MAX_INFLIGHT,
        }
    }

    /// 从进程配置读取租户默认值、处罚参数和并发上限
    pub fn with_config(mut self, config: &AutomodConfig) -> Self {
        self.defaults = config.tenant_defaults.clone();
        self.policy = config.escalation.policy();
        self.max_inflight = config.engine.max_inflight_handlers;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn PermissionResolver>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_tenant_defaults(mut self, defaults: TenantConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_inflight(mut self, max_inflight: usize) -> Self {
        self.max_inflight = max_inflight;
        self
    }

    pub fn build(self) -> Result<AutoModerator> {
        let executor = self
            .executor
            .ok_or_else(|| ModerationError::Configuration("action executor is required".to_string()))?;
        let permissions = self.permissions.ok_or_else(|| {
            ModerationError::Configuration("permission resolver is required".to_string())
        })?;
        let sink = self
            .sink
            .ok_or_else(|| ModerationError::Configuration("notification sink is required".to_string()))?;

        let store = Arc::new(TenantConfigStore::new(self.defaults));
        let ledger = Arc::new(WarningLedger::new());
        let reversals = Arc::new(ReversalScheduler::new(executor.clone(), sink.clone()));
        let escalation = Arc::new(EscalationEngine::new(
            executor.clone(),
            store.clone(),
            reversals.clone(),
            self.policy,
        ));
        let evaluator = ViolationEvaluator::new(
            Arc::new(SlidingWindowTracker::new()),
            permissions,
            executor.clone(),
        );
        let manual = ManualModeration::new(
            executor.clone(),
            store.clone(),
            ledger.clone(),
            escalation.clone(),
            reversals.clone(),
            sink.clone(),
        );

        Ok(AutoModerator {
            store,
            ledger,
            evaluator,
            escalation,
            reversals,
            manual,
            executor,
            sink,
            limiter: HandlerLimiter::new(self.max_inflight),
            stats: EngineStats::default(),
        })
    }
}

impl Default for AutoModeratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
