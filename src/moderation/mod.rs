/// 自动审核模块
///
/// 提供社区自动审核的核心能力：
/// - 租户配置存储（首次访问物化默认值，类型化的配置项更新）
/// - 滑动窗口频率统计（按 tenant+user 分片加锁）
/// - 内容分类（链接白名单、提及计数）
/// - 违规评估（频率、链接、提及三项独立检查）
/// - 警告账本与处罚升级（Warn -> Mute -> Restrict -> Kick -> Ban）
/// - 定时撤销（到期移除禁言角色，幂等）
///
/// ## 失败降级
///
/// 执行器返回的无权限、能力缺失都会降级为“仅警告”，不会中断事件处理：
/// - `MuteUnavailable`: 没有可用的禁言角色
/// - `Forbidden`: 平台拒绝了处罚操作
/// - `TechnicalError`: 其它失败
pub mod classifier;
pub mod config_store;
pub mod engine;
pub mod escalation;
pub mod evaluator;
pub mod manual;
pub mod rate_tracker;
pub mod reversal;
pub mod warning_ledger;

pub use config_store::TenantConfigStore;
pub use engine::{AutoModerator, AutoModeratorBuilder, EngineStatsSnapshot};
pub use escalation::{
    ActionTaken, DegradeReason, EscalationEngine, EscalationOutcome, EscalationPolicy,
    EscalationTier,
};
pub use evaluator::{Evaluation, Evidence, Exemption, Violation, ViolationEvaluator, ViolationKind};
pub use manual::{ManualModeration, MAX_TIMEOUT_MINUTES};
pub use rate_tracker::SlidingWindowTracker;
pub use reversal::{PendingReversal, ReversalScheduler, ReversalStatsSnapshot};
pub use warning_ledger::WarningLedger;
