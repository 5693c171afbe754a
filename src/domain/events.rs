use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ChannelId, MessageId, RoleId, TenantId, UserId};
use crate::moderation::escalation::ActionTaken;
use crate::moderation::evaluator::{Evidence, ViolationKind};

/// 审核事件（发往通知出口）
///
/// 引擎只产出结构化记录，渲染和投递由外层系统负责。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModerationEvent {
    /// 自动审核处理了一次违规
    AutoModeration(ViolationRecord),
    /// 手动审核操作
    ManualAction(ManualActionRecord),
    /// 定时撤销生效（角色已被移除）
    ReversalApplied(ReversalRecord),
}

impl ModerationEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            ModerationEvent::AutoModeration(r) => r.tenant_id,
            ModerationEvent::ManualAction(r) => r.tenant_id,
            ModerationEvent::ReversalApplied(r) => r.tenant_id,
        }
    }
}

/// 一次违规的处理记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub incident_id: Uuid,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    /// 租户配置的日志投递目标（原样透传）
    pub logs_target: Option<ChannelId>,
    pub kind: ViolationKind,
    pub reason: String,
    pub evidence: Evidence,
    /// 消息是否已被移除（已不存在也算移除）
    pub message_removed: bool,
    /// 本次违规后的警告总数
    pub warning_count: u32,
    pub action: ActionTaken,
    /// 动作的可读标签
    pub action_label: String,
    pub occurred_at: DateTime<Utc>,
}

/// 手动审核操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualActionKind {
    Warn,
    ClearWarnings,
    Mute,
    Unmute,
    Timeout,
    Untimeout,
    Kick,
    Ban,
    Unban,
}

/// 手动审核操作记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualActionRecord {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub moderator_id: UserId,
    pub logs_target: Option<ChannelId>,
    pub kind: ManualActionKind,
    pub reason: String,
    /// 限时操作的时长
    pub duration: Option<Duration>,
    /// 操作后的警告总数（仅 Warn / ClearWarnings）
    pub warning_count: Option<u32>,
    pub occurred_at: DateTime<Utc>,
}

/// 定时撤销记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversalRecord {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role_id: RoleId,
    pub scheduled_at: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
}
