use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChannelId, MessageId, RoleId, TenantId, UserId};

/// 入站消息事件
///
/// 每条入站消息创建一次，被引擎消费后丢弃，不做持久化。
/// 提及列表保留原始顺序和重复项，去重由内容分类器负责。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// 所属租户（社区）
    pub tenant_id: TenantId,
    /// 发送者
    pub author_id: UserId,
    /// 发送者是否为机器人
    #[serde(default)]
    pub author_is_bot: bool,
    /// 所在频道
    pub channel_id: ChannelId,
    /// 消息 ID（删除消息时使用）
    pub message_id: MessageId,
    /// 文本内容
    #[serde(default)]
    pub content: String,
    /// 被提及的用户
    #[serde(default)]
    pub mentioned_user_ids: Vec<UserId>,
    /// 被提及的角色
    #[serde(default)]
    pub mentioned_role_ids: Vec<RoleId>,
    /// 发生时间
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl MessageEvent {
    pub fn new(
        tenant_id: TenantId,
        author_id: UserId,
        channel_id: ChannelId,
        message_id: MessageId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            author_id,
            author_is_bot: false,
            channel_id,
            message_id,
            content: content.into(),
            mentioned_user_ids: Vec::new(),
            mentioned_role_ids: Vec::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn with_user_mentions(mut self, user_ids: impl IntoIterator<Item = UserId>) -> Self {
        self.mentioned_user_ids.extend(user_ids);
        self
    }

    pub fn with_role_mentions(mut self, role_ids: impl IntoIterator<Item = RoleId>) -> Self {
        self.mentioned_role_ids.extend(role_ids);
        self
    }

    pub fn from_bot(mut self) -> Self {
        self.author_is_bot = true;
        self
    }

    /// 提及集合（用户 ID ∪ 角色 ID，数值相同的 ID 合并为一项）
    pub fn mention_set(&self) -> HashSet<u64> {
        self.mentioned_user_ids
            .iter()
            .chain(self.mentioned_role_ids.iter())
            .copied()
            .collect()
    }

    /// 内容摘要（用于上报证据，最多 200 个字符）
    pub fn excerpt(&self) -> String {
        const MAX_CHARS: usize = 200;
        if self.content.chars().count() <= MAX_CHARS {
            return self.content.clone();
        }
        let mut excerpt: String = self.content.chars().take(MAX_CHARS).collect();
        excerpt.push_str("...");
        excerpt
    }
}
