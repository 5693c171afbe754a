use dashmap::DashMap;

use crate::model::{TenantId, UserId};

/// 警告计数账本
///
/// 每个 (tenant, user) 一个单调递增计数，只能显式清零。
/// 递增和读取在同一个分片锁内完成，同一用户的并发违规会拿到不同的计数。
pub struct WarningLedger {
    counts: DashMap<(TenantId, UserId), u32>,
}

impl WarningLedger {
    pub fn new() -> Self {
        Self {
            counts: DashMap::new(),
        }
    }

    /// 增加一次警告并返回新的总数
    pub fn add_warning(&self, tenant_id: TenantId, user_id: UserId) -> u32 {
        let mut count = self.counts.entry((tenant_id, user_id)).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// 读取警告数（不存在时为 0）
    pub fn get_warnings(&self, tenant_id: TenantId, user_id: UserId) -> u32 {
        self.counts
            .get(&(tenant_id, user_id))
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// 清除警告
    pub fn clear_warnings(&self, tenant_id: TenantId, user_id: UserId) {
        self.counts.remove(&(tenant_id, user_id));
    }
}

impl Default for WarningLedger {
    fn default() -> Self {
        Self::new()
    }
}
