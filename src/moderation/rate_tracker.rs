/// 滑动窗口消息计数器
///
/// 核心特性：
/// 1. 每个 (tenant, user) 一个时间戳窗口
/// 2. 惰性淘汰：只在插入时淘汰过期时间戳，没有后台清理
/// 3. 分片锁：同一 key 的 append + evict 串行，不同 key 之间并发
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::model::{TenantId, UserId};

type WindowKey = (TenantId, UserId);

/// 分片数（减少锁竞争）
const SHARD_COUNT: usize = 16;

struct ShardedWindows {
    shards: [Mutex<HashMap<WindowKey, VecDeque<DateTime<Utc>>>>; SHARD_COUNT],
}

impl ShardedWindows {
    fn new() -> Self {
        Self {
            shards: std::array::from_fn(|_| Mutex::new(HashMap::new())),
        }
    }

    fn get_shard(&self, key: &WindowKey) -> &Mutex<HashMap<WindowKey, VecDeque<DateTime<Utc>>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARD_COUNT]
    }
}

/// 滑动窗口计数器
pub struct SlidingWindowTracker {
    windows: ShardedWindows,
}

impl SlidingWindowTracker {
    pub fn new() -> Self {
        Self {
            windows: ShardedWindows::new(),
        }
    }

    /// 记录一条消息并返回窗口内的消息数
    ///
    /// 追加 `now`，淘汰所有 `timestamp <= now - window_seconds` 的记录。
    /// 窗口长度取调用时的租户配置，修改配置只影响之后的淘汰。
    pub fn record_and_count(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        now: DateTime<Utc>,
        window_seconds: u64,
    ) -> usize {
        let key = (tenant_id, user_id);
        let cutoff = i64::try_from(window_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|window| now.checked_sub_signed(window));

        let mut windows = self.windows.get_shard(&key).lock();
        let window = windows.entry(key).or_default();
        window.push_back(now);
        if let Some(cutoff) = cutoff {
            window.retain(|ts| *ts > cutoff);
        }
        window.len()
    }

    /// 当前窗口内保留的记录数（不插入、不淘汰）
    pub fn window_len(&self, tenant_id: TenantId, user_id: UserId) -> usize {
        let key = (tenant_id, user_id);
        self.windows
            .get_shard(&key)
            .lock()
            .get(&key)
            .map(|w| w.len())
            .unwrap_or(0)
    }

    /// 正在跟踪的 (tenant, user) 数量
    pub fn tracked_keys(&self) -> usize {
        self.windows.shards.iter().map(|s| s.lock().len()).sum()
    }
}

impl Default for SlidingWindowTracker {
    fn default() -> Self {
        Self::new()
    }
}
