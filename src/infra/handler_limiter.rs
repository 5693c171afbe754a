//! 事件处理并发限流器
//!
//! 每条入站消息一个任务，限制同时运行的处理任务数量，防止 task 爆炸导致 OOM。
//! 与丢弃请求不同，审核不能漏掉消息：permit 不足时排队等待。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{ModerationError, Result};

/// 事件处理并发限流器
#[derive(Clone)]
pub struct HandlerLimiter {
    sem: Arc<Semaphore>,
    max_inflight: usize,
    /// 需要排队等待 permit 的次数
    queued_count: Arc<AtomicU64>,
}

impl HandlerLimiter {
    pub fn new(max_inflight: usize) -> Self {
        let max_inflight = max_inflight.max(1);
        Self {
            sem: Arc::new(Semaphore::new(max_inflight)),
            max_inflight,
            queued_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 获取 permit，没有空闲 permit 时等待。
    ///
    /// 调用方在 spawn 出来的任务内持有 permit，任务结束即释放。
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        if let Ok(permit) = self.sem.clone().try_acquire_owned() {
            return Ok(permit);
        }
        self.queued_count.fetch_add(1, Ordering::Relaxed);
        self.sem
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ModerationError::Internal(format!("handler limiter closed: {}", e)))
    }

    /// 等待所有已发放的 permit 归还
    pub async fn wait_idle(&self) -> Result<()> {
        let permits = u32::try_from(self.max_inflight).unwrap_or(u32::MAX);
        let _all = self
            .sem
            .acquire_many(permits)
            .await
            .map_err(|e| ModerationError::Internal(format!("handler limiter closed: {}", e)))?;
        Ok(())
    }

    /// 当前正在执行的任务数量
    pub fn inflight(&self) -> usize {
        self.max_inflight - self.sem.available_permits()
    }

    /// 累计排队次数
    pub fn queued_total(&self) -> u64 {
        self.queued_count.load(Ordering::Relaxed)
    }

    /// 最大并发数配置
    pub fn max_inflight(&self) -> usize {
        self.max_inflight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_permits_are_released_on_drop() {
        let limiter = HandlerLimiter::new(2);
        let a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.inflight(), 2);

        drop(a);
        assert_eq!(limiter.inflight(), 1);
    }

    #[tokio::test]
    async fn test_waits_instead_of_rejecting() {
        let limiter = HandlerLimiter::new(1);
        let held = limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
        assert_eq!(limiter.queued_total(), 1);
    }

    #[test]
    fn test_zero_is_clamped() {
        assert_eq!(HandlerLimiter::new(0).max_inflight(), 1);
    }
}
