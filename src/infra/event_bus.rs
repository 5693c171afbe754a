use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::events::ModerationEvent;
use crate::error::{ModerationError, Result};

/// 通知出口
///
/// 引擎把结构化的审核记录交给外层系统，自己不做格式化和投递。
/// 发布不能失败：没有订阅者时记录会被丢弃。
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: ModerationEvent);
}

/// In-process Event Bus（进程内事件总线）
///
/// 使用 tokio::sync::broadcast，订阅者落后超过容量时会丢失最旧的记录。
pub struct EventBus {
    sender: broadcast::Sender<ModerationEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 发布事件
    pub fn publish(&self, event: ModerationEvent) -> Result<usize> {
        self.sender
            .send(event)
            .map_err(|e| ModerationError::Internal(format!("Event bus error: {}", e)))
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<ModerationEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl NotificationSink for EventBus {
    fn notify(&self, event: ModerationEvent) {
        let tenant_id = event.tenant_id();
        if let Err(e) = self.publish(event) {
            debug!("📭 无订阅者，丢弃审核记录: tenant={}, {}", tenant_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{ManualActionKind, ManualActionRecord};
    use chrono::Utc;

    fn record(tenant_id: u64) -> ModerationEvent {
        ModerationEvent::ManualAction(ManualActionRecord {
            tenant_id,
            user_id: 2,
            moderator_id: 3,
            logs_target: None,
            kind: ManualActionKind::Warn,
            reason: "test".to_string(),
            duration: None,
            warning_count: Some(1),
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.notify(record(7));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.tenant_id(), 7);
    }

    #[test]
    fn test_notify_without_subscribers_is_silent() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        bus.notify(record(1));
        assert!(bus.publish(record(1)).is_err());
    }
}
