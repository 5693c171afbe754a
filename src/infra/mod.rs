// Infrastructure layer - 基础设施层
// 负责事件分发和处理并发控制

pub mod event_bus;
pub mod handler_limiter;

pub use event_bus::{EventBus, NotificationSink};
pub use handler_limiter::HandlerLimiter;
