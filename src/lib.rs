pub mod cli;
pub mod config;
pub mod domain; // 审核记录（发往通知出口）
pub mod error;
pub mod infra;
pub mod logging;
pub mod model;
pub mod moderation; // 自动审核引擎
pub mod platform; // 平台能力接口

pub use config::AutomodConfig;
pub use domain::{
    ManualActionKind, ManualActionRecord, ModerationEvent, ReversalRecord, ViolationRecord,
};
pub use error::{ModerationError, Result};
pub use infra::{EventBus, HandlerLimiter, NotificationSink};
pub use model::*;
pub use moderation::{
    ActionTaken, AutoModerator, AutoModeratorBuilder, DegradeReason, EscalationPolicy,
    EscalationTier, Evidence, ManualModeration, TenantConfigStore, ViolationKind, WarningLedger,
};
pub use platform::{
    ActionError, ActionExecutor, ActionResult, InMemoryPlatform, PermissionResolver, PlatformOp,
};
