//! 领域事件
pub mod events;

pub use events::{
    ManualActionKind, ManualActionRecord, ModerationEvent, ReversalRecord, ViolationRecord,
};
