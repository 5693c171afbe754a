//! 数据模型模块

pub mod message;
pub mod tenant;

pub use message::MessageEvent;
pub use tenant::{
    ActivityKind, AntiLinkSettings, AntiSpamSettings, SettingKey, SettingValue, StatusSettings,
    TenantConfig, TenantSetting, DEFAULT_ALLOWED_DOMAINS,
};

// 基础标识类型（平台侧的稳定 ID）
pub type TenantId = u64;
pub type UserId = u64;
pub type ChannelId = u64;
pub type RoleId = u64;
pub type MessageId = u64;
