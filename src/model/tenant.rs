use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{ChannelId, RoleId};
use crate::error::{ModerationError, Result};

/// 默认允许的域名
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "twitter.com",
    "twitch.tv",
    "github.com",
    "stackoverflow.com",
    "reddit.com",
];

/// 反刷屏配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiSpamSettings {
    pub enabled: bool,
    /// 窗口内允许的消息条数（达到即违规）
    pub message_limit: u32,
    /// 滑动窗口长度（秒）
    pub window_seconds: u64,
}

impl Default for AntiSpamSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            message_limit: 5,
            window_seconds: 10,
        }
    }
}

/// 反链接配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiLinkSettings {
    pub enabled: bool,
    /// 允许的域名（子串匹配，大小写不敏感）
    pub allowed_domains: BTreeSet<String>,
}

impl Default for AntiLinkSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_domains: DEFAULT_ALLOWED_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

/// 状态展示类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Playing,
    Watching,
    Listening,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    pub kind: ActivityKind,
    pub text: String,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            kind: ActivityKind::Watching,
            text: "🛡️ Protecting the server".to_string(),
        }
    }
}

/// 租户（社区）策略配置
///
/// 首次访问时按默认模板创建，进程内存活，重启即丢失。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    /// 审核日志投递目标
    pub logs_target: Option<ChannelId>,
    /// 版主角色
    pub moderator_role_id: Option<RoleId>,
    /// 禁言角色
    pub mute_role_id: Option<RoleId>,
    pub anti_spam: AntiSpamSettings,
    pub anti_links: AntiLinkSettings,
    /// 单条消息允许的最大提及数（超过即违规）
    pub max_mentions: usize,
    pub status: StatusSettings,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            logs_target: None,
            moderator_role_id: None,
            mute_role_id: None,
            anti_spam: AntiSpamSettings::default(),
            anti_links: AntiLinkSettings::default(),
            max_mentions: 5,
            status: StatusSettings::default(),
        }
    }
}

/// 可更新的配置项
///
/// 每个可写字段对应一个变体，没有动态路径。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "setting", content = "value", rename_all = "snake_case")]
pub enum TenantSetting {
    LogsTarget(Option<ChannelId>),
    ModeratorRole(Option<RoleId>),
    MuteRole(Option<RoleId>),
    AntiSpamEnabled(bool),
    MessageLimit(u32),
    WindowSeconds(u64),
    AntiLinksEnabled(bool),
    AllowDomain(String),
    DisallowDomain(String),
    MaxMentions(usize),
    StatusKind(ActivityKind),
    StatusText(String),
}

impl TenantSetting {
    /// 调用方在写入前做的范围校验（存储层本身不校验）
    pub fn validate(&self) -> Result<()> {
        match self {
            TenantSetting::MessageLimit(limit) if !(1..=20).contains(limit) => Err(
                ModerationError::Validation("message limit must be between 1 and 20".to_string()),
            ),
            TenantSetting::WindowSeconds(secs) if !(5..=60).contains(secs) => Err(
                ModerationError::Validation(
                    "time window must be between 5 and 60 seconds".to_string(),
                ),
            ),
            TenantSetting::MaxMentions(limit) if !(1..=20).contains(limit) => Err(
                ModerationError::Validation("mention limit must be between 1 and 20".to_string()),
            ),
            TenantSetting::AllowDomain(domain) | TenantSetting::DisallowDomain(domain)
                if domain.trim().is_empty() =>
            {
                Err(ModerationError::Validation("domain must not be empty".to_string()))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn apply(self, config: &mut TenantConfig) {
        match self {
            TenantSetting::LogsTarget(target) => config.logs_target = target,
            TenantSetting::ModeratorRole(role) => config.moderator_role_id = role,
            TenantSetting::MuteRole(role) => config.mute_role_id = role,
            TenantSetting::AntiSpamEnabled(enabled) => config.anti_spam.enabled = enabled,
            TenantSetting::MessageLimit(limit) => config.anti_spam.message_limit = limit,
            TenantSetting::WindowSeconds(secs) => config.anti_spam.window_seconds = secs,
            TenantSetting::AntiLinksEnabled(enabled) => config.anti_links.enabled = enabled,
            TenantSetting::AllowDomain(domain) => {
                config
                    .anti_links
                    .allowed_domains
                    .insert(domain.trim().to_lowercase());
            }
            TenantSetting::DisallowDomain(domain) => {
                config
                    .anti_links
                    .allowed_domains
                    .remove(&domain.trim().to_lowercase());
            }
            TenantSetting::MaxMentions(limit) => config.max_mentions = limit,
            TenantSetting::StatusKind(kind) => config.status.kind = kind,
            TenantSetting::StatusText(text) => config.status.text = text,
        }
    }
}

/// 可读取的配置项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    LogsTarget,
    ModeratorRole,
    MuteRole,
    AntiSpamEnabled,
    MessageLimit,
    WindowSeconds,
    AntiLinksEnabled,
    AllowedDomains,
    MaxMentions,
    StatusKind,
    StatusText,
}

/// 配置项取值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Id(Option<u64>),
    Flag(bool),
    Count(u64),
    Domains(BTreeSet<String>),
    Kind(ActivityKind),
    Text(String),
}

impl TenantConfig {
    pub fn read(&self, key: SettingKey) -> SettingValue {
        match key {
            SettingKey::LogsTarget => SettingValue::Id(self.logs_target),
            SettingKey::ModeratorRole => SettingValue::Id(self.moderator_role_id),
            SettingKey::MuteRole => SettingValue::Id(self.mute_role_id),
            SettingKey::AntiSpamEnabled => SettingValue::Flag(self.anti_spam.enabled),
            SettingKey::MessageLimit => SettingValue::Count(self.anti_spam.message_limit as u64),
            SettingKey::WindowSeconds => SettingValue::Count(self.anti_spam.window_seconds),
            SettingKey::AntiLinksEnabled => SettingValue::Flag(self.anti_links.enabled),
            SettingKey::AllowedDomains => {
                SettingValue::Domains(self.anti_links.allowed_domains.clone())
            }
            SettingKey::MaxMentions => SettingValue::Count(self.max_mentions as u64),
            SettingKey::StatusKind => SettingValue::Kind(self.status.kind),
            SettingKey::StatusText => SettingValue::Text(self.status.text.clone()),
        }
    }
}
