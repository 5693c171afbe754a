use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{TenantConfig, TenantSetting};
use crate::moderation::EscalationPolicy;

/// 审核服务配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomodConfig {
    /// 日志配置
    pub logging: LoggingConfig,
    /// 引擎运行参数
    pub engine: EngineConfig,
    /// 处罚参数
    pub escalation: EscalationConfig,
    /// 新租户的默认配置模板
    pub tenant_defaults: TenantConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: Option<String>,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
            file: None,
        }
    }
}

/// 引擎运行参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 同时处理的事件数上限
    pub max_inflight_handlers: usize,
    /// 入站事件队列容量
    pub event_queue_capacity: usize,
    /// 通知事件总线容量
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_inflight_handlers: 256,
            event_queue_capacity: 1024,
            notification_capacity: 1000,
        }
    }
}

/// 处罚参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// 第 2 级禁言时长（秒）
    pub mute_duration_secs: u64,
    /// 第 3 级限时限制时长（秒）
    pub restriction_duration_secs: u64,
    /// 未配置禁言角色时按名称查找
    pub mute_role_names: Vec<String>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        let policy = EscalationPolicy::default();
        Self {
            mute_duration_secs: policy.mute_duration.as_secs(),
            restriction_duration_secs: policy.restriction_duration.as_secs(),
            mute_role_names: policy.mute_role_names,
        }
    }
}

impl EscalationConfig {
    pub fn policy(&self) -> EscalationPolicy {
        EscalationPolicy {
            mute_duration: Duration::from_secs(self.mute_duration_secs),
            restriction_duration: Duration::from_secs(self.restriction_duration_secs),
            mute_role_names: self.mute_role_names.clone(),
        }
    }
}

impl AutomodConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(content).with_context(|| "配置文件格式错误")?;
        Ok(toml_config.into())
    }

    /// 从环境变量加载配置（AUTOMOD_ 前缀）
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(level) = env::var("AUTOMOD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("AUTOMOD_LOG_FORMAT") {
            self.logging.format = Some(format);
        }
        if let Ok(file) = env::var("AUTOMOD_LOG_FILE") {
            self.logging.file = Some(file);
        }

        if let Ok(value) = env::var("AUTOMOD_MAX_INFLIGHT_HANDLERS") {
            self.engine.max_inflight_handlers =
                value.parse().unwrap_or(self.engine.max_inflight_handlers);
        }
        if let Ok(value) = env::var("AUTOMOD_EVENT_QUEUE_CAPACITY") {
            self.engine.event_queue_capacity =
                value.parse().unwrap_or(self.engine.event_queue_capacity);
        }
        if let Ok(value) = env::var("AUTOMOD_NOTIFICATION_CAPACITY") {
            self.engine.notification_capacity =
                value.parse().unwrap_or(self.engine.notification_capacity);
        }

        if let Ok(value) = env::var("AUTOMOD_MUTE_DURATION_SECS") {
            self.escalation.mute_duration_secs =
                value.parse().unwrap_or(self.escalation.mute_duration_secs);
        }
        if let Ok(value) = env::var("AUTOMOD_RESTRICTION_DURATION_SECS") {
            self.escalation.restriction_duration_secs = value
                .parse()
                .unwrap_or(self.escalation.restriction_duration_secs);
        }
        if let Ok(value) = env::var("AUTOMOD_MUTE_ROLE_NAMES") {
            let names: Vec<String> = value
                .split(',')
                .map(|name| name.trim().to_lowercase())
                .filter(|name| !name.is_empty())
                .collect();
            if !names.is_empty() {
                self.escalation.mute_role_names = names;
            }
        }

        Ok(())
    }

    /// 从命令行参数合并配置
    pub fn merge_from_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(level) = cli.get_log_level() {
            self.logging.level = level;
        }
        if let Some(format) = cli.get_log_format() {
            self.logging.format = Some(format);
        }
        if let Some(file) = &cli.log_file {
            self.logging.file = Some(file.clone());
        }
        if let Some(max_inflight) = cli.max_inflight {
            self.engine.max_inflight_handlers = max_inflight;
        }
    }

    /// 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    pub fn load(cli: &crate::cli::Cli) -> Result<Self> {
        // 1. 配置文件（如果存在）
        let mut config = if let Some(config_file) = &cli.config_file {
            if Path::new(config_file).exists() {
                info!("📄 从配置文件加载: {}", config_file);
                Self::from_toml_file(config_file)?
            } else {
                tracing::warn!("⚠️ 配置文件不存在: {}", config_file);
                Self::new()
            }
        } else if Path::new("automod.toml").exists() {
            info!("📄 从默认配置文件加载: automod.toml");
            Self::from_toml_file("automod.toml")?
        } else {
            Self::new()
        };

        // 2. 环境变量（优先级高于配置文件）
        config.merge_from_env()?;

        // 3. 命令行参数（最高优先级）
        config.merge_from_cli(cli);

        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    ///
    /// 租户默认值与运行时配置项使用同一套范围规则。
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_inflight_handlers == 0 {
            bail!("engine.max_inflight_handlers 必须大于 0");
        }
        if self.engine.event_queue_capacity == 0 {
            bail!("engine.event_queue_capacity 必须大于 0");
        }
        if self.escalation.mute_duration_secs == 0 || self.escalation.restriction_duration_secs == 0
        {
            bail!("escalation 时长必须大于 0");
        }

        let defaults = &self.tenant_defaults;
        let settings = [
            TenantSetting::MessageLimit(defaults.anti_spam.message_limit),
            TenantSetting::WindowSeconds(defaults.anti_spam.window_seconds),
            TenantSetting::MaxMentions(defaults.max_mentions),
        ];
        for setting in settings {
            setting
                .validate()
                .with_context(|| "tenant_defaults 配置无效")?;
        }
        Ok(())
    }
}

/// 启动前读取的日志配置（不加载完整配置）
#[derive(Debug, Default)]
pub struct EarlyLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
}

/// 快速读取配置文件的 [logging] 段，读取失败时返回空配置
pub fn load_early_logging_config(config_file: Option<&str>) -> EarlyLoggingConfig {
    let path = config_file.unwrap_or("automod.toml");
    let Ok(content) = fs::read_to_string(path) else {
        return EarlyLoggingConfig::default();
    };
    match toml::from_str::<TomlConfig>(&content) {
        Ok(TomlConfig {
            logging: Some(logging),
            ..
        }) => EarlyLoggingConfig {
            level: logging.level,
            format: logging.format,
            file: logging.file,
        },
        _ => EarlyLoggingConfig::default(),
    }
}

/// TOML 配置文件结构（用于反序列化）
#[derive(Debug, Deserialize)]
struct TomlConfig {
    logging: Option<TomlLoggingConfig>,
    engine: Option<TomlEngineConfig>,
    escalation: Option<TomlEscalationConfig>,
    tenant_defaults: Option<TenantConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlLoggingConfig {
    level: Option<String>,
    format: Option<String>,
    file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlEngineConfig {
    max_inflight_handlers: Option<usize>,
    event_queue_capacity: Option<usize>,
    notification_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TomlEscalationConfig {
    mute_duration_secs: Option<u64>,
    restriction_duration_secs: Option<u64>,
    mute_role_names: Option<Vec<String>>,
}

impl From<TomlConfig> for AutomodConfig {
    fn from(toml: TomlConfig) -> Self {
        let mut config = Self::default();

        if let Some(logging) = toml.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            config.logging.format = logging.format;
            config.logging.file = logging.file;
        }

        if let Some(engine) = toml.engine {
            if let Some(value) = engine.max_inflight_handlers {
                config.engine.max_inflight_handlers = value;
            }
            if let Some(value) = engine.event_queue_capacity {
                config.engine.event_queue_capacity = value;
            }
            if let Some(value) = engine.notification_capacity {
                config.engine.notification_capacity = value;
            }
        }

        if let Some(escalation) = toml.escalation {
            if let Some(value) = escalation.mute_duration_secs {
                config.escalation.mute_duration_secs = value;
            }
            if let Some(value) = escalation.restriction_duration_secs {
                config.escalation.restriction_duration_secs = value;
            }
            if let Some(names) = escalation.mute_role_names {
                config.escalation.mute_role_names = names;
            }
        }

        if let Some(defaults) = toml.tenant_defaults {
            config.tenant_defaults = defaults;
        }

        config
    }
}
