use dashmap::DashMap;
use tracing::debug;

use crate::model::{SettingKey, SettingValue, TenantConfig, TenantId, TenantSetting};

/// 租户配置存储
///
/// 每个租户一份配置，首次访问时从默认模板物化。使用 DashMap 做分片锁，
/// 不同租户之间互不阻塞；同一租户的写入在其条目锁内完成。
/// 存储层不做范围校验，调用方写入前自行调用 `TenantSetting::validate`。
pub struct TenantConfigStore {
    configs: DashMap<TenantId, TenantConfig>,
    defaults: TenantConfig,
}

impl TenantConfigStore {
    pub fn new(defaults: TenantConfig) -> Self {
        Self {
            configs: DashMap::new(),
            defaults,
        }
    }

    /// 获取租户配置（首次访问时创建默认配置）
    pub fn get_config(&self, tenant_id: TenantId) -> TenantConfig {
        self.configs
            .entry(tenant_id)
            .or_insert_with(|| {
                debug!("🆕 租户 {} 首次访问，物化默认配置", tenant_id);
                self.defaults.clone()
            })
            .clone()
    }

    /// 写入单个配置项
    pub fn set_setting(&self, tenant_id: TenantId, setting: TenantSetting) {
        debug!("🔧 租户 {} 更新配置: {:?}", tenant_id, setting);
        self.update(tenant_id, |config| setting.apply(config));
    }

    /// 读取单个配置项
    pub fn get_setting(&self, tenant_id: TenantId, key: SettingKey) -> SettingValue {
        self.get_config(tenant_id).read(key)
    }

    /// 在租户条目锁内做部分更新
    pub fn update<F>(&self, tenant_id: TenantId, f: F)
    where
        F: FnOnce(&mut TenantConfig),
    {
        let mut entry = self
            .configs
            .entry(tenant_id)
            .or_insert_with(|| self.defaults.clone());
        f(entry.value_mut());
    }

    /// 恢复为默认配置
    pub fn reset(&self, tenant_id: TenantId) {
        self.configs.remove(&tenant_id);
    }

    /// 已物化的租户数量
    pub fn tenant_count(&self) -> usize {
        self.configs.len()
    }
}

impl Default for TenantConfigStore {
    fn default() -> Self {
        Self::new(TenantConfig::default())
    }
}
