//! 配置模块
//!
//! 定义用量门禁的配置结构，支持从 YAML 或 TOML 文件加载。
//! 限额覆盖在这里只做字符串级承载，解析与校验在构建套餐目录时
//! 完成（未知层级/资源在启动时快速失败）。

use crate::enforcer::AlertConfig;
use crate::error::UsageGuardError;
use crate::plan::{LimitOverride, PlanCatalog};
use ahash::AHashSet as HashSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 默认套餐缓存有效期（秒）
pub const DEFAULT_PLAN_CACHE_TTL_SECS: u64 = 60;

/// 用量门禁配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// 配置版本
    pub version: String,
    /// 套餐解析缓存有效期（秒，0 表示不缓存）
    #[serde(default = "default_cache_ttl")]
    pub plan_cache_ttl_secs: u64,
    /// 告警配置
    #[serde(default)]
    pub alerts: AlertConfig,
    /// 限额覆盖（应用在内置目录之上）
    #[serde(default)]
    pub limit_overrides: Vec<LimitOverride>,
}

fn default_cache_ttl() -> u64 {
    DEFAULT_PLAN_CACHE_TTL_SECS
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            plan_cache_ttl_secs: DEFAULT_PLAN_CACHE_TTL_SECS,
            alerts: AlertConfig::default(),
            limit_overrides: Vec::new(),
        }
    }
}

impl MeterConfig {
    /// 校验配置
    pub fn validate(&self) -> Result<(), String> {
        if self.version.is_empty() {
            return Err("版本号不能为空".to_string());
        }

        for &threshold in &self.alerts.thresholds {
            if threshold == 0 || threshold > 100 {
                return Err(format!("告警阈值必须在 1-100 之间: {}", threshold));
            }
        }

        if self.alerts.enabled && self.alerts.thresholds.is_empty() {
            return Err("启用告警时至少需要一个阈值".to_string());
        }

        // 检查覆盖项是否唯一
        let mut seen = HashSet::new();
        for entry in &self.limit_overrides {
            if !seen.insert((entry.tier.as_str(), entry.resource.as_str())) {
                return Err(format!("限额覆盖重复: {}/{}", entry.tier, entry.resource));
            }
        }

        Ok(())
    }

    /// 从 YAML 字符串解析
    pub fn from_yaml(content: &str) -> Result<Self, UsageGuardError> {
        let config: MeterConfig = serde_yaml::from_str(content)?;
        config.validate().map_err(UsageGuardError::ConfigError)?;
        Ok(config)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml(content: &str) -> Result<Self, UsageGuardError> {
        let config: MeterConfig = toml::from_str(content)?;
        config.validate().map_err(UsageGuardError::ConfigError)?;
        Ok(config)
    }

    /// 从文件加载，按扩展名选择解析器
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, UsageGuardError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            Some("toml") => Self::from_toml(&content),
            other => Err(UsageGuardError::ConfigError(format!(
                "不支持的配置文件格式: {:?}",
                other
            ))),
        }
    }

    /// 按配置构建套餐目录（覆盖项非法时快速失败）
    pub fn build_catalog(&self) -> Result<PlanCatalog, UsageGuardError> {
        PlanCatalog::with_overrides(&self.limit_overrides)
    }

    /// 套餐缓存有效期
    pub fn plan_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.plan_cache_ttl_secs)
    }
}
