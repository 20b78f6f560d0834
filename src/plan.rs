//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 套餐目录模块
//!
//! 定义套餐层级、计量资源与限额目录。目录在构造时对全部
//! (层级, 资源) 组合物化完成，运行期只读；缺失映射属于配置错误，
//! 在进程启动时快速失败，而不是在请求时猜测限额。

use serde::{Deserialize, Serialize};

/// free 套餐存储上限（100 MB）
pub const FREE_STORAGE_LIMIT_BYTES: u64 = 100 * 1024 * 1024;

/// starter 套餐存储上限（1 GB）
pub const STARTER_STORAGE_LIMIT_BYTES: u64 = 1024 * 1024 * 1024;

/// growth 套餐存储上限（5 GB）
pub const GROWTH_STORAGE_LIMIT_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// pro 套餐存储上限（20 GB）
pub const PRO_STORAGE_LIMIT_BYTES: u64 = 20 * 1024 * 1024 * 1024;

/// 套餐层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Starter,
    Growth,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// 全部套餐层级（目录物化时使用）
    pub const ALL: [PlanTier; 5] = [
        PlanTier::Free,
        PlanTier::Starter,
        PlanTier::Growth,
        PlanTier::Pro,
        PlanTier::Enterprise,
    ];

    /// 从字符串解析套餐层级
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "free" => Some(PlanTier::Free),
            "starter" => Some(PlanTier::Starter),
            "growth" => Some(PlanTier::Growth),
            "pro" => Some(PlanTier::Pro),
            "enterprise" => Some(PlanTier::Enterprise),
            _ => None,
        }
    }

    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Starter => "starter",
            PlanTier::Growth => "growth",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }

    /// 是否为最高层级（最高层级的拒绝文案不带升级提示）
    pub fn is_top_tier(&self) -> bool {
        matches!(self, PlanTier::Enterprise)
    }

    fn index(&self) -> usize {
        match self {
            PlanTier::Free => 0,
            PlanTier::Starter => 1,
            PlanTier::Growth => 2,
            PlanTier::Pro => 3,
            PlanTier::Enterprise => 4,
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 计量资源种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// 通用 AI 请求
    AiGeneralRequest,
    /// AI 训练计划生成
    AiRoutineGeneration,
    /// AI 动作替换建议
    AiExerciseAlternative,
    /// 推送通知
    PushNotification,
    /// 存储字节数
    StorageBytes,
    /// 邮件发送
    EmailSend,
}

impl ResourceKind {
    /// 全部计量资源（目录物化时使用）
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::AiGeneralRequest,
        ResourceKind::AiRoutineGeneration,
        ResourceKind::AiExerciseAlternative,
        ResourceKind::PushNotification,
        ResourceKind::StorageBytes,
        ResourceKind::EmailSend,
    ];

    /// 从字符串解析资源种类
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ai_general_request" => Some(ResourceKind::AiGeneralRequest),
            "ai_routine_generation" => Some(ResourceKind::AiRoutineGeneration),
            "ai_exercise_alternative" => Some(ResourceKind::AiExerciseAlternative),
            "push_notification" => Some(ResourceKind::PushNotification),
            "storage_bytes" => Some(ResourceKind::StorageBytes),
            "email_send" => Some(ResourceKind::EmailSend),
            _ => None,
        }
    }

    /// 转换为字符串（与存储层 resource_kind 列一致）
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::AiGeneralRequest => "ai_general_request",
            ResourceKind::AiRoutineGeneration => "ai_routine_generation",
            ResourceKind::AiExerciseAlternative => "ai_exercise_alternative",
            ResourceKind::PushNotification => "push_notification",
            ResourceKind::StorageBytes => "storage_bytes",
            ResourceKind::EmailSend => "email_send",
        }
    }

    fn index(&self) -> usize {
        match self {
            ResourceKind::AiGeneralRequest => 0,
            ResourceKind::AiRoutineGeneration => 1,
            ResourceKind::AiExerciseAlternative => 2,
            ResourceKind::PushNotification => 3,
            ResourceKind::StorageBytes => 4,
            ResourceKind::EmailSend => 5,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 限额
///
/// `Limited(0)` 表示该层级未开放此功能，与 `Unlimited` 严格区分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// 不限量
    Unlimited,
    /// 数值上限
    Limited(u64),
}

impl Limit {
    /// 从原始整数解析限额（-1 表示不限量，其余非负值为上限）
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            -1 => Some(Limit::Unlimited),
            n if n >= 0 => Some(Limit::Limited(n as u64)),
            _ => None,
        }
    }

    /// 转换为原始整数（对外接口用 -1 表示不限量）
    pub fn as_raw(&self) -> i64 {
        match self {
            Limit::Unlimited => -1,
            Limit::Limited(n) => *n as i64,
        }
    }

    /// 是否不限量
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Limit::Unlimited)
    }
}

/// 内置限额表
fn builtin_limit(tier: PlanTier, resource: ResourceKind) -> Limit {
    use Limit::{Limited, Unlimited};
    use PlanTier::*;
    use ResourceKind::*;

    match (tier, resource) {
        (Free, AiGeneralRequest) => Limited(10),
        (Free, AiRoutineGeneration) => Limited(0),
        (Free, AiExerciseAlternative) => Limited(0),
        (Free, PushNotification) => Limited(50),
        (Free, StorageBytes) => Limited(FREE_STORAGE_LIMIT_BYTES),
        (Free, EmailSend) => Limited(20),

        (Starter, AiGeneralRequest) => Limited(100),
        (Starter, AiRoutineGeneration) => Limited(5),
        (Starter, AiExerciseAlternative) => Limited(20),
        (Starter, PushNotification) => Limited(500),
        (Starter, StorageBytes) => Limited(STARTER_STORAGE_LIMIT_BYTES),
        (Starter, EmailSend) => Limited(200),

        (Growth, AiGeneralRequest) => Limited(500),
        (Growth, AiRoutineGeneration) => Limited(25),
        (Growth, AiExerciseAlternative) => Limited(100),
        (Growth, PushNotification) => Limited(2000),
        (Growth, StorageBytes) => Limited(GROWTH_STORAGE_LIMIT_BYTES),
        (Growth, EmailSend) => Limited(1000),

        (Pro, AiGeneralRequest) => Limited(2000),
        (Pro, AiRoutineGeneration) => Limited(100),
        (Pro, AiExerciseAlternative) => Limited(400),
        (Pro, PushNotification) => Limited(10000),
        (Pro, StorageBytes) => Limited(PRO_STORAGE_LIMIT_BYTES),
        (Pro, EmailSend) => Limited(5000),

        (Enterprise, _) => Unlimited,
    }
}

/// 限额覆盖项（来自配置文件）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitOverride {
    /// 套餐层级（字符串形式，加载时解析）
    pub tier: String,
    /// 资源种类（字符串形式，加载时解析）
    pub resource: String,
    /// 限额（-1 表示不限量）
    pub limit: i64,
}

/// 套餐目录
///
/// 全部 (层级, 资源) 组合在构造时物化为二维表，`limit_for` 是全函数。
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    limits: [[Limit; ResourceKind::ALL.len()]; PlanTier::ALL.len()],
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PlanCatalog {
    /// 创建内置目录
    pub fn builtin() -> Self {
        let mut limits =
            [[Limit::Limited(0); ResourceKind::ALL.len()]; PlanTier::ALL.len()];
        for tier in PlanTier::ALL {
            for resource in ResourceKind::ALL {
                limits[tier.index()][resource.index()] = builtin_limit(tier, resource);
            }
        }
        Self { limits }
    }

    /// 在内置目录上应用配置覆盖
    ///
    /// 覆盖项中的未知层级、未知资源或非法限额值都是配置错误，
    /// 在此处快速失败。
    pub fn with_overrides(
        overrides: &[LimitOverride],
    ) -> Result<Self, crate::error::UsageGuardError> {
        use crate::error::UsageGuardError;

        let mut catalog = Self::builtin();
        for entry in overrides {
            let tier = PlanTier::parse(&entry.tier).ok_or_else(|| {
                UsageGuardError::ConfigError(format!("未知套餐层级: {}", entry.tier))
            })?;
            let resource = ResourceKind::parse(&entry.resource).ok_or_else(|| {
                UsageGuardError::ConfigError(format!("未知资源种类: {}", entry.resource))
            })?;
            let limit = Limit::from_raw(entry.limit).ok_or_else(|| {
                UsageGuardError::ConfigError(format!(
                    "非法限额值: {} ({}/{})",
                    entry.limit, entry.tier, entry.resource
                ))
            })?;
            catalog.limits[tier.index()][resource.index()] = limit;
        }
        Ok(catalog)
    }

    /// 查询限额（全函数，构造时已对全部组合物化）
    pub fn limit_for(&self, tier: PlanTier, resource: ResourceKind) -> Limit {
        self.limits[tier.index()][resource.index()]
    }
}
