//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 套餐解析模块
//!
//! 组织当前的套餐层级与周期锚定日由外部系统维护，这里只定义解析
//! 接口和两个实现：静态表（测试、单机）与 TTL 缓存包装。套餐变更
//! 后最多一个 TTL 内读到旧层级是可接受的容忍度，不是正确性缺陷。

use crate::error::StorageError;
use crate::period::PeriodAnchor;
use crate::plan::PlanTier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// 组织的套餐信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgPlan {
    /// 当前套餐层级
    pub tier: PlanTier,
    /// 计费周期锚定日
    pub anchor: PeriodAnchor,
}

/// 套餐解析接口
#[async_trait]
pub trait PlanResolver: Send + Sync {
    /// 解析组织的套餐信息（层级 + 周期锚定日）
    async fn resolve(&self, organization_id: &str) -> Result<OrgPlan, StorageError>;

    /// 解析组织当前的套餐层级
    async fn plan_tier(&self, organization_id: &str) -> Result<PlanTier, StorageError> {
        Ok(self.resolve(organization_id).await?.tier)
    }

    /// 解析组织的计费周期锚定日
    async fn period_anchor(&self, organization_id: &str) -> Result<PeriodAnchor, StorageError> {
        Ok(self.resolve(organization_id).await?.anchor)
    }
}

#[async_trait]
impl<R: PlanResolver + ?Sized> PlanResolver for Arc<R> {
    async fn resolve(&self, organization_id: &str) -> Result<OrgPlan, StorageError> {
        (**self).resolve(organization_id).await
    }
}

/// 静态套餐解析器
///
/// 进程内维护的组织表，供测试与单机部署使用。层级只能通过显式的
/// `change_plan` 变更。
pub struct StaticPlanResolver {
    plans: dashmap::DashMap<String, OrgPlan>,
}

impl StaticPlanResolver {
    /// 创建空的解析器
    pub fn new() -> Self {
        Self {
            plans: dashmap::DashMap::new(),
        }
    }

    /// 注册组织
    pub fn register(&self, organization_id: &str, tier: PlanTier, anchor: PeriodAnchor) {
        self.plans
            .insert(organization_id.to_string(), OrgPlan { tier, anchor });
    }

    /// 显式套餐变更
    pub fn change_plan(&self, organization_id: &str, tier: PlanTier) {
        if let Some(mut plan) = self.plans.get_mut(organization_id) {
            plan.tier = tier;
        }
    }
}

impl Default for StaticPlanResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlanResolver for StaticPlanResolver {
    async fn resolve(&self, organization_id: &str) -> Result<OrgPlan, StorageError> {
        self.plans
            .get(organization_id)
            .map(|p| *p)
            .ok_or_else(|| StorageError::NotFound(format!("组织未注册: {}", organization_id)))
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedPlan {
    plan: OrgPlan,
    fetched_at: DateTime<Utc>,
}

/// 带 TTL 缓存的套餐解析器
///
/// 套餐解析在每次配额检查的热路径上，缓存命中时省掉一次外部往返。
pub struct CachedPlanResolver<R: PlanResolver> {
    inner: R,
    ttl: Duration,
    cache: dashmap::DashMap<String, CachedPlan>,
}

impl<R: PlanResolver> CachedPlanResolver<R> {
    /// 包装解析器，`ttl` 为缓存有效期
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: dashmap::DashMap::new(),
        }
    }

    /// 主动失效某组织的缓存（套餐变更后调用可立即生效）
    pub fn invalidate(&self, organization_id: &str) {
        self.cache.remove(organization_id);
    }
}

#[async_trait]
impl<R: PlanResolver> PlanResolver for CachedPlanResolver<R> {
    async fn resolve(&self, organization_id: &str) -> Result<OrgPlan, StorageError> {
        let now = Utc::now();
        if let Some(cached) = self.cache.get(organization_id) {
            let age = now.signed_duration_since(cached.fetched_at);
            if age.num_milliseconds() >= 0 && (age.num_milliseconds() as u128) < self.ttl.as_millis()
            {
                return Ok(cached.plan);
            }
        }

        let plan = self.inner.resolve(organization_id).await?;
        self.cache.insert(
            organization_id.to_string(),
            CachedPlan {
                plan,
                fetched_at: now,
            },
        );
        Ok(plan)
    }
}
