//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 用量门禁模块
//!
//! 应用代码唯一的入口：`check_limit` 决定放行/拒绝，`consume` 原子
//! 记账。两者是分离的调用，中间存在已知的竞态：并发请求可能在仅剩
//! 一个配额时同时通过检查、随后都记账，导致轻微超额。这是有意保留
//! 的行为，收紧为“余量足够才记账”的单条原子操作会改变可观察语义。
//!
//! 存储故障时 `check_limit` 失败关闭（fail closed）：返回可重试的
//! 存储错误而不是放行，计费资源绝不允许在不确定时失败打开。

/// 默认告警阈值（使用率百分比）
pub const DEFAULT_ALERT_THRESHOLDS: [u8; 3] = [80, 90, 100];

/// 默认告警去重窗口（5分钟）
pub const DEFAULT_ALERT_DEDUP_WINDOW_SECS: u64 = 300;

use crate::error::{ConsumeOutcome, UsageGuardError};
use crate::evaluator::evaluate;
use crate::plan::{Limit, PlanCatalog, PlanTier, ResourceKind};
use crate::resolver::{OrgPlan, PlanResolver};
use crate::storage::{UsageRecord, UsageStorage};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// 告警配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// 是否启用告警
    pub enabled: bool,
    /// 告警阈值（使用率百分比）
    pub thresholds: Vec<u8>,
    /// 告警去重时间窗口（秒）
    pub dedup_window: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thresholds: DEFAULT_ALERT_THRESHOLDS.to_vec(),
            dedup_window: DEFAULT_ALERT_DEDUP_WINDOW_SECS,
        }
    }
}

/// 配额检查结果
///
/// `limit` 与 `remaining` 用 -1 表示不限量。`message` 仅在拒绝时
/// 填充，面向最终用户展示，包含重置日期。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCheck {
    /// 是否允许执行被门控的动作
    pub allowed: bool,
    /// 本周期已用量
    pub current: u64,
    /// 限额（-1 表示不限量）
    pub limit: i64,
    /// 剩余配额（-1 表示不限量）
    pub remaining: i64,
    /// 配额重置时刻（当前周期的结束）
    pub reset_date: DateTime<Utc>,
    /// 拒绝时的用户可读文案
    pub message: Option<String>,
}

type SharedClock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// 用量门禁
///
/// 组合套餐目录、套餐解析器、用量存储与评估器。无状态（告警去重
/// 缓存除外），读幂等、写单调。
pub struct UsageEnforcer<S: UsageStorage, R: PlanResolver> {
    storage: Arc<S>,
    resolver: Arc<R>,
    catalog: PlanCatalog,
    alerts: AlertConfig,
    /// 告警去重缓存（key: org:resource:threshold, value: last_alert_time）
    alert_dedup: Arc<DashMap<String, DateTime<Utc>>>,
    clock: SharedClock,
}

impl<S: UsageStorage, R: PlanResolver> UsageEnforcer<S, R> {
    /// 创建门禁，使用内置套餐目录和默认告警配置
    pub fn new(storage: S, resolver: R, catalog: PlanCatalog) -> Self {
        Self {
            storage: Arc::new(storage),
            resolver: Arc::new(resolver),
            catalog,
            alerts: AlertConfig::default(),
            alert_dedup: Arc::new(DashMap::new()),
            clock: Arc::new(Utc::now),
        }
    }

    /// 替换告警配置
    pub fn with_alerts(mut self, alerts: AlertConfig) -> Self {
        self.alerts = alerts;
        self
    }

    /// 注入时钟（周期滚动测试用）
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// 检查配额
    ///
    /// 无副作用、幂等：连续两次调用（中间无 `consume`）返回相同结果。
    /// 调用方在拿到 `allowed = true` 后执行被门控的动作，再调用
    /// `consume` 记账。
    pub async fn check_limit(
        &self,
        organization_id: &str,
        resource: ResourceKind,
    ) -> Result<QuotaCheck, UsageGuardError> {
        self.check_amount(organization_id, resource, 1).await
    }

    /// 组合检查：动作将一次消费 `amount` 个单位时使用
    ///
    /// 要求 `remaining >= amount`，而不仅是 `used < limit`。
    pub async fn check_amount(
        &self,
        organization_id: &str,
        resource: ResourceKind,
        amount: u64,
    ) -> Result<QuotaCheck, UsageGuardError> {
        let plan = self.resolver.resolve(organization_id).await?;
        let limit = self.catalog.limit_for(plan.tier, resource);
        let now = (self.clock)();
        let period = plan.anchor.period_containing(now);

        let used = self
            .storage
            .get_usage(organization_id, resource, &period)
            .await?;

        let eval = evaluate(limit, used);
        let enough = eval.remaining < 0 || eval.remaining as u64 >= amount;
        let allowed = eval.allowed && enough;

        debug!(
            organization_id,
            resource = %resource,
            used,
            limit = limit.as_raw(),
            amount,
            allowed,
            "配额检查"
        );

        let message = if allowed {
            None
        } else {
            Some(self.denial_message(
                resource, limit, eval.remaining, amount, plan.tier, &period.ends_at,
            ))
        };

        Ok(QuotaCheck {
            allowed,
            current: used,
            limit: limit.as_raw(),
            remaining: eval.remaining,
            reset_date: period.ends_at,
            message,
        })
    }

    /// 记账一个单位
    pub async fn consume(
        &self,
        organization_id: &str,
        resource: ResourceKind,
    ) -> Result<ConsumeOutcome, UsageGuardError> {
        self.consume_amount(organization_id, resource, 1).await
    }

    /// 记账 `amount` 个单位
    ///
    /// 无条件原子自增，不做限额复查，调用方应先通过 `check_limit`。
    /// 返回 `Err` 时记账未被存储层确认，调用方不得把被门控的动作当作
    /// 已计费成功。
    pub async fn consume_amount(
        &self,
        organization_id: &str,
        resource: ResourceKind,
        amount: u64,
    ) -> Result<ConsumeOutcome, UsageGuardError> {
        let plan = self.resolver.resolve(organization_id).await?;
        let limit = self.catalog.limit_for(plan.tier, resource);
        let now = (self.clock)();
        let period = plan.anchor.period_containing(now);

        if amount == 0 {
            let used = self
                .storage
                .get_usage(organization_id, resource, &period)
                .await?;
            return Ok(ConsumeOutcome {
                success: true,
                remaining: evaluate(limit, used).remaining,
            });
        }

        let new_used = self
            .storage
            .increment_usage(organization_id, resource, &period, amount)
            .await?;

        let eval = evaluate(limit, new_used);

        debug!(
            organization_id,
            resource = %resource,
            amount,
            new_used,
            remaining = eval.remaining,
            "配额记账"
        );

        if let Limit::Limited(l) = limit {
            if new_used > l {
                warn!(
                    organization_id,
                    resource = %resource,
                    new_used,
                    limit = l,
                    "记账后超过限额（检查与记账之间的并发竞态）"
                );
            }
        }

        self.check_and_trigger_alert(organization_id, resource, limit, new_used, now);

        Ok(ConsumeOutcome {
            success: true,
            remaining: eval.remaining,
        })
    }

    /// 历史用量（含已结束周期，审计用）
    pub async fn usage_history(
        &self,
        organization_id: &str,
        resource: ResourceKind,
    ) -> Result<Vec<UsageRecord>, UsageGuardError> {
        Ok(self.storage.usage_history(organization_id, resource).await?)
    }

    /// 拒绝文案：始终带重置日期，非最高层级附带升级提示
    fn denial_message(
        &self,
        resource: ResourceKind,
        limit: Limit,
        remaining: i64,
        amount: u64,
        tier: PlanTier,
        reset_date: &DateTime<Utc>,
    ) -> String {
        let reset = reset_date.format("%Y-%m-%d");
        let mut message = match limit {
            Limit::Limited(0) => format!("当前套餐未开放 {}", resource),
            _ if remaining > 0 => format!(
                "{} 剩余配额不足: 需要 {}, 剩余 {}, 将于 {} 重置",
                resource, amount, remaining, reset
            ),
            _ => format!("{} 配额已用尽, 将于 {} 重置", resource, reset),
        };
        if !tier.is_top_tier() {
            message.push_str(", 升级套餐可提高限额");
        }
        message
    }

    /// 检查并触发阈值告警（去重后通过 tracing 发出）
    fn check_and_trigger_alert(
        &self,
        organization_id: &str,
        resource: ResourceKind,
        limit: Limit,
        used: u64,
        now: DateTime<Utc>,
    ) {
        if !self.alerts.enabled {
            return;
        }
        let limit_value = match limit {
            Limit::Limited(l) if l > 0 => l,
            _ => return,
        };

        let percentage = evaluate(limit, used).percentage;

        for &threshold in &self.alerts.thresholds {
            if percentage < threshold as u32 {
                continue;
            }

            let dedup_key = format!("{}:{}:{}", organization_id, resource, threshold);
            let should_alert = match self.alert_dedup.get(&dedup_key) {
                Some(last) => {
                    let elapsed = now.signed_duration_since(*last);
                    elapsed >= Duration::seconds(self.alerts.dedup_window as i64)
                }
                None => true,
            };

            if should_alert {
                warn!(
                    organization_id,
                    resource = %resource,
                    threshold,
                    used,
                    limit = limit_value,
                    percentage,
                    "配额使用率告警"
                );
                self.alert_dedup.insert(dedup_key, now);
            }
        }
    }

    /// 清理过期的告警去重记录
    pub fn cleanup_alert_dedup(&self) {
        let now = (self.clock)();
        let dedup_window = Duration::seconds(self.alerts.dedup_window as i64);
        self.alert_dedup
            .retain(|_, last| now.signed_duration_since(*last) < dedup_window);
    }

    /// 告警配置
    pub fn alerts(&self) -> &AlertConfig {
        &self.alerts
    }

    /// 解析组织套餐（层级与锚定日），转发给解析器
    pub async fn org_plan(&self, organization_id: &str) -> Result<OrgPlan, UsageGuardError> {
        Ok(self.resolver.resolve(organization_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::period::{PeriodAnchor, UsagePeriod};
    use crate::resolver::StaticPlanResolver;
    use crate::storage::MemoryUsageStorage;
    use async_trait::async_trait;

    fn enforcer_with(
        tier: PlanTier,
    ) -> UsageEnforcer<MemoryUsageStorage, StaticPlanResolver> {
        let resolver = StaticPlanResolver::new();
        resolver.register("org1", tier, PeriodAnchor::first_of_month());
        UsageEnforcer::new(
            MemoryUsageStorage::new(),
            resolver,
            PlanCatalog::builtin(),
        )
    }

    #[tokio::test]
    async fn test_check_allows_fresh_org() {
        let enforcer = enforcer_with(PlanTier::Starter);
        let check = enforcer
            .check_limit("org1", ResourceKind::AiRoutineGeneration)
            .await
            .unwrap();
        assert!(check.allowed);
        assert_eq!(check.current, 0);
        assert_eq!(check.limit, 5);
        assert_eq!(check.remaining, 5);
        assert!(check.message.is_none());
    }

    #[tokio::test]
    async fn test_unlimited_tier_always_allowed() {
        let enforcer = enforcer_with(PlanTier::Enterprise);
        for _ in 0..10 {
            enforcer
                .consume("org1", ResourceKind::EmailSend)
                .await
                .unwrap();
        }
        let check = enforcer
            .check_limit("org1", ResourceKind::EmailSend)
            .await
            .unwrap();
        assert!(check.allowed);
        assert_eq!(check.limit, -1);
        assert_eq!(check.remaining, -1);
    }

    /// 零限额：功能未开放，文案带升级提示
    #[tokio::test]
    async fn test_feature_disabled_message() {
        let enforcer = enforcer_with(PlanTier::Free);
        let check = enforcer
            .check_limit("org1", ResourceKind::AiRoutineGeneration)
            .await
            .unwrap();
        assert!(!check.allowed);
        assert_eq!(check.limit, 0);
        let message = check.message.unwrap();
        assert!(message.contains("未开放"));
        assert!(message.contains("升级套餐"));
    }

    /// 最高层级的拒绝文案不带升级提示
    #[tokio::test]
    async fn test_top_tier_denial_without_upgrade_hint() {
        let overrides = vec![crate::plan::LimitOverride {
            tier: "enterprise".to_string(),
            resource: "email_send".to_string(),
            limit: 0,
        }];
        let resolver = StaticPlanResolver::new();
        resolver.register("org1", PlanTier::Enterprise, PeriodAnchor::first_of_month());
        let enforcer = UsageEnforcer::new(
            MemoryUsageStorage::new(),
            resolver,
            PlanCatalog::with_overrides(&overrides).unwrap(),
        );

        let check = enforcer
            .check_limit("org1", ResourceKind::EmailSend)
            .await
            .unwrap();
        assert!(!check.allowed);
        assert!(!check.message.unwrap().contains("升级套餐"));
    }

    /// 组合检查：remaining=3 时请求 5 个单位必须被拒绝
    #[tokio::test]
    async fn test_composite_amount_denied() {
        let overrides = vec![crate::plan::LimitOverride {
            tier: "starter".to_string(),
            resource: "push_notification".to_string(),
            limit: 10,
        }];
        let resolver = StaticPlanResolver::new();
        resolver.register("org1", PlanTier::Starter, PeriodAnchor::first_of_month());
        let enforcer = UsageEnforcer::new(
            MemoryUsageStorage::new(),
            resolver,
            PlanCatalog::with_overrides(&overrides).unwrap(),
        );

        enforcer
            .consume_amount("org1", ResourceKind::PushNotification, 7)
            .await
            .unwrap();

        // used=7 < limit=10，单个单位仍允许
        let single = enforcer
            .check_limit("org1", ResourceKind::PushNotification)
            .await
            .unwrap();
        assert!(single.allowed);
        assert_eq!(single.remaining, 3);

        // 一次要 5 个则被组合检查拒绝
        let batch = enforcer
            .check_amount("org1", ResourceKind::PushNotification, 5)
            .await
            .unwrap();
        assert!(!batch.allowed);
        assert!(batch.message.unwrap().contains("剩余配额不足"));
    }

    /// 幂等检查：两次 check 之间无 consume，结果一致
    #[tokio::test]
    async fn test_check_is_idempotent() {
        let enforcer = enforcer_with(PlanTier::Starter);
        enforcer
            .consume("org1", ResourceKind::AiRoutineGeneration)
            .await
            .unwrap();

        let first = enforcer
            .check_limit("org1", ResourceKind::AiRoutineGeneration)
            .await
            .unwrap();
        let second = enforcer
            .check_limit("org1", ResourceKind::AiRoutineGeneration)
            .await
            .unwrap();
        assert_eq!(first.allowed, second.allowed);
        assert_eq!(first.current, second.current);
        assert_eq!(first.remaining, second.remaining);
        assert_eq!(first.reset_date, second.reset_date);
    }

    #[tokio::test]
    async fn test_consume_reports_post_increment_remaining() {
        let enforcer = enforcer_with(PlanTier::Starter);
        let outcome = enforcer
            .consume("org1", ResourceKind::AiRoutineGeneration)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.remaining, 4);

        let outcome = enforcer
            .consume_amount("org1", ResourceKind::AiRoutineGeneration, 3)
            .await
            .unwrap();
        assert_eq!(outcome.remaining, 1);
    }

    /// consume 不做限额复查：超额记账照常落账（文档化的竞态）
    #[tokio::test]
    async fn test_consume_does_not_recheck() {
        let enforcer = enforcer_with(PlanTier::Starter);
        let outcome = enforcer
            .consume_amount("org1", ResourceKind::AiRoutineGeneration, 8)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.remaining, 0);

        let check = enforcer
            .check_limit("org1", ResourceKind::AiRoutineGeneration)
            .await
            .unwrap();
        assert!(!check.allowed);
        assert_eq!(check.current, 8);
    }

    #[tokio::test]
    async fn test_consume_zero_amount_is_noop() {
        let enforcer = enforcer_with(PlanTier::Starter);
        let outcome = enforcer
            .consume_amount("org1", ResourceKind::AiRoutineGeneration, 0)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.remaining, 5);

        let check = enforcer
            .check_limit("org1", ResourceKind::AiRoutineGeneration)
            .await
            .unwrap();
        assert_eq!(check.current, 0);
    }

    /// 存储故障时失败关闭：返回可重试错误，而不是放行
    struct OutageStorage;

    #[async_trait]
    impl UsageStorage for OutageStorage {
        async fn get_usage(
            &self,
            _organization_id: &str,
            _resource: ResourceKind,
            _period: &UsagePeriod,
        ) -> Result<u64, StorageError> {
            Err(StorageError::TimeoutError("存储不可达".to_string()))
        }

        async fn increment_usage(
            &self,
            _organization_id: &str,
            _resource: ResourceKind,
            _period: &UsagePeriod,
            _amount: u64,
        ) -> Result<u64, StorageError> {
            Err(StorageError::TimeoutError("存储不可达".to_string()))
        }

        async fn usage_history(
            &self,
            _organization_id: &str,
            _resource: ResourceKind,
        ) -> Result<Vec<UsageRecord>, StorageError> {
            Err(StorageError::TimeoutError("存储不可达".to_string()))
        }
    }

    #[tokio::test]
    async fn test_check_fails_closed_on_storage_outage() {
        let resolver = StaticPlanResolver::new();
        resolver.register("org1", PlanTier::Enterprise, PeriodAnchor::first_of_month());
        let enforcer = UsageEnforcer::new(OutageStorage, resolver, PlanCatalog::builtin());

        // 即使是不限量层级，存储故障也不放行
        let err = enforcer
            .check_limit("org1", ResourceKind::EmailSend)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_consume_surfaces_storage_failure() {
        let resolver = StaticPlanResolver::new();
        resolver.register("org1", PlanTier::Starter, PeriodAnchor::first_of_month());
        let enforcer = UsageEnforcer::new(OutageStorage, resolver, PlanCatalog::builtin());

        let err = enforcer
            .consume("org1", ResourceKind::EmailSend)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    /// 阈值告警触发与去重
    #[tokio::test]
    async fn test_alert_dedup() {
        let enforcer = enforcer_with(PlanTier::Starter).with_alerts(AlertConfig {
            enabled: true,
            thresholds: vec![80],
            dedup_window: 3600,
        });

        // 4/5 = 80%，首次越过阈值记入去重缓存
        enforcer
            .consume_amount("org1", ResourceKind::AiRoutineGeneration, 4)
            .await
            .unwrap();
        assert_eq!(enforcer.alert_dedup.len(), 1);

        // 去重窗口内再次越过阈值，不新增记录
        enforcer
            .consume("org1", ResourceKind::AiRoutineGeneration)
            .await
            .unwrap();
        assert_eq!(enforcer.alert_dedup.len(), 1);
    }

    #[tokio::test]
    async fn test_alert_disabled() {
        let enforcer = enforcer_with(PlanTier::Starter).with_alerts(AlertConfig {
            enabled: false,
            ..Default::default()
        });
        enforcer
            .consume_amount("org1", ResourceKind::AiRoutineGeneration, 5)
            .await
            .unwrap();
        assert!(enforcer.alert_dedup.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_alert_dedup() {
        let enforcer = enforcer_with(PlanTier::Starter).with_alerts(AlertConfig {
            enabled: true,
            thresholds: vec![80],
            dedup_window: 0,
        });
        enforcer
            .consume_amount("org1", ResourceKind::AiRoutineGeneration, 5)
            .await
            .unwrap();
        enforcer.cleanup_alert_dedup();
        assert!(enforcer.alert_dedup.is_empty());
    }
}
