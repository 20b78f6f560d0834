//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Meterion - Plan-Tier Usage Metering & Quota Enforcement
//!
//! Provides per-organization quota enforcement over a monthly billing
//! cycle: plan catalog lookup, pure quota evaluation, atomic usage
//! counters, and a single enforcement facade for application code.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use meterion::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`UsageEnforcer`] - The enforcement facade (check / consume)
//! - [`PlanCatalog`] - Plan tier → limit lookup, total over all pairs
//! - [`evaluate`] - Pure quota evaluation, no I/O
//! - [`UsageStorage`] - Atomic counter storage contract
//! - [`PlanResolver`] - Organization plan-tier resolution
//!
//! ## Storage backends (feature-gated)
//!
//! - Memory storage (`memory` feature, default)
//! - PostgreSQL storage (`postgres` feature)
//!
//! # Examples
//!
//! ```rust
//! use meterion::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let resolver = StaticPlanResolver::new();
//!     resolver.register("gym-42", PlanTier::Starter, PeriodAnchor::first_of_month());
//!
//!     let enforcer = UsageEnforcer::new(
//!         MemoryUsageStorage::new(),
//!         resolver,
//!         PlanCatalog::builtin(),
//!     );
//!
//!     // 检查 -> 执行被门控的动作 -> 记账
//!     let check = enforcer
//!         .check_limit("gym-42", ResourceKind::AiRoutineGeneration)
//!         .await
//!         .unwrap();
//!     if check.allowed {
//!         let outcome = enforcer
//!             .consume("gym-42", ResourceKind::AiRoutineGeneration)
//!             .await
//!             .unwrap();
//!         assert!(outcome.success);
//!     }
//! }
//! ```
//!
//! # Features
//!
//! - **Plan catalog**: five tiers, six metered resources, unlimited
//!   sentinel distinct from a zero (feature-disabled) limit
//! - **Monthly billing periods**: anchored to a per-organization day,
//!   clamped in short months, half-open and never overlapping
//! - **Atomic counters**: increments are single storage-level
//!   operations; concurrent requests never lose updates
//! - **Fail closed**: storage outages deny with a retryable error,
//!   never silently allow unlimited usage
//! - **Threshold alerts**: deduplicated usage alerts through `tracing`

pub mod prelude;

pub mod config;
pub mod enforcer;
pub mod error;
pub mod evaluator;
pub mod period;
pub mod plan;
#[cfg(feature = "postgres")]
pub mod postgres_storage;
pub mod resolver;
pub mod storage;

// 重新导出常用类型
pub use config::{MeterConfig, DEFAULT_PLAN_CACHE_TTL_SECS};
pub use enforcer::{
    AlertConfig, QuotaCheck, UsageEnforcer, DEFAULT_ALERT_DEDUP_WINDOW_SECS,
    DEFAULT_ALERT_THRESHOLDS,
};
pub use error::{ConsumeOutcome, StorageError, UsageGuardError};
pub use evaluator::{evaluate, QuotaEvaluation};
pub use period::{PeriodAnchor, UsagePeriod};
pub use plan::{Limit, LimitOverride, PlanCatalog, PlanTier, ResourceKind};
#[cfg(feature = "postgres")]
pub use postgres_storage::{PostgresStorageConfig, PostgresUsageStorage};
pub use resolver::{CachedPlanResolver, OrgPlan, PlanResolver, StaticPlanResolver};
pub use storage::{MemoryUsageStorage, MockUsageStorage, UsageRecord, UsageStorage};
