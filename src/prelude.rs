//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from Meterion,
//! allowing users to import them with a single `use meterion::prelude::*;`
//! statement instead of importing each type individually.

// Core types - always available
pub use crate::enforcer::{QuotaCheck, UsageEnforcer};
pub use crate::error::{ConsumeOutcome, UsageGuardError};
pub use crate::evaluator::evaluate;
pub use crate::period::{PeriodAnchor, UsagePeriod};
pub use crate::plan::{Limit, PlanCatalog, PlanTier, ResourceKind};
pub use crate::resolver::{PlanResolver, StaticPlanResolver};
pub use crate::storage::{MemoryUsageStorage, UsageStorage};

// Feature-gated exports
#[cfg(feature = "postgres")]
pub use crate::postgres_storage::PostgresUsageStorage;
