//! 存储抽象层
//!
//! 定义用量存储接口和内存实现。`increment_usage` 是整个机制中唯一
//! 对正确性关键的契约：必须是存储层的原子自增，并发请求不得丢失
//! 更新。应用层禁止“读-改-写”三步实现。

use crate::error::StorageError;
use crate::period::UsagePeriod;
use crate::plan::ResourceKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一条历史用量记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// 所属计费周期
    pub period: UsagePeriod,
    /// 周期内累计用量
    pub count: u64,
}

/// 用量存储接口
///
/// 每个 (组织, 资源, 周期) 对应一个计数器。计数器在首次消费时惰性
/// 物化，只增不减；周期结束后被新周期的计数器取代而非删除，历史
/// 记录保留用于审计。
#[async_trait]
pub trait UsageStorage: Send + Sync {
    /// 获取指定周期的用量，计数器尚未物化时返回 0（不是错误）
    async fn get_usage(
        &self,
        organization_id: &str,
        resource: ResourceKind,
        period: &UsagePeriod,
    ) -> Result<u64, StorageError>;

    /// 原子自增用量，返回自增后的值
    ///
    /// 必须实现为存储层的单条原子操作（原子加或等价的单语句更新），
    /// 并发自增不得丢失更新。
    async fn increment_usage(
        &self,
        organization_id: &str,
        resource: ResourceKind,
        period: &UsagePeriod,
        amount: u64,
    ) -> Result<u64, StorageError>;

    /// 获取历史用量（含已结束周期），按周期开始时间升序
    async fn usage_history(
        &self,
        organization_id: &str,
        resource: ResourceKind,
    ) -> Result<Vec<UsageRecord>, StorageError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    organization_id: String,
    resource: ResourceKind,
    starts_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CounterEntry {
    period: UsagePeriod,
    count: u64,
}

/// 内存存储实现
///
/// 自增在 DashMap 的 entry 锁内完成，对单个 key 是原子的。历史
/// 周期的计数器保留在表中，不做清理。
pub struct MemoryUsageStorage {
    counters: dashmap::DashMap<CounterKey, CounterEntry>,
}

impl MemoryUsageStorage {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self {
            counters: dashmap::DashMap::new(),
        }
    }
}

impl Default for MemoryUsageStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageStorage for MemoryUsageStorage {
    async fn get_usage(
        &self,
        organization_id: &str,
        resource: ResourceKind,
        period: &UsagePeriod,
    ) -> Result<u64, StorageError> {
        let key = CounterKey {
            organization_id: organization_id.to_string(),
            resource,
            starts_at: period.starts_at,
        };
        Ok(self.counters.get(&key).map(|e| e.count).unwrap_or(0))
    }

    async fn increment_usage(
        &self,
        organization_id: &str,
        resource: ResourceKind,
        period: &UsagePeriod,
        amount: u64,
    ) -> Result<u64, StorageError> {
        let key = CounterKey {
            organization_id: organization_id.to_string(),
            resource,
            starts_at: period.starts_at,
        };

        // entry 锁住单个 key 的分片，自增期间不会与其他写入交错
        let mut entry = self.counters.entry(key).or_insert_with(|| CounterEntry {
            period: *period,
            count: 0,
        });
        entry.count = entry.count.saturating_add(amount);
        Ok(entry.count)
    }

    async fn usage_history(
        &self,
        organization_id: &str,
        resource: ResourceKind,
    ) -> Result<Vec<UsageRecord>, StorageError> {
        let mut records: Vec<UsageRecord> = self
            .counters
            .iter()
            .filter(|e| {
                e.key().organization_id == organization_id && e.key().resource == resource
            })
            .map(|e| UsageRecord {
                period: e.value().period,
                count: e.value().count,
            })
            .collect();
        records.sort_by_key(|r| r.period.starts_at);
        Ok(records)
    }
}

/// Mock用量存储
pub struct MockUsageStorage;

#[async_trait]
impl UsageStorage for MockUsageStorage {
    async fn get_usage(
        &self,
        _organization_id: &str,
        _resource: ResourceKind,
        _period: &UsagePeriod,
    ) -> Result<u64, StorageError> {
        Ok(0)
    }

    async fn increment_usage(
        &self,
        _organization_id: &str,
        _resource: ResourceKind,
        _period: &UsagePeriod,
        amount: u64,
    ) -> Result<u64, StorageError> {
        Ok(amount)
    }

    async fn usage_history(
        &self,
        _organization_id: &str,
        _resource: ResourceKind,
    ) -> Result<Vec<UsageRecord>, StorageError> {
        Ok(Vec::new())
    }
}
