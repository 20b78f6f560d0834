//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 配额评估模块
//!
//! 纯函数，无 I/O。限额与用量的比较、剩余量与使用率的计算全部
//! 集中在这里，调用方不得在各处重复这套算术。

use crate::plan::Limit;
use serde::{Deserialize, Serialize};

/// 评估结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaEvaluation {
    /// 是否允许继续消费
    pub allowed: bool,
    /// 剩余配额（不限量时为 -1）
    pub remaining: i64,
    /// 使用率（四舍五入的整数百分比；超额消费时可大于 100）
    pub percentage: u32,
}

/// 评估当前用量相对限额的状态
///
/// - 不限量：始终允许，剩余为 -1，使用率为 0
/// - 限额为 0：该功能未开放，无论用量多少都拒绝，使用率为 100
/// - 其余：`allowed = used < limit`，`remaining = max(0, limit - used)`，
///   `percentage = round(100 * used / limit)`
pub fn evaluate(limit: Limit, used: u64) -> QuotaEvaluation {
    match limit {
        Limit::Unlimited => QuotaEvaluation {
            allowed: true,
            remaining: -1,
            percentage: 0,
        },
        Limit::Limited(0) => QuotaEvaluation {
            allowed: false,
            remaining: 0,
            percentage: 100,
        },
        Limit::Limited(limit) => QuotaEvaluation {
            allowed: used < limit,
            remaining: limit.saturating_sub(used) as i64,
            percentage: rounded_percent(used, limit),
        },
    }
}

/// 整数四舍五入百分比，按 u128 计算避免大用量（存储字节）溢出
fn rounded_percent(used: u64, limit: u64) -> u32 {
    let percent = (used as u128 * 100 + limit as u128 / 2) / limit as u128;
    percent.min(u32::MAX as u128) as u32
}
