//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 计费周期模块
//!
//! 计费周期是左闭右开区间 `[starts_at, ends_at)`，按日历月滚动，
//! 锚定在组织级的锚定日（通常为注册日）。周期永不重叠，上一周期
//! 的 `ends_at` 即下一周期的 `starts_at`。全部为纯计算，无 I/O。

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 一个计费周期，`[starts_at, ends_at)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsagePeriod {
    /// 周期开始（含）
    pub starts_at: DateTime<Utc>,
    /// 周期结束（不含），即配额重置时刻
    pub ends_at: DateTime<Utc>,
}

impl UsagePeriod {
    /// 判断时刻是否落在本周期内
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.starts_at <= at && at < self.ends_at
    }
}

/// 周期锚定日（1-31，短月自动收敛到月末）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodAnchor {
    day: u32,
}

impl Default for PeriodAnchor {
    fn default() -> Self {
        Self::first_of_month()
    }
}

impl PeriodAnchor {
    /// 创建锚定日，超出 1-31 的值收敛到边界
    pub fn new(day: u32) -> Self {
        Self {
            day: day.clamp(1, 31),
        }
    }

    /// 每月一号锚定
    pub fn first_of_month() -> Self {
        Self { day: 1 }
    }

    /// 从组织注册时刻取锚定日
    pub fn from_signup(signed_up_at: DateTime<Utc>) -> Self {
        Self::new(signed_up_at.day())
    }

    /// 锚定日
    pub fn day(&self) -> u32 {
        self.day
    }

    /// 计算包含 `now` 的计费周期
    ///
    /// 给定锚定日后完全确定，无需任何存储往返。锚定日 31 在二月
    /// 收敛为 28/29，在小月收敛为 30。
    pub fn period_containing(&self, now: DateTime<Utc>) -> UsagePeriod {
        let this_anchor = self.anchor_in_month(now.year(), now.month());

        if now >= this_anchor {
            let (ny, nm) = next_month(now.year(), now.month());
            UsagePeriod {
                starts_at: this_anchor,
                ends_at: self.anchor_in_month(ny, nm),
            }
        } else {
            let (py, pm) = prev_month(now.year(), now.month());
            UsagePeriod {
                starts_at: self.anchor_in_month(py, pm),
                ends_at: this_anchor,
            }
        }
    }

    /// 紧随其后的下一个周期
    pub fn next_period(&self, period: &UsagePeriod) -> UsagePeriod {
        self.period_containing(period.ends_at)
    }

    /// 指定年月中的锚定时刻（当月 0 点，锚定日收敛到月末）
    fn anchor_in_month(&self, year: i32, month: u32) -> DateTime<Utc> {
        let day = self.day.min(days_in_month(year, month));
        // day 已收敛到当月有效范围，构造不会失败
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or_else(Utc::now)
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn prev_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = next_month(year, month);
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}
