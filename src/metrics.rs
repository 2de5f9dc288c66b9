//! Counts, growth and retention.
//!
//! Every percentage in this module follows the same zero-baseline rule:
//! growth from an empty previous period is reported as 100, and growth
//! between two empty periods as 0. No function here can produce NaN or
//! infinity.

use crate::dataset::Dataset;
use crate::period::Period;
use crate::visitor::VisitorRecord;
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Rounds half up, like the dashboard's `Math.round`.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Rounds to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Whole-number growth of `current` over `previous`.
pub fn growth_percent(current: usize, previous: usize) -> i64 {
    if previous > 0 {
        let delta = current as f64 - previous as f64;
        round_half_up(delta / previous as f64 * 100.0)
    } else if current > 0 {
        100
    } else {
        0
    }
}

/// One-decimal change of `current` over `previous`.
pub fn change_percent(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        round1((current - previous) / previous * 100.0)
    } else if current > 0.0 {
        100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Growth {
    pub current: usize,
    pub previous: usize,
    pub delta: i64,
    pub percent: i64,
}

impl Growth {
    pub fn between(current: usize, previous: usize) -> Self {
        Growth {
            current,
            previous,
            delta: current as i64 - previous as i64,
            percent: growth_percent(current, previous),
        }
    }

    pub fn of_month(data: &Dataset<'_>, period: Period) -> Self {
        Growth::between(data.count_in(period), data.count_in(period.previous()))
    }
}

/// The four dashboard cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub today: usize,
    pub this_month: usize,
    pub growth: Growth,
}

pub fn dashboard_stats(data: &Dataset<'_>, now: DateTime<Utc>) -> DashboardStats {
    let local_now = now.with_timezone(&data.local_offset());
    let period = Period::of(&local_now);
    let growth = Growth::of_month(data, period);
    DashboardStats {
        total: data.total(),
        today: data.count_on(local_now.date_naive()),
        this_month: growth.current,
        growth,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Retention {
    /// Distinct ids in the set.
    pub unique: usize,
    /// Distinct ids with more than one recorded visit.
    pub recurring: usize,
    /// `recurring / unique` as a whole percentage, 0..=100.
    pub retention_rate: i64,
    /// Mean visit count per distinct id, one decimal.
    pub avg_frequency: f64,
    pub total_visits: u64,
}

pub fn retention<'r, I>(records: I) -> Retention
where
    I: IntoIterator<Item = &'r VisitorRecord>,
{
    let mut ids: HashMap<&str, bool> = HashMap::new();
    let mut total_visits = 0u64;
    for record in records {
        total_visits += u64::from(record.visit_count);
        let recurring = ids.entry(record.id.as_str()).or_insert(false);
        *recurring |= record.is_recurring();
    }

    let unique = ids.len();
    let recurring = ids.values().filter(|r| **r).count();
    if unique == 0 {
        return Retention {
            unique,
            recurring,
            retention_rate: 0,
            avg_frequency: 0.0,
            total_visits,
        };
    }
    Retention {
        unique,
        recurring,
        retention_rate: round_half_up(recurring as f64 / unique as f64 * 100.0),
        avg_frequency: round1(total_visits as f64 / unique as f64),
        total_visits,
    }
}

/// Metric cards of the monthly report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyMetrics {
    pub period: Period,
    pub total: usize,
    pub in_period: usize,
    /// Ids whose first appearance in the record set falls in the period.
    pub new_visitors: usize,
    pub growth: Growth,
    pub retention: Retention,
}

pub fn monthly_metrics(data: &Dataset<'_>, period: Period) -> MonthlyMetrics {
    let mut seen = HashSet::new();
    let mut new_visitors = 0;
    for (ts, record) in data.chronological() {
        if seen.insert(record.id.as_str()) && period.contains(&ts) {
            new_visitors += 1;
        }
    }

    let growth = Growth::of_month(data, period);
    MonthlyMetrics {
        period,
        total: data.total(),
        in_period: growth.current,
        new_visitors,
        growth,
        retention: retention(data.in_period(period)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeUnit {
    Percent,
    Points,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricChange {
    pub key: &'static str,
    pub label: &'static str,
    pub current: f64,
    pub previous: f64,
    pub change: f64,
    pub unit: ChangeUnit,
}

impl MetricChange {
    fn percent(key: &'static str, label: &'static str, current: f64, previous: f64) -> Self {
        MetricChange {
            key,
            label,
            current,
            previous,
            change: change_percent(current, previous),
            unit: ChangeUnit::Percent,
        }
    }

    fn points(key: &'static str, label: &'static str, current: f64, previous: f64) -> Self {
        MetricChange {
            key,
            label,
            current,
            previous,
            change: round1(current - previous),
            unit: ChangeUnit::Points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthComparison {
    pub current: Period,
    pub previous: Period,
    pub changes: Vec<MetricChange>,
}

/// The selected month against the month before, metric by metric.
pub fn month_comparison(data: &Dataset<'_>, period: Period) -> MonthComparison {
    let previous = period.previous();
    let cur_total = data.count_in(period);
    let prev_total = data.count_in(previous);
    let cur = retention(data.in_period(period));
    let prev = retention(data.in_period(previous));

    let changes = vec![
        MetricChange::percent(
            "total",
            "Total de visitas",
            cur_total as f64,
            prev_total as f64,
        ),
        MetricChange::percent(
            "unique",
            "Visitantes únicos",
            cur.unique as f64,
            prev.unique as f64,
        ),
        MetricChange::percent(
            "recurring",
            "Visitantes recorrentes",
            cur.recurring as f64,
            prev.recurring as f64,
        ),
        MetricChange::points(
            "retention",
            "Taxa de retenção",
            cur.retention_rate as f64,
            prev.retention_rate as f64,
        ),
        MetricChange::percent(
            "frequency",
            "Frequência média",
            cur.avg_frequency,
            prev.avg_frequency,
        ),
    ];

    MonthComparison {
        current: period,
        previous,
        changes,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HalfYearComparison {
    pub year: i32,
    pub current: usize,
    pub previous: usize,
    pub difference: i64,
    pub growth_percent: f64,
}

/// January to June of `year` against the same months of the year before.
pub fn half_year_comparison(data: &Dataset<'_>, year: i32) -> HalfYearComparison {
    let count = |y: i32| {
        data.chronological()
            .filter(|(ts, _)| ts.year() == y && ts.month0() < 6)
            .count()
    };
    let current = count(year);
    let previous = count(year - 1);
    HalfYearComparison {
        year,
        current,
        previous,
        difference: current as i64 - previous as i64,
        growth_percent: change_percent(current as f64, previous as f64),
    }
}
