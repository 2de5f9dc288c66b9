//! Date and category bucketing over a [`Dataset`].

use crate::dataset::Dataset;
use crate::metrics::{growth_percent, round1};
use crate::period::{MONTH_ABBREVIATIONS, Period, WEEKS_PER_MONTH, week_index};
use crate::visitor::{AgeBracket, VisitorRecord};
use chrono::Datelike;
use serde::Serialize;
use std::collections::HashSet;

/// Visits on one calendar day of a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayBucket {
    /// 1-based day of month
    pub day: u32,
    pub visitors: usize,
    pub new_visitors: usize,
}

/// One bucket per calendar day of `period`.
///
/// `new_visitors` counts an id only at its first appearance in the whole
/// record set, scanned chronologically once. A record id first seen in an
/// earlier month is never new again, even when it shows up in `period`.
pub fn daily_buckets(data: &Dataset<'_>, period: Period) -> Vec<DayBucket> {
    let mut buckets: Vec<DayBucket> = (1..=period.days_in_month())
        .map(|day| DayBucket {
            day,
            visitors: 0,
            new_visitors: 0,
        })
        .collect();

    let mut seen: HashSet<&str> = HashSet::new();
    for (ts, record) in data.chronological() {
        let first = seen.insert(record.id.as_str());
        if !period.contains(&ts) {
            continue;
        }
        if let Some(bucket) = buckets.get_mut(ts.day() as usize - 1) {
            bucket.visitors += 1;
            if first {
                bucket.new_visitors += 1;
            }
        }
    }
    buckets
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeSlice {
    pub bracket: AgeBracket,
    pub label: &'static str,
    pub count: usize,
}

/// Counts per canonical bracket, in taxonomy order. Records with a missing
/// or unrecognised bracket are left out.
pub fn age_distribution<'r, I>(records: I) -> Vec<AgeSlice>
where
    I: IntoIterator<Item = &'r VisitorRecord>,
{
    let mut counts = [0usize; AgeBracket::ALL.len()];
    for record in records {
        if let Some(bracket) = record.age_bracket() {
            if let Some(idx) = AgeBracket::ALL.iter().position(|b| *b == bracket) {
                counts[idx] += 1;
            }
        }
    }
    AgeBracket::ALL
        .into_iter()
        .zip(counts)
        .map(|(bracket, count)| AgeSlice {
            bracket,
            label: bracket.label(),
            count,
        })
        .collect()
}

/// Per-week visit counts of a month.
pub fn weekly_counts(data: &Dataset<'_>, period: Period) -> [usize; WEEKS_PER_MONTH] {
    let mut weeks = [0usize; WEEKS_PER_MONTH];
    for (ts, _) in data.dated_in(period) {
        weeks[week_index(ts.day())] += 1;
    }
    weeks
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekComparison {
    /// 1-based week number
    pub week: usize,
    pub label: String,
    pub current: usize,
    pub previous: usize,
}

/// Weeks of `period` side by side with the same weeks of the month before.
pub fn weekly_comparison(data: &Dataset<'_>, period: Period) -> Vec<WeekComparison> {
    let current = weekly_counts(data, period);
    let previous = weekly_counts(data, period.previous());
    (0..WEEKS_PER_MONTH)
        .map(|i| WeekComparison {
            week: i + 1,
            label: format!("Sem {}", i + 1),
            current: current[i],
            previous: previous[i],
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    /// Zero-based month
    pub month: u32,
    pub label: &'static str,
    pub visitors: usize,
}

/// Twelve buckets for `year`, regardless of the selected month.
pub fn monthly_trend(data: &Dataset<'_>, year: i32) -> Vec<MonthCount> {
    let mut counts = [0usize; 12];
    for (ts, _) in data.chronological() {
        if ts.year() == year {
            counts[ts.month0() as usize] += 1;
        }
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(month, visitors)| MonthCount {
            month: month as u32,
            label: MONTH_ABBREVIATIONS[month],
            visitors,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trend {
    Growing,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Performance {
    /// First day with the most visits; `None` when the month has none.
    pub peak: Option<DayBucket>,
    /// First day with the fewest visits among days that had any.
    pub trough: Option<DayBucket>,
    /// Mean over every day of the month, zero-visit days included.
    pub average: f64,
    pub trend: Trend,
    pub trend_percent: i64,
}

pub fn performance(daily: &[DayBucket], weekly: &[WeekComparison]) -> Performance {
    let mut peak: Option<DayBucket> = None;
    let mut trough: Option<DayBucket> = None;
    for bucket in daily.iter().filter(|b| b.visitors > 0) {
        if peak.is_none_or(|p| bucket.visitors > p.visitors) {
            peak = Some(*bucket);
        }
        if trough.is_none_or(|t| bucket.visitors < t.visitors) {
            trough = Some(*bucket);
        }
    }

    let total: usize = daily.iter().map(|b| b.visitors).sum();
    let average = if daily.is_empty() {
        0.0
    } else {
        round1(total as f64 / daily.len() as f64)
    };

    let current: usize = weekly.iter().map(|w| w.current).sum();
    let previous: usize = weekly.iter().map(|w| w.previous).sum();
    let growth = growth_percent(current, previous);
    let trend = if growth > 0 {
        Trend::Growing
    } else {
        Trend::Declining
    };

    Performance {
        peak,
        trough,
        average,
        trend,
        trend_percent: growth.abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{record, utc};

    fn march() -> Period {
        Period::new(2024, 2).unwrap()
    }

    #[test]
    fn daily_buckets_cover_every_day() {
        let records = vec![
            record("a", "2024-03-01T10:00:00Z", 1),
            record("b", "2024-03-01T11:00:00Z", 1),
            record("c", "2024-03-31T23:00:00Z", 1),
        ];
        let data = Dataset::new(&records, utc());
        let daily = daily_buckets(&data, march());
        assert_eq!(daily.len(), 31);
        assert_eq!(daily[0].visitors, 2);
        assert_eq!(daily[30].visitors, 1);
        assert_eq!(daily.iter().map(|b| b.visitors).sum::<usize>(), 3);
    }

    #[test]
    fn new_visitors_are_global_first_occurrence() {
        // "a" first appears in February; its March row is not new.
        let records = vec![
            record("a", "2024-03-05T10:00:00Z", 2),
            record("a", "2024-02-10T10:00:00Z", 1),
            record("b", "2024-03-05T12:00:00Z", 1),
        ];
        let data = Dataset::new(&records, utc());
        let daily = daily_buckets(&data, march());
        assert_eq!(daily[4].visitors, 2);
        assert_eq!(daily[4].new_visitors, 1);
    }

    #[test]
    fn unknown_age_labels_are_dropped() {
        let mut records = vec![
            record("a", "2024-03-01T10:00:00Z", 1),
            record("b", "2024-03-01T10:00:00Z", 1),
            record("c", "2024-03-01T10:00:00Z", 1),
        ];
        records[0].metadata.faixa_etaria = Some("Jovem".into());
        records[1].metadata.faixa_etaria = Some("Unknown".into());
        records[2].metadata.faixa_etaria = Some("18-25".into());

        let slices = age_distribution(&records);
        assert_eq!(slices.len(), 5);
        assert_eq!(slices.iter().map(|s| s.count).sum::<usize>(), 1);
        let young = slices.iter().find(|s| s.bracket == AgeBracket::Young).unwrap();
        assert_eq!(young.count, 1);
    }

    #[test]
    fn weekly_comparison_folds_tail_days() {
        let records = vec![
            record("a", "2024-03-29T10:00:00Z", 1),
            record("b", "2024-03-31T10:00:00Z", 1),
            record("c", "2024-03-22T10:00:00Z", 1),
            record("d", "2024-02-03T10:00:00Z", 1),
        ];
        let data = Dataset::new(&records, utc());
        let weeks = weekly_comparison(&data, march());
        assert_eq!(weeks[3].current, 3);
        assert_eq!(weeks[0].previous, 1);
        assert_eq!(weeks[0].label, "Sem 1");
    }

    #[test]
    fn monthly_trend_ignores_other_years() {
        let records = vec![
            record("a", "2024-01-10T10:00:00Z", 1),
            record("b", "2024-12-10T10:00:00Z", 1),
            record("c", "2023-12-10T10:00:00Z", 1),
        ];
        let data = Dataset::new(&records, utc());
        let trend = monthly_trend(&data, 2024);
        assert_eq!(trend.len(), 12);
        assert_eq!(trend[0].visitors, 1);
        assert_eq!(trend[11].visitors, 1);
        assert_eq!(trend[11].label, "Dez");
        assert_eq!(trend.iter().map(|m| m.visitors).sum::<usize>(), 2);
    }

    #[test]
    fn performance_skips_empty_days_for_trough() {
        let records = vec![
            record("a", "2024-03-02T10:00:00Z", 1),
            record("b", "2024-03-02T11:00:00Z", 1),
            record("c", "2024-03-02T12:00:00Z", 1),
            record("d", "2024-03-10T10:00:00Z", 1),
            record("e", "2024-03-11T10:00:00Z", 1),
        ];
        let data = Dataset::new(&records, utc());
        let daily = daily_buckets(&data, march());
        let weekly = weekly_comparison(&data, march());
        let perf = performance(&daily, &weekly);

        assert_eq!(perf.peak.map(|b| b.day), Some(2));
        assert_eq!(perf.trough.map(|b| b.day), Some(10));
        assert_eq!(perf.average, 0.2);
        assert_eq!(perf.trend, Trend::Growing);
        assert_eq!(perf.trend_percent, 100);
    }

    #[test]
    fn performance_of_an_empty_month() {
        let data = Dataset::new(&[], utc());
        let daily = daily_buckets(&data, march());
        let perf = performance(&daily, &weekly_comparison(&data, march()));
        assert!(perf.peak.is_none());
        assert!(perf.trough.is_none());
        assert_eq!(perf.average, 0.0);
        assert_eq!(perf.trend, Trend::Declining);
        assert_eq!(perf.trend_percent, 0);
    }

    #[test]
    fn flat_month_is_not_growing() {
        let records = vec![
            record("a", "2024-02-05T10:00:00Z", 1),
            record("b", "2024-02-20T10:00:00Z", 1),
            record("c", "2024-03-06T10:00:00Z", 1),
            record("d", "2024-03-21T10:00:00Z", 1),
        ];
        let data = Dataset::new(&records, utc());
        let daily = daily_buckets(&data, march());
        let perf = performance(&daily, &weekly_comparison(&data, march()));
        assert_eq!(perf.trend, Trend::Declining);
        assert_eq!(perf.trend_percent, 0);
    }
}
