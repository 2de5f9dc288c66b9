//! View-models handed to the presentation layer.
//!
//! Everything here is a pure function of a [`Snapshot`] and the user's
//! selections. A snapshot whose fetch failed produces zeroed views that
//! carry the error message.

use crate::buckets::{
    AgeSlice, DayBucket, MonthCount, Performance, WeekComparison, age_distribution,
    daily_buckets, monthly_trend, performance, weekly_comparison,
};
use crate::dataset::Dataset;
use crate::downloader::registration_date;
use crate::filter::VisitorFilters;
use crate::geo::{ChurchLocation, MapFilter, MapView, map_view};
use crate::metrics::{
    DashboardStats, HalfYearComparison, MonthComparison, MonthlyMetrics, dashboard_stats,
    half_year_comparison, month_comparison, monthly_metrics,
};
use crate::period::Period;
use crate::store::Snapshot;
use crate::visitor::VisitorRecord;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

/// Shown wherever an optional value is missing.
pub const PLACEHOLDER: &str = "-";

/// One line of the dashboard table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitorRow {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub gender: String,
    pub age_bracket: String,
    pub neighborhood: String,
    pub city: String,
    /// "Novo" or "Retornou", from `is_new_visitor`
    pub kind: &'static str,
    pub status: String,
    pub visit_count: u32,
    pub registered_on: String,
}

impl VisitorRow {
    pub fn new(record: &VisitorRecord, local: FixedOffset) -> Self {
        let or_placeholder = |value: Option<&str>| value.unwrap_or(PLACEHOLDER).to_string();
        let registered_on = registration_date(record, local);
        VisitorRow {
            id: record.id.clone(),
            name: record.name.clone(),
            phone: or_placeholder(record.phone()),
            gender: or_placeholder(record.gender()),
            age_bracket: or_placeholder(record.age_bracket_label()),
            neighborhood: or_placeholder(record.neighborhood()),
            city: or_placeholder(record.city()),
            kind: if record.is_new_visitor { "Novo" } else { "Retornou" },
            status: record.status.label().to_string(),
            visit_count: record.visit_count,
            registered_on: if registered_on.is_empty() {
                PLACEHOLDER.to_string()
            } else {
                registered_on
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub stats: DashboardStats,
    pub visitors: Vec<VisitorRow>,
    pub total_filtered: usize,
    pub error: Option<String>,
}

/// Stats cards over the whole set plus the filtered list, newest first as
/// the store returned it.
pub fn dashboard_view(
    snapshot: &Snapshot,
    filters: &VisitorFilters,
    now: DateTime<Utc>,
    local: FixedOffset,
) -> DashboardView {
    let data = Dataset::new(&snapshot.records, local);
    let visitors: Vec<VisitorRow> = filters
        .apply(&snapshot.records)
        .into_iter()
        .map(|r| VisitorRow::new(r, local))
        .collect();
    DashboardView {
        stats: dashboard_stats(&data, now),
        total_filtered: visitors.len(),
        visitors,
        error: snapshot.error.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportCharts {
    pub daily: Vec<DayBucket>,
    pub age_groups: Vec<AgeSlice>,
    pub weekly: Vec<WeekComparison>,
    pub monthly_trend: Vec<MonthCount>,
    pub performance: Performance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportView {
    pub period: Period,
    pub period_label: String,
    pub metrics: MonthlyMetrics,
    pub charts: ReportCharts,
    pub comparison: MonthComparison,
    pub half_year: HalfYearComparison,
    pub map: MapView,
    pub error: Option<String>,
}

/// Selections of the report page.
#[derive(Debug, Clone, Copy)]
pub struct ReportRequest<'c> {
    pub period: Period,
    pub map_filter: MapFilter,
    pub church: &'c ChurchLocation,
    pub influence_radius_km: f64,
    pub local: FixedOffset,
}

pub fn report_view(snapshot: &Snapshot, request: ReportRequest<'_>) -> ReportView {
    let period = request.period;
    let data = Dataset::new(&snapshot.records, request.local);

    let daily = daily_buckets(&data, period);
    let weekly = weekly_comparison(&data, period);
    let charts = ReportCharts {
        performance: performance(&daily, &weekly),
        daily,
        age_groups: age_distribution(&snapshot.records),
        weekly,
        monthly_trend: monthly_trend(&data, period.year),
    };

    ReportView {
        period,
        period_label: period.label(),
        metrics: monthly_metrics(&data, period),
        charts,
        comparison: month_comparison(&data, period),
        half_year: half_year_comparison(&data, period.year),
        map: map_view(
            data.in_period(period),
            request.map_filter,
            request.church,
            request.influence_radius_km,
        ),
        error: snapshot.error.clone(),
    }
}
