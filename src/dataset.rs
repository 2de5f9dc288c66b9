use crate::period::Period;
use crate::visitor::VisitorRecord;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime};

/// A record snapshot with every `created_at` resolved once to the local
/// calendar.
///
/// Records whose timestamp cannot be parsed stay in [`Dataset::records`]
/// (so they are counted in totals and listed) but are left out of every
/// date-bucketed aggregation.
#[derive(Debug, Clone)]
pub struct Dataset<'a> {
    records: &'a [VisitorRecord],
    dated: Vec<(NaiveDateTime, &'a VisitorRecord)>,
    local: FixedOffset,
}

impl<'a> Dataset<'a> {
    pub fn new(records: &'a [VisitorRecord], local: FixedOffset) -> Self {
        let mut dated: Vec<_> = records
            .iter()
            .filter_map(|record| {
                record
                    .created_at_in(local)
                    .map(|ts| (ts.with_timezone(&local).naive_local(), record))
            })
            .collect();
        // Stable, so records sharing a timestamp keep store order.
        dated.sort_by_key(|(ts, _)| *ts);

        Dataset {
            records,
            dated,
            local,
        }
    }

    pub fn records(&self) -> &'a [VisitorRecord] {
        self.records
    }

    pub fn local_offset(&self) -> FixedOffset {
        self.local
    }

    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// Records whose timestamp could not be placed on the calendar.
    pub fn undated(&self) -> usize {
        self.records.len() - self.dated.len()
    }

    /// Dated records in chronological order.
    pub fn chronological(&self) -> impl Iterator<Item = (NaiveDateTime, &'a VisitorRecord)> + '_ {
        self.dated.iter().copied()
    }

    pub fn dated_in(
        &self,
        period: Period,
    ) -> impl Iterator<Item = (NaiveDateTime, &'a VisitorRecord)> + '_ {
        self.chronological()
            .filter(move |(ts, _)| period.contains(ts))
    }

    pub fn in_period(&self, period: Period) -> impl Iterator<Item = &'a VisitorRecord> + '_ {
        self.dated_in(period).map(|(_, record)| record)
    }

    pub fn count_in(&self, period: Period) -> usize {
        self.dated_in(period).count()
    }

    pub fn count_on(&self, date: NaiveDate) -> usize {
        self.chronological()
            .filter(|(ts, _)| ts.date() == date)
            .count()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{record, utc};
    use super::*;

    #[test]
    fn malformed_timestamps_are_counted_but_not_dated() {
        let records = vec![
            record("a", "2024-03-01T10:00:00Z", 1),
            record("b", "garbage", 1),
            record("c", "", 1),
        ];
        let data = Dataset::new(&records, utc());
        assert_eq!(data.total(), 3);
        assert_eq!(data.undated(), 2);
        assert_eq!(data.count_in(Period::new(2024, 2).unwrap()), 1);
    }

    #[test]
    fn local_offset_moves_records_across_month_boundaries() {
        // 01:00 UTC on April 1st is still March 31st in Brasília.
        let records = vec![record("a", "2024-04-01T01:00:00Z", 1)];
        let brasilia = FixedOffset::west_opt(3 * 3600).unwrap();

        let local = Dataset::new(&records, brasilia);
        assert_eq!(local.count_in(Period::new(2024, 2).unwrap()), 1);
        assert_eq!(local.count_in(Period::new(2024, 3).unwrap()), 0);

        let utc_view = Dataset::new(&records, utc());
        assert_eq!(utc_view.count_in(Period::new(2024, 3).unwrap()), 1);
    }

    #[test]
    fn chronological_order_ignores_store_order() {
        let records = vec![
            record("late", "2024-03-10T10:00:00Z", 1),
            record("early", "2024-03-01T10:00:00Z", 1),
        ];
        let data = Dataset::new(&records, utc());
        let ids: Vec<_> = data.chronological().map(|(_, r)| r.id.as_str()).collect();
        assert_eq!(ids, ["early", "late"]);
    }
}
