use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const MONTH_NAMES: [&str; 12] = [
    "Janeiro",
    "Fevereiro",
    "Março",
    "Abril",
    "Maio",
    "Junho",
    "Julho",
    "Agosto",
    "Setembro",
    "Outubro",
    "Novembro",
    "Dezembro",
];

pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Fev", "Mar", "Abr", "Mai", "Jun", "Jul", "Ago", "Set", "Out", "Nov", "Dez",
];

/// Number of fixed-size weeks a month is split into. Days 29-31 fold into
/// the last one.
pub const WEEKS_PER_MONTH: usize = 4;

/// A calendar month used to scope aggregation.
///
/// `month` is zero-based (`0` = January) to match the period picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (month < 12).then_some(Period { year, month })
    }

    pub fn of<D: Datelike>(date: &D) -> Self {
        Period {
            year: date.year(),
            month: date.month0(),
        }
    }

    /// The month before; January wraps to December of the previous year.
    pub fn previous(self) -> Self {
        if self.month == 0 {
            Period {
                year: self.year - 1,
                month: 11,
            }
        } else {
            Period {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
    }

    pub fn days_in_month(self) -> u32 {
        let next = if self.month == 11 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 2, 1)
        };
        match (self.first_day(), next) {
            (Some(first), Some(next)) => (next - first).num_days() as u32,
            _ => 0,
        }
    }

    pub fn contains<D: Datelike>(self, date: &D) -> bool {
        date.year() == self.year && date.month0() == self.month
    }

    pub fn name(self) -> &'static str {
        MONTH_NAMES[self.month as usize % 12]
    }

    /// "Março 2024"
    pub fn label(self) -> String {
        format!("{} {}", self.name(), self.year)
    }
}

/// Zero-based week index of a 1-based day of month.
pub fn week_index(day: u32) -> usize {
    ((day.max(1) - 1) / 7).min(WEEKS_PER_MONTH as u32 - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_wraps_january() {
        let jan = Period::new(2024, 0).unwrap();
        assert_eq!(jan.previous(), Period::new(2023, 11).unwrap());
        let mar = Period::new(2024, 2).unwrap();
        assert_eq!(mar.previous(), Period::new(2024, 1).unwrap());
    }

    #[test]
    fn rejects_out_of_range_month() {
        assert!(Period::new(2024, 12).is_none());
    }

    #[test]
    fn days_in_month_handles_leap_years() {
        assert_eq!(Period::new(2024, 1).unwrap().days_in_month(), 29);
        assert_eq!(Period::new(2023, 1).unwrap().days_in_month(), 28);
        assert_eq!(Period::new(2024, 11).unwrap().days_in_month(), 31);
        assert_eq!(Period::new(2024, 3).unwrap().days_in_month(), 30);
    }

    #[test]
    fn late_days_fold_into_last_week() {
        assert_eq!(week_index(1), 0);
        assert_eq!(week_index(7), 0);
        assert_eq!(week_index(8), 1);
        assert_eq!(week_index(21), 2);
        assert_eq!(week_index(22), 3);
        assert_eq!(week_index(28), 3);
        assert_eq!(week_index(29), 3);
        assert_eq!(week_index(31), 3);
    }

    #[test]
    fn label_uses_portuguese_month_names() {
        assert_eq!(Period::new(2024, 2).unwrap().label(), "Março 2024");
    }
}
