use chrono::{Datelike, NaiveDate};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HolidayKind {
    SuperBowl,
    LaborDay,
    Thanksgiving,
    Christmas,
}

impl HolidayKind {
    pub const ALL: [HolidayKind; 4] = [
        HolidayKind::SuperBowl,
        HolidayKind::LaborDay,
        HolidayKind::Thanksgiving,
        HolidayKind::Christmas,
    ];

    /// Name of the transient indicator column.
    pub fn column_name(&self) -> &'static str {
        match self {
            HolidayKind::SuperBowl => "Super_Bowl",
            HolidayKind::LaborDay => "Labor_Day",
            HolidayKind::Thanksgiving => "Thanksgiving",
            HolidayKind::Christmas => "Christmas",
        }
    }

    /// Week-ending dates (2010 through 2013) flagged for this holiday.
    pub fn dates(&self) -> &'static [(i32, u32, u32); 4] {
        match self {
            HolidayKind::SuperBowl => &SUPER_BOWL_DATES,
            HolidayKind::LaborDay => &LABOR_DAY_DATES,
            HolidayKind::Thanksgiving => &THANKSGIVING_DATES,
            HolidayKind::Christmas => &CHRISTMAS_DATES,
        }
    }

    pub fn matches(&self, date: NaiveDate) -> bool {
        self.dates()
            .iter()
            .any(|&(y, m, d)| date.year() == y && date.month() == m && date.day() == d)
    }
}

pub const SUPER_BOWL_DATES: [(i32, u32, u32); 4] =
    [(2010, 2, 12), (2011, 2, 11), (2012, 2, 10), (2013, 2, 8)];
pub const LABOR_DAY_DATES: [(i32, u32, u32); 4] =
    [(2010, 9, 10), (2011, 9, 9), (2012, 9, 7), (2013, 9, 6)];
pub const THANKSGIVING_DATES: [(i32, u32, u32); 4] =
    [(2010, 11, 26), (2011, 11, 25), (2012, 11, 23), (2013, 11, 29)];
pub const CHRISTMAS_DATES: [(i32, u32, u32); 4] =
    [(2010, 12, 31), (2011, 12, 30), (2012, 12, 28), (2013, 12, 27)];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y-%m-%d %H:%M:%S"];

pub fn parse_date(row: usize, value: Option<&str>) -> Result<NaiveDate> {
    let text = value.map(str::trim).unwrap_or_default();
    DATE_FORMATS
        .iter()
        .find_map(|format| {
            NaiveDate::parse_from_str(text, format)
                .ok()
                .or_else(|| {
                    chrono::NaiveDateTime::parse_from_str(text, format)
                        .ok()
                        .map(|dt| dt.date())
                })
        })
        .ok_or_else(|| PipelineError::InvalidDate {
            row,
            value: text.to_string(),
        })
}

/// Calendar parts derived from a date: day of month, ISO week, month, year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarParts {
    pub day: i32,
    pub week: i32,
    pub month: i32,
    pub year: i32,
}

impl From<NaiveDate> for CalendarParts {
    fn from(date: NaiveDate) -> Self {
        Self {
            day: date.day() as i32,
            week: date.iso_week().week() as i32,
            month: date.month() as i32,
            year: date.year(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_holiday_matches_only_its_dates() {
        let super_bowl = NaiveDate::from_ymd_opt(2010, 2, 12).unwrap();
        assert!(HolidayKind::SuperBowl.matches(super_bowl));
        assert!(!HolidayKind::LaborDay.matches(super_bowl));

        let christmas = NaiveDate::from_ymd_opt(2013, 12, 27).unwrap();
        assert!(HolidayKind::Christmas.matches(christmas));

        let ordinary = NaiveDate::from_ymd_opt(2011, 3, 4).unwrap();
        assert!(HolidayKind::ALL.iter().all(|kind| !kind.matches(ordinary)));
    }

    #[test]
    fn calendar_uses_iso_weeks() {
        // 2010-01-01 belongs to ISO week 53 of 2009.
        let parts = CalendarParts::from(NaiveDate::from_ymd_opt(2010, 1, 1).unwrap());
        assert_eq!(parts.week, 53);
        assert_eq!(parts.year, 2010);

        let parts = CalendarParts::from(NaiveDate::from_ymd_opt(2010, 2, 12).unwrap());
        assert_eq!((parts.day, parts.week, parts.month), (12, 6, 2));
    }

    #[test]
    fn parse_date_reports_row() {
        assert_eq!(
            parse_date(0, Some("2012-11-23")).unwrap(),
            NaiveDate::from_ymd_opt(2012, 11, 23).unwrap()
        );
        assert_eq!(
            parse_date(0, Some("2012-11-23 00:00:00")).unwrap(),
            NaiveDate::from_ymd_opt(2012, 11, 23).unwrap()
        );
        let err = parse_date(4, Some("23/11/2012")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDate { row: 4, .. }));
        assert!(parse_date(1, None).is_err());
    }
}
