use chrono::{DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, TimeZone, Utc};

use crate::device::types::StatsSnapshot;

/// Summary of one run/stop cycle, as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: i64,
    pub distance: f64,
    pub steps: u32,
    pub duration: u32, // seconds
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewSession {
    pub distance: f64,
    pub steps: u32,
    pub duration: u32,
}

impl From<&StatsSnapshot> for NewSession {
    fn from(stats: &StatsSnapshot) -> Self {
        NewSession {
            distance: stats.distance,
            steps: stats.steps,
            duration: stats.elapsed_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionSummary {
    pub distance: f64,
    pub steps: u64,
    pub duration: u64,
    pub sessions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWindow {
    Today,
    ThisWeek, // starting monday
    Since(DateTime<Utc>),
    Between(DateTime<Utc>, DateTime<Utc>),
    All,
}

/// Half open range `[start, end)`; a missing bound is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    midnight_in(&Local, date)
}

fn midnight_in<Tz: TimeZone>(zone: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_hms_opt(0, 0, 0).unwrap_or_default();

    match zone.from_local_datetime(&naive) {
        LocalResult::Single(time) => time.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // midnight skipped by a DST change, the day starts at the end of the gap
        LocalResult::None => match zone.from_local_datetime(&(naive + Duration::hours(1))) {
            LocalResult::Single(time) | LocalResult::Ambiguous(time, _) => time.with_timezone(&Utc),
            LocalResult::None => Utc.from_utc_datetime(&naive),
        },
    }
}

impl ReportWindow {
    pub fn range(&self, now: DateTime<Local>) -> TimeRange {
        let today = now.date_naive();

        match *self {
            ReportWindow::Today => TimeRange {
                start: Some(local_midnight(today)),
                end: Some(local_midnight(today + Duration::days(1))),
            },
            ReportWindow::ThisWeek => {
                let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                TimeRange {
                    start: Some(local_midnight(monday)),
                    end: Some(local_midnight(monday + Duration::days(7))),
                }
            },
            ReportWindow::Since(start) => TimeRange { start: Some(start), end: None },
            ReportWindow::Between(start, end) => TimeRange { start: Some(start), end: Some(end) },
            ReportWindow::All => TimeRange { start: None, end: None },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportWindow::Today => "Today",
            ReportWindow::ThisWeek => "This week",
            ReportWindow::Since(_) => "Since",
            ReportWindow::Between(..) => "Between",
            ReportWindow::All => "All time",
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDateTime};
    use super::*;

    fn local(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn today_spans_one_local_day() {
        let now = local(2024, 3, 13, 15);
        let range = ReportWindow::Today.range(now);

        assert_eq!(range.start.unwrap().with_timezone(&Local), local(2024, 3, 13, 0));
        assert_eq!(range.end.unwrap().with_timezone(&Local), local(2024, 3, 14, 0));
        assert!(range.start.unwrap() <= now.with_timezone(&Utc));
    }

    #[test]
    fn week_starts_on_monday() {
        // 2024-03-13 is a wednesday
        let range = ReportWindow::ThisWeek.range(local(2024, 3, 13, 9));
        assert_eq!(range.start.unwrap().with_timezone(&Local), local(2024, 3, 11, 0));
        assert_eq!(range.end.unwrap().with_timezone(&Local), local(2024, 3, 18, 0));

        // a monday is the first day of its own week
        let range = ReportWindow::ThisWeek.range(local(2024, 3, 11, 9));
        assert_eq!(range.start.unwrap().with_timezone(&Local), local(2024, 3, 11, 0));
    }

    #[test]
    fn open_ended_windows() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let range = ReportWindow::Since(start).range(Local::now());
        assert_eq!(range, TimeRange { start: Some(start), end: None });

        assert_eq!(ReportWindow::All.range(Local::now()), TimeRange { start: None, end: None });
    }

    /// +03:00 until local midnight of 2024-03-10, which is skipped, then +04:00.
    #[derive(Debug, Clone, Copy)]
    struct SkippedMidnight;

    impl SkippedMidnight {
        fn switch_local() -> NaiveDateTime {
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap().and_hms_opt(0, 0, 0).unwrap()
        }

        fn before() -> FixedOffset {
            FixedOffset::east_opt(3 * 3600).unwrap()
        }

        fn after() -> FixedOffset {
            FixedOffset::east_opt(4 * 3600).unwrap()
        }
    }

    impl TimeZone for SkippedMidnight {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            SkippedMidnight
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let switch = Self::switch_local();
            if *local < switch {
                LocalResult::Single(Self::before())
            } else if *local < switch + Duration::hours(1) {
                LocalResult::None
            } else {
                LocalResult::Single(Self::after())
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc < Self::switch_local() - Duration::hours(3) {
                Self::before()
            } else {
                Self::after()
            }
        }
    }

    #[test]
    fn skipped_midnight_starts_the_day_at_the_end_of_the_gap() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();

        // 01:00 at +04:00
        assert_eq!(midnight_in(&SkippedMidnight, date), Utc.with_ymd_and_hms(2024, 3, 9, 21, 0, 0).unwrap());
        // an ordinary day
        assert_eq!(
            midnight_in(&SkippedMidnight, date + Duration::days(1)),
            Utc.with_ymd_and_hms(2024, 3, 10, 20, 0, 0).unwrap(),
        );
    }

    #[test]
    fn new_session_uses_elapsed_time_as_duration() {
        let stats = StatsSnapshot { distance: 900.0, elapsed_time: 200, speed: 16.0, state_code: 1, steps: 1000 };
        assert_eq!(NewSession::from(&stats), NewSession { distance: 900.0, steps: 1000, duration: 200 });
    }
}
