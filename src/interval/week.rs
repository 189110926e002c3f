use std::fmt;

use jiff::{civil::Date, ToSpan};
use serde::{Deserialize, Serialize};

/// An inclusive range of calendar days, at most one week long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: Date,
    pub end: Date,
}

impl DateWindow {
    /// Number of days in the window, both ends included.
    pub fn days(&self) -> usize {
        self.start
            .series(1.day())
            .take_while(|day| *day <= self.end)
            .count()
    }

    /// The date segment of a SW-PML url, e.g. `2017/01/01/2017/01/07`.
    pub fn url_path(&self) -> String {
        format!(
            "{}/{}",
            self.start.strftime("%Y/%m/%d"),
            self.end.strftime("%Y/%m/%d")
        )
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.start, self.end)
    }
}

/// Walks a calendar year in windows of up to 7 days.  The first window
/// starts on Jan 1, each window ends 6 days after its start (clamped
/// to Dec 31), and the next one starts the following day.
#[derive(Debug, Clone)]
pub struct WeekWindows {
    next_start: Option<Date>,
    year_end: Date,
}

impl Iterator for WeekWindows {
    type Item = DateWindow;

    fn next(&mut self) -> Option<DateWindow> {
        let start = self.next_start?;
        if start > self.year_end {
            return None;
        }
        let end = match start.checked_add(6.days()) {
            Ok(day) => day.min(self.year_end),
            Err(_) => self.year_end,
        };
        self.next_start = end.tomorrow().ok();
        Some(DateWindow { start, end })
    }
}

/// Week windows tiling the whole `year`.
pub fn week_windows(year: i16) -> Result<WeekWindows, jiff::Error> {
    let start = Date::new(year, 1, 1)?;
    Ok(WeekWindows {
        next_start: Some(start),
        year_end: start.last_of_year(),
    })
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;
    use std::error::Error;

    use super::*;

    #[test]
    fn tiles_a_regular_year() -> Result<(), Box<dyn Error>> {
        let windows: Vec<DateWindow> = week_windows(2021)?.collect();
        assert_eq!(windows.len(), 53);
        assert_eq!(
            windows[0],
            DateWindow {
                start: date(2021, 1, 1),
                end: date(2021, 1, 7)
            }
        );
        assert_eq!(
            windows[1],
            DateWindow {
                start: date(2021, 1, 8),
                end: date(2021, 1, 14)
            }
        );
        assert_eq!(
            windows[51],
            DateWindow {
                start: date(2021, 12, 24),
                end: date(2021, 12, 30)
            }
        );
        assert_eq!(
            windows[52],
            DateWindow {
                start: date(2021, 12, 31),
                end: date(2021, 12, 31)
            }
        );
        Ok(())
    }

    #[test]
    fn leap_year_ends_with_two_days() -> Result<(), Box<dyn Error>> {
        let windows: Vec<DateWindow> = week_windows(2020)?.collect();
        assert_eq!(windows.len(), 53);
        let last = windows.last().unwrap();
        assert_eq!(last.start, date(2020, 12, 30));
        assert_eq!(last.end, date(2020, 12, 31));
        assert_eq!(last.days(), 2);
        Ok(())
    }

    #[test]
    fn windows_are_contiguous() -> Result<(), Box<dyn Error>> {
        for year in [2017, 2020, 2024] {
            let windows: Vec<DateWindow> = week_windows(year)?.collect();
            assert_eq!(windows.first().unwrap().start, date(year, 1, 1));
            assert_eq!(windows.last().unwrap().end, date(year, 12, 31));
            for w in &windows {
                assert!(w.start <= w.end);
                assert!(w.days() <= 7);
                assert_eq!(w.start.year(), year);
                assert_eq!(w.end.year(), year);
            }
            for pair in windows.windows(2) {
                assert_eq!(pair[0].end.tomorrow()?, pair[1].start);
            }
            let total: usize = windows.iter().map(|w| w.days()).sum();
            assert_eq!(total, date(year, 1, 1).days_in_year() as usize);
        }
        Ok(())
    }

    #[test]
    fn url_path_is_zero_padded() {
        let window = DateWindow {
            start: date(2017, 3, 5),
            end: date(2017, 3, 11),
        };
        assert_eq!(window.url_path(), "2017/03/05/2017/03/11");
        assert_eq!(window.to_string(), "2017-03-05/2017-03-11");
        assert_eq!(window.days(), 7);
    }
}
