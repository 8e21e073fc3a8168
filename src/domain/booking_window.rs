use std::collections::BTreeMap;

use chrono::{Months, NaiveDate};

use super::slot::Slot;

/// Rolling range of dates open for booking
///
/// Normally `horizon_months` ahead of today. When every single day of that
/// range is fully booked, the range grows to `extended_horizon_months`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookingWindow {
    pub horizon_months: u32,
    pub extended_horizon_months: u32,
}

impl Default for BookingWindow {
    fn default() -> Self {
        Self {
            horizon_months: 3,
            extended_horizon_months: 6,
        }
    }
}

/// Outcome of the first, storage-free half of the check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowDecision {
    /// Inside the normal horizon
    Accepted,
    /// Beyond the normal horizon. The caller must look up per-day occupancy
    /// between `from` and `until` (inclusive) and call
    /// [`BookingWindow::resolve_saturated`].
    NeedsOccupancy { from: NaiveDate, until: NaiveDate },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WindowViolation {
    #[error("cannot book a date in the past")]
    PastDate,
    #[error("choose a date within {months} months")]
    BeyondHorizon { months: u32 },
    #[error("the near-term calendar is full, use the {months}-month window")]
    BeyondExtendedHorizon { months: u32 },
}

impl BookingWindow {
    pub fn horizon_end(&self, today: NaiveDate) -> NaiveDate {
        add_months(today, self.horizon_months)
    }

    pub fn extended_horizon_end(&self, today: NaiveDate) -> NaiveDate {
        add_months(today, self.extended_horizon_months)
    }

    pub fn check(
        &self,
        requested: NaiveDate,
        today: NaiveDate,
    ) -> Result<WindowDecision, WindowViolation> {
        if requested < today {
            return Err(WindowViolation::PastDate);
        }

        let until = self.horizon_end(today);
        if requested <= until {
            return Ok(WindowDecision::Accepted);
        }

        Ok(WindowDecision::NeedsOccupancy { from: today, until })
    }

    /// Second half of the check, for dates beyond the normal horizon
    ///
    /// `active_per_day` maps dates to their number of active appointments;
    /// missing dates count as empty. A day with at least as many active
    /// appointments as there are slots counts as full.
    pub fn resolve_saturated(
        &self,
        requested: NaiveDate,
        today: NaiveDate,
        active_per_day: &BTreeMap<NaiveDate, usize>,
    ) -> Result<(), WindowViolation> {
        let until = self.horizon_end(today);
        let total_days = today.iter_days().take_while(|day| *day <= until).count();
        let full_days = today
            .iter_days()
            .take_while(|day| *day <= until)
            .filter(|day| active_per_day.get(day).copied().unwrap_or(0) >= Slot::ALL.len())
            .count();

        if full_days != total_days {
            return Err(WindowViolation::BeyondHorizon {
                months: self.horizon_months,
            });
        }

        if requested <= self.extended_horizon_end(today) {
            tracing::info!(%requested, "near-term horizon saturated, extended window applies");
            Ok(())
        } else {
            Err(WindowViolation::BeyondExtendedHorizon {
                months: self.extended_horizon_months,
            })
        }
    }
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(NaiveDate::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use speculoos::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[fixture]
    fn today() -> NaiveDate {
        date(2025, 3, 10)
    }

    fn saturated(today: NaiveDate) -> BTreeMap<NaiveDate, usize> {
        let until = BookingWindow::default().horizon_end(today);
        today
            .iter_days()
            .take_while(|day| *day <= until)
            .map(|day| (day, Slot::ALL.len()))
            .collect()
    }

    #[rstest]
    #[case(date(2025, 3, 10), Ok(WindowDecision::Accepted))]
    #[case(date(2025, 6, 10), Ok(WindowDecision::Accepted))]
    #[case(date(2025, 3, 9), Err(WindowViolation::PastDate))]
    #[case(
        date(2025, 6, 11),
        Ok(WindowDecision::NeedsOccupancy { from: date(2025, 3, 10), until: date(2025, 6, 10) })
    )]
    fn test_check(
        today: NaiveDate,
        #[case] requested: NaiveDate,
        #[case] expected: Result<WindowDecision, WindowViolation>,
    ) {
        let res = BookingWindow::default().check(requested, today);

        assert_that!(res).is_equal_to(expected);
    }

    #[rstest]
    fn test_not_saturated_rejects_even_inside_extended(today: NaiveDate) {
        let mut counts = saturated(today);
        // One day in the window still has a free slot
        counts.insert(date(2025, 4, 2), 3);

        let res = BookingWindow::default().resolve_saturated(date(2025, 9, 26), today, &counts);

        assert_that!(res).is_equal_to(Err(WindowViolation::BeyondHorizon { months: 3 }));
    }

    #[rstest]
    fn test_empty_calendar_rejects(today: NaiveDate) {
        let res =
            BookingWindow::default().resolve_saturated(date(2025, 7, 1), today, &BTreeMap::new());

        assert_that!(res).is_equal_to(Err(WindowViolation::BeyondHorizon { months: 3 }));
    }

    #[rstest]
    #[case(date(2025, 6, 11))]
    #[case(date(2025, 9, 10))]
    fn test_saturated_accepts_inside_extended(today: NaiveDate, #[case] requested: NaiveDate) {
        let res = BookingWindow::default().resolve_saturated(requested, today, &saturated(today));

        assert_that!(res).is_ok();
    }

    #[rstest]
    fn test_saturated_rejects_beyond_extended(today: NaiveDate) {
        let res =
            BookingWindow::default().resolve_saturated(date(2025, 9, 11), today, &saturated(today));

        assert_that!(res).is_equal_to(Err(WindowViolation::BeyondExtendedHorizon { months: 6 }));
    }

    #[rstest]
    fn test_overbooked_days_count_as_full(today: NaiveDate) {
        let mut counts = saturated(today);
        counts.insert(date(2025, 5, 5), 6);

        let res = BookingWindow::default().resolve_saturated(date(2025, 8, 1), today, &counts);

        assert_that!(res).is_ok();
    }
}
