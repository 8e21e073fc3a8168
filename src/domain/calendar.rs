use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Classification of a calendar day for pricing purposes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayKind {
    Weekday,
    Weekend,
    Holiday,
}

impl DayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayKind::Weekday => "weekday",
            DayKind::Weekend => "weekend",
            DayKind::Holiday => "holiday",
        }
    }
}

/// Public holidays, as (year, month, day)
///
/// Years without an entry simply never match.
const HOLIDAYS: &[(i32, u32, u32)] = &[
    // 2025
    (2025, 1, 1),
    (2025, 1, 6),
    (2025, 3, 3),
    (2025, 3, 25),
    (2025, 4, 18),
    (2025, 4, 21),
    (2025, 5, 1),
    (2025, 6, 9),
    (2025, 8, 15),
    (2025, 10, 28),
    (2025, 12, 25),
    (2025, 12, 26),
    // 2026
    (2026, 1, 1),
    (2026, 1, 6),
    (2026, 2, 23),
    (2026, 3, 25),
    (2026, 4, 10),
    (2026, 4, 13),
    (2026, 5, 1),
    (2026, 6, 1),
    (2026, 8, 15),
    (2026, 10, 28),
    (2026, 12, 25),
    (2026, 12, 26),
    // 2027
    (2027, 1, 1),
    (2027, 1, 6),
    (2027, 3, 15),
    (2027, 3, 25),
    (2027, 4, 30),
    (2027, 5, 1),
    (2027, 5, 3),
    (2027, 6, 21),
    (2027, 8, 15),
    (2027, 10, 28),
    (2027, 12, 25),
    (2027, 12, 26),
];

pub fn is_holiday(date: NaiveDate) -> bool {
    let key = (date.year(), date.month(), date.day());
    HOLIDAYS.contains(&key)
}

/// Classify a date. Holidays win over weekends.
pub fn classify(date: NaiveDate) -> DayKind {
    if is_holiday(date) {
        return DayKind::Holiday;
    }

    match date.weekday() {
        Weekday::Sat | Weekday::Sun => DayKind::Weekend,
        _ => DayKind::Weekday,
    }
}
