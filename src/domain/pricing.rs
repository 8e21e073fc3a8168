use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::calendar::{classify, DayKind};

/// Cleaning service tiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Basic,
    Deluxe,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Basic => "basic",
            ServiceType::Deluxe => "deluxe",
        }
    }
}

/// Base price, in points, of each service tier on a plain weekday
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceList {
    pub basic: u32,
    pub deluxe: u32,
}

impl Default for PriceList {
    fn default() -> Self {
        Self {
            basic: 1000,
            deluxe: 1500,
        }
    }
}

/// Itemised price for display
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PriceBreakdown {
    pub service_type: ServiceType,
    pub day_kind: DayKind,
    pub base_price: u32,
    pub surcharge: u32,
    /// `None` on weekdays
    pub surcharge_label: Option<&'static str>,
    pub total: u32,
}

impl PriceList {
    pub fn base_price(&self, service_type: ServiceType) -> u32 {
        match service_type {
            ServiceType::Basic => self.basic,
            ServiceType::Deluxe => self.deluxe,
        }
    }

    pub fn price(&self, service_type: ServiceType, date: NaiveDate) -> u32 {
        self.breakdown(service_type, date).total
    }

    pub fn breakdown(&self, service_type: ServiceType, date: NaiveDate) -> PriceBreakdown {
        let day_kind = classify(date);
        let base_price = self.base_price(service_type);
        let total = apply_multiplier(base_price, day_kind);

        PriceBreakdown {
            service_type,
            day_kind,
            base_price,
            surcharge: total - base_price,
            surcharge_label: surcharge_label(day_kind),
            total,
        }
    }
}

/// Weekend x1.5, holiday x2.0, rounded to the nearest point (halves up)
fn apply_multiplier(base: u32, day_kind: DayKind) -> u32 {
    match day_kind {
        DayKind::Weekday => base,
        DayKind::Weekend => u32::try_from((u64::from(base) * 3 + 1) / 2).unwrap_or(u32::MAX),
        DayKind::Holiday => base.saturating_mul(2),
    }
}

fn surcharge_label(day_kind: DayKind) -> Option<&'static str> {
    match day_kind {
        DayKind::Weekday => None,
        DayKind::Weekend => Some("Weekend surcharge (+50%)"),
        DayKind::Holiday => Some("Holiday surcharge (+100%)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use speculoos::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case(ServiceType::Basic, date(2025, 3, 12), 1000)]
    #[case(ServiceType::Deluxe, date(2025, 3, 12), 1500)]
    #[case(ServiceType::Basic, date(2025, 3, 15), 1500)]
    #[case(ServiceType::Deluxe, date(2025, 3, 15), 2250)]
    #[case(ServiceType::Basic, date(2025, 3, 25), 2000)]
    #[case(ServiceType::Deluxe, date(2026, 8, 15), 3000)]
    fn test_price(#[case] service: ServiceType, #[case] day: NaiveDate, #[case] expected: u32) {
        let prices = PriceList::default();

        assert_that!(prices.price(service, day)).is_equal_to(expected);
    }

    /// Weekend and holiday prices relate to the weekday price by their multiplier
    #[rstest]
    fn test_multipliers(
        #[values(ServiceType::Basic, ServiceType::Deluxe)] service: ServiceType,
        #[values(1, 999, 1001, 1500)] base: u32,
    ) {
        let prices = PriceList {
            basic: base,
            deluxe: base + 1,
        };
        let weekday = prices.price(service, date(2025, 3, 12));
        let weekend = prices.price(service, date(2025, 3, 15));
        let holiday = prices.price(service, date(2025, 3, 25));

        assert_that!(weekend).is_equal_to((f64::from(weekday) * 1.5).round() as u32);
        assert_that!(holiday).is_equal_to(weekday * 2);
    }

    #[test]
    fn test_breakdown() {
        let breakdown = PriceList::default().breakdown(ServiceType::Basic, date(2025, 3, 15));

        assert_that!(breakdown).is_equal_to(PriceBreakdown {
            service_type: ServiceType::Basic,
            day_kind: DayKind::Weekend,
            base_price: 1000,
            surcharge: 500,
            surcharge_label: Some("Weekend surcharge (+50%)"),
            total: 1500,
        });
    }

    #[test]
    fn test_breakdown_weekday_has_no_surcharge() {
        let breakdown = PriceList::default().breakdown(ServiceType::Deluxe, date(2025, 3, 12));

        assert_that!(breakdown.surcharge).is_equal_to(0);
        assert_that!(breakdown.surcharge_label).is_none();
    }
}
