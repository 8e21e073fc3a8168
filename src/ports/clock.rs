use chrono::{DateTime, NaiveDate, Utc};

/// Source of the current time, so that date policies can be tested
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Today in the business calendar
    fn today(&self) -> NaiveDate;
}
