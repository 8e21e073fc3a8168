//! Runtime configuration.
//!
//! Every setting has a default, so an empty environment yields a working
//! setup. Values come from `BOOKING_*` environment variables, with a `.env`
//! file honoured through `dotenv`.

use std::{str::FromStr, time::Duration};

use chrono::TimeDelta;

use crate::domain::{BookingWindow, PriceList};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingConfig {
    pub prices: PriceList,
    pub window: BookingWindow,
    /// Most active appointments a single user may hold
    pub max_active_appointments: usize,
    /// Status queries made against the payment processor per reconciliation
    pub payment_status_attempts: u32,
    /// Delay before the first retry, doubled on each further attempt
    pub payment_retry_delay: Duration,
    /// Age after which a `processing` claim on a purchase is considered abandoned
    pub purchase_claim_timeout: TimeDelta,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            prices: PriceList::default(),
            window: BookingWindow::default(),
            max_active_appointments: 3,
            payment_status_attempts: 3,
            payment_retry_delay: Duration::from_millis(200),
            purchase_claim_timeout: TimeDelta::minutes(10),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

impl BookingConfig {
    /// Load from the process environment and `.env`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Load through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &'static str, default: u64| parse_or(&lookup, key, default);

        let config = Self {
            prices: PriceList {
                basic: get("BOOKING_BASIC_PRICE", defaults.prices.basic.into())? as u32,
                deluxe: get("BOOKING_DELUXE_PRICE", defaults.prices.deluxe.into())? as u32,
            },
            window: BookingWindow {
                horizon_months: get(
                    "BOOKING_HORIZON_MONTHS",
                    defaults.window.horizon_months.into(),
                )? as u32,
                extended_horizon_months: get(
                    "BOOKING_EXTENDED_HORIZON_MONTHS",
                    defaults.window.extended_horizon_months.into(),
                )? as u32,
            },
            max_active_appointments: get(
                "BOOKING_MAX_ACTIVE_APPOINTMENTS",
                defaults.max_active_appointments as u64,
            )? as usize,
            payment_status_attempts: get(
                "BOOKING_PAYMENT_STATUS_ATTEMPTS",
                defaults.payment_status_attempts.into(),
            )? as u32,
            payment_retry_delay: Duration::from_millis(get(
                "BOOKING_PAYMENT_RETRY_DELAY_MS",
                defaults.payment_retry_delay.as_millis() as u64,
            )?),
            purchase_claim_timeout: TimeDelta::seconds(get(
                "BOOKING_PURCHASE_CLAIM_TIMEOUT_SECS",
                defaults.purchase_claim_timeout.num_seconds() as u64,
            )? as i64),
        };
        config.validate()?;

        tracing::debug!(?config, "booking configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.extended_horizon_months < self.window.horizon_months {
            return Err(ConfigError::Invalid(
                "extended horizon must not be shorter than the booking horizon",
            ));
        }
        if self.payment_status_attempts == 0 {
            return Err(ConfigError::Invalid(
                "at least one payment status attempt is required",
            ));
        }
        if self.purchase_claim_timeout <= TimeDelta::zero() {
            return Err(ConfigError::Invalid("purchase claims need a positive timeout"));
        }
        if self.max_active_appointments == 0 {
            return Err(ConfigError::Invalid(
                "users must be allowed at least one active appointment",
            ));
        }

        Ok(())
    }
}

/// Parse a variable, or fall back to `default` when it is absent
///
/// Values are capped to `u32` so that the narrowing casts above are lossless.
fn parse_or<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => u32::from_str(raw.trim())
            .map(u64::from)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}
