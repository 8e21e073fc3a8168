//! Booking and loyalty-points engine for a vehicle cleaning business.
//!
//! The crate is split the usual hexagonal way: `domain` holds pure types and
//! policy, `ports` the traits for everything outside the process, `adapters`
//! concrete implementations of those ports, and `commands` the use-cases,
//! each exposed as a [`tower::Service`] on [`commands::DomainLogic`].

pub mod adapters;
pub mod commands;
pub mod config;
pub mod domain;
pub mod ports;
