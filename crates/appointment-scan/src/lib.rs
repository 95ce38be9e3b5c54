//! # Appointment Scan
//!
//! This crate watches an online booking page for free appointment slots.
//! It fetches the page, classifies it as available, unavailable or blocked,
//! records every check in a [`watch_store::StateStore`] and emails when
//! slots appear, while respecting rate limits and backing off when the
//! target pushes back.

/// Types shared across the watch pipeline
mod watch_types;
pub use watch_types::*;

/// Configuration loading and validation
mod config;
pub use config::*;

/// Availability parser for page text
mod parser;
pub use parser::*;

/// Canonical JSON and result hashing
mod hashing;
pub use hashing::*;

/// Injectable clock
mod time_source;
pub use time_source::*;

/// Checker trait and the endpoint checker
mod checker;
pub use checker::*;

/// HTTP page checker
mod page_checker;
pub use page_checker::*;

/// Notification services
mod notification_service;
pub use notification_service::*;

/// SMTP email transport
mod email_service;
pub use email_service::*;

/// Scheduling engine
mod executor;
pub use executor::*;

mod executor_helpers;
pub use executor_helpers::{compute_backoff, jittered_interval};

#[cfg(test)]
mod test_support;
