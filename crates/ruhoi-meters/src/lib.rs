//! ruhoi-meters – statistics tracking.
//!
//! A [`NumericMeter`] is an append-only log of numbers with sum / mean /
//! max / min over everything recorded so far.  [`HandyTimer`] is a meter
//! of durations fed by a drop guard, so a timed block records exactly one
//! entry however it exits.

use thiserror::Error;

mod meter;
mod timer;

pub use meter::{Aggregation, Numeric, NumericMeter};
pub use timer::{HandyTimer, TimerGuard};

#[derive(Debug, Error, PartialEq)]
pub enum MeterError {
    #[error("Given element '{0}' is not a numeral")]
    NonNumeric(String),
}

pub type Result<T> = std::result::Result<T, MeterError>;
