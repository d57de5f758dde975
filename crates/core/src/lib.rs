#![forbid(unsafe_code)]

//! Domain layer for timed exam-practice sessions.
//!
//! Everything here is pure: scoring, cooldown evaluation, the session reducer
//! and history analytics take their inputs explicitly and perform no I/O.

pub mod analytics;
pub mod cooldown;
pub mod error;
pub mod model;
pub mod scoring;
pub mod session;
pub mod time;

pub use error::Error;
pub use time::Clock;
