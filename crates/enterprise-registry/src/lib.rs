//! Enterprise registration and administrative workflow engine.
//!
//! Validates shareholding structures, issues year-scoped `CE-YYYY-MM-DD-NNNNN` references and
//! moves registrations through the fixed sequence of administrative review steps.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
