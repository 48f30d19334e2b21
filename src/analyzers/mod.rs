//! Settled-slip aggregation and phase confidence grading.
//!
//! This module aggregates settled slips by cycle phase, assigns confidence
//! statuses and Kelly risk divisors, keeps the daily confidence log, and
//! projects when each phase reaches a production sample size.

pub mod aggregate;
pub mod analyzer;
pub mod confidence;
pub mod grade;
pub mod types;
pub mod utility;
