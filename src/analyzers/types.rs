//! Data types used by the phase performance pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cycle::CyclePhase;

/// Settled-slip performance for one cycle phase, written as `backtest_by_phase.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub phase: CyclePhase,
    pub total_bets: usize,
    pub total_wins: usize,
    pub win_rate: f64,
    pub staked: f64,
    pub profit: f64,
    pub roi: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceStatus {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfidenceStatus::Low => "LOW",
            ConfidenceStatus::Medium => "MEDIUM",
            ConfidenceStatus::High => "HIGH",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
    /// No settled history for the phase.
    Fallback,
}

/// Kelly divisor assigned to a phase from its track record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskDivisor {
    pub phase: CyclePhase,
    pub divisor: f64,
    pub win_rate: f64,
    pub sample_size: usize,
    pub risk: RiskLevel,
}

/// One row of `phase_confidence_log.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceLogEntry {
    pub date: NaiveDate,
    pub phase: CyclePhase,
    pub total_bets: usize,
    pub total_wins: usize,
    pub win_rate: f64,
    pub confidence_status: ConfidenceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub phase: CyclePhase,
    pub date: NaiveDate,
    pub from: ConfidenceStatus,
    pub to: ConfidenceStatus,
    pub upgrade: bool,
}

/// Days until a phase reaches the 20- and 30-bet sample sizes at today's pace.
/// `None` means the threshold is not reachable at the current pace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdProjection {
    pub phase: CyclePhase,
    pub current_bets: usize,
    pub today_bets: usize,
    pub days_to_20: Option<u64>,
    pub days_to_30: Option<u64>,
}

/// Everything the `phases` command reports, written as `phase_report.json`.
#[derive(Debug, Serialize)]
pub struct PhaseReport {
    pub generated_at: DateTime<Utc>,
    pub date: NaiveDate,
    pub phases: Vec<PhaseStats>,
    pub divisors: Vec<RiskDivisor>,
    pub changes: Vec<StatusChange>,
    pub projections: Vec<ThresholdProjection>,
}
