//! Multi-leg slips: payout tables, EV, beam-search generation, candidate
//! building and the daily guard rail.

mod candidates;
mod guard;
mod optimizer;
mod payout;

pub use candidates::{CandidateBuilder, CandidateReport, correlation, correlation_filter};
pub use guard::{dedupe, enforce_minimum, ensure_replaceable};
pub use optimizer::SlipOptimizer;
pub use payout::{MAX_LEGS, MIN_LEGS, PayoutTables};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::cycle::CyclePhase;
use crate::settle::SlipStatus;
use crate::staking::BankrollOptimizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketType {
    Power,
    Flex,
}

impl TicketType {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketType::Power => "POWER",
            TicketType::Flex => "FLEX",
        }
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Over,
    Under,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Over => "over",
            Side::Under => "under",
        })
    }
}

/// One pick on a slip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub prop_id: String,
    pub player: String,
    #[serde(default)]
    pub stats_id: Option<String>,
    pub prop_type: String,
    pub line: f64,
    pub side: Side,
    /// Model probability that this side hits.
    pub probability: f64,
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default = "unknown_phase")]
    pub phase: CyclePhase,
}

fn unknown_phase() -> CyclePhase {
    CyclePhase::Unknown
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slip {
    pub slip_id: String,
    pub date: NaiveDate,
    pub ticket_type: TicketType,
    pub legs: Vec<Leg>,
    pub ev: f64,
    #[serde(default)]
    pub stake: f64,
    pub status: SlipStatus,
    #[serde(default)]
    pub payout: Option<f64>,
    #[serde(default)]
    pub profit: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
}

impl Slip {
    /// `{TICKET}_{YYYYMMDD}_{NNN}`, numbered from 1.
    pub fn make_id(ticket: TicketType, date: NaiveDate, n: usize) -> String {
        format!("{}_{}_{:03}", ticket, date.format("%Y%m%d"), n)
    }

    /// Most frequent known phase across the legs; `Unknown` if none are known.
    pub fn dominant_phase(&self) -> CyclePhase {
        let mut counts: BTreeMap<CyclePhase, usize> = BTreeMap::new();
        for leg in &self.legs {
            if leg.phase != CyclePhase::Unknown {
                *counts.entry(leg.phase).or_default() += 1;
            }
        }
        let mut best = CyclePhase::Unknown;
        let mut best_count = 0;
        for (phase, count) in counts {
            if count > best_count {
                best = phase;
                best_count = count;
            }
        }
        best
    }

    /// Order-independent identity of the picks, used for deduplication.
    pub fn key(&self) -> String {
        let mut parts: Vec<String> = self
            .legs
            .iter()
            .map(|l| format!("{}:{}", l.prop_id, l.side))
            .collect();
        parts.sort();
        format!("{}|{}", self.ticket_type, parts.join(","))
    }
}

/// One flat row per slip for the CSV summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlipSummary {
    pub slip_id: String,
    pub date: NaiveDate,
    pub ticket_type: TicketType,
    pub n_legs: usize,
    pub picks: String,
    pub phase: CyclePhase,
    pub ev: f64,
    pub stake: f64,
    pub status: String,
    pub payout: Option<f64>,
    pub profit: Option<f64>,
}

impl From<&Slip> for SlipSummary {
    fn from(slip: &Slip) -> Self {
        let picks = slip
            .legs
            .iter()
            .map(|l| format!("{} {} {} {}", l.player, l.prop_type, l.side, l.line))
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            slip_id: slip.slip_id.clone(),
            date: slip.date,
            ticket_type: slip.ticket_type,
            n_legs: slip.legs.len(),
            picks,
            phase: slip.dominant_phase(),
            ev: slip.ev,
            stake: slip.stake,
            status: slip.status.to_string(),
            payout: slip.payout,
            profit: slip.profit,
        }
    }
}

/// Sizes every slip from its EV and dominant phase against `bankroll`.
pub fn assign_stakes(slips: &mut [Slip], optimizer: &BankrollOptimizer, bankroll: f64) {
    for slip in slips.iter_mut() {
        slip.stake = optimizer.size_bet_by_ev(bankroll, slip.ev, slip.dominant_phase());
    }
}
