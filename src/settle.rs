//! Slip lifecycle and grading against observed results.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::error::RaterError;
use crate::mapping::normalize_name;
use crate::output::read_records;
use crate::slips::{Leg, MIN_LEGS, PayoutTables, Side, Slip};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Won,
    Lost,
    Push,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlipStatus {
    Created,
    Pending,
    Settled(Outcome),
}

impl fmt::Display for SlipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlipStatus::Created => "created",
            SlipStatus::Pending => "pending",
            SlipStatus::Settled(Outcome::Won) => "won",
            SlipStatus::Settled(Outcome::Lost) => "lost",
            SlipStatus::Settled(Outcome::Push) => "push",
            SlipStatus::Settled(Outcome::Void) => "void",
        };
        f.write_str(s)
    }
}

impl SlipStatus {
    pub fn is_settled(self) -> bool {
        matches!(self, SlipStatus::Settled(_))
    }

    /// Created → Pending, Created → Void, Pending → Settled. Nothing else.
    pub fn can_transition(self, to: SlipStatus) -> bool {
        matches!(
            (self, to),
            (SlipStatus::Created, SlipStatus::Pending)
                | (SlipStatus::Created, SlipStatus::Settled(Outcome::Void))
                | (SlipStatus::Pending, SlipStatus::Settled(_))
        )
    }
}

/// Moves `slip` to `to`, rejecting transitions the lifecycle does not allow.
pub fn transition(slip: &mut Slip, to: SlipStatus) -> Result<(), RaterError> {
    if !slip.status.can_transition(to) {
        return Err(RaterError::InvalidTransition {
            slip_id: slip.slip_id.clone(),
            from: slip.status.to_string(),
            to: to.to_string(),
        });
    }
    debug!(slip_id = %slip.slip_id, from = %slip.status, to = %to, "Slip status change");
    slip.status = to;
    Ok(())
}

/// Places a created slip, or cancels it when it carries no stake.
pub fn submit(slip: &mut Slip) -> Result<(), RaterError> {
    if slip.stake > 0.0 {
        transition(slip, SlipStatus::Pending)
    } else {
        transition(slip, SlipStatus::Settled(Outcome::Void))?;
        slip.payout = Some(0.0);
        slip.profit = Some(0.0);
        Ok(())
    }
}

/// One observed stat line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub player: String,
    pub prop_type: String,
    pub actual: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LegResult {
    Hit,
    Miss,
    Push,
}

/// Observed results keyed by normalized player and prop type.
#[derive(Debug, Default)]
pub struct ResultBook {
    actuals: HashMap<(String, String), f64>,
}

impl ResultBook {
    pub fn new(rows: impl IntoIterator<Item = ResultRow>) -> Self {
        let actuals = rows
            .into_iter()
            .map(|r| ((normalize_name(&r.player), r.prop_type.to_lowercase()), r.actual))
            .collect();
        Self { actuals }
    }

    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(read_records::<ResultRow>(path)?))
    }

    pub fn actual(&self, player: &str, prop_type: &str) -> Option<f64> {
        self.actuals
            .get(&(normalize_name(player), prop_type.to_lowercase()))
            .copied()
    }

    /// Result of one leg; `None` when no result has been recorded yet.
    pub fn grade_leg(&self, leg: &Leg) -> Option<LegResult> {
        let actual = self.actual(&leg.player, &leg.prop_type)?;
        Some(grade_actual(leg, actual))
    }
}

/// Over hits above the line, under below it; landing on the line is a push.
pub fn grade_actual(leg: &Leg, actual: f64) -> LegResult {
    if actual == leg.line {
        LegResult::Push
    } else if (actual > leg.line) == (leg.side == Side::Over) {
        LegResult::Hit
    } else {
        LegResult::Miss
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SettleReport {
    pub settled: usize,
    pub unresolved: usize,
    pub won: usize,
    pub lost: usize,
    pub push: usize,
    pub void: usize,
    pub profit: f64,
}

/// Grades a pending slip. Returns `Ok(None)` while any leg lacks a result.
///
/// Pushed legs are removed and the slip is paid at the reduced size; below
/// the minimum slip size it is voided and the stake refunded.
pub fn grade_slip(
    slip: &mut Slip,
    book: &ResultBook,
    payouts: &PayoutTables,
    now: DateTime<Utc>,
) -> Result<Option<Outcome>, RaterError> {
    if slip.status != SlipStatus::Pending {
        return Err(RaterError::InvalidTransition {
            slip_id: slip.slip_id.clone(),
            from: slip.status.to_string(),
            to: "settled".to_string(),
        });
    }

    let mut results = Vec::with_capacity(slip.legs.len());
    for leg in &slip.legs {
        match book.grade_leg(leg) {
            Some(r) => results.push(r),
            None => return Ok(None),
        }
    }

    let live = results.iter().filter(|r| **r != LegResult::Push).count();
    let hits = results.iter().filter(|r| **r == LegResult::Hit).count();

    let (outcome, payout) = if live < MIN_LEGS {
        (Outcome::Void, slip.stake)
    } else {
        let payout = slip.stake * payouts.payout(slip.ticket_type, hits, live);
        let outcome = if payout > slip.stake {
            Outcome::Won
        } else if payout == slip.stake {
            Outcome::Push
        } else {
            Outcome::Lost
        };
        (outcome, payout)
    };

    transition(slip, SlipStatus::Settled(outcome))?;
    slip.payout = Some((payout * 100.0).round() / 100.0);
    slip.profit = Some(((payout - slip.stake) * 100.0).round() / 100.0);
    slip.settled_at = Some(now);

    info!(
        slip_id = %slip.slip_id,
        outcome = %slip.status,
        hits,
        live,
        profit = slip.profit,
        "Slip settled"
    );
    Ok(Some(outcome))
}

/// Grades every pending slip; settled and created ones are left alone.
#[instrument(skip_all, fields(slips = slips.len()))]
pub fn settle_slips(
    slips: &mut [Slip],
    book: &ResultBook,
    payouts: &PayoutTables,
    now: DateTime<Utc>,
) -> Result<SettleReport, RaterError> {
    let mut report = SettleReport::default();
    for slip in slips.iter_mut().filter(|s| s.status == SlipStatus::Pending) {
        match grade_slip(slip, book, payouts, now)? {
            Some(outcome) => {
                report.settled += 1;
                report.profit += slip.profit.unwrap_or(0.0);
                match outcome {
                    Outcome::Won => report.won += 1,
                    Outcome::Lost => report.lost += 1,
                    Outcome::Push => report.push += 1,
                    Outcome::Void => report.void += 1,
                }
            }
            None => report.unresolved += 1,
        }
    }
    if report.unresolved > 0 {
        warn!(unresolved = report.unresolved, "Some slips are missing results");
    }
    Ok(report)
}
