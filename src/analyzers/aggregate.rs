use crate::analyzers::types::PhaseStats;
use crate::analyzers::utility::ratio;
use crate::cycle::CyclePhase;
use crate::settle::{Outcome, SlipStatus};
use crate::slips::Slip;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Default)]
struct Tally {
    bets: usize,
    wins: usize,
    staked: f64,
    profit: f64,
}

/// Aggregates settled slips into per-phase [`PhaseStats`].
///
/// Voided slips are not bets and are left out. Each slip counts toward its
/// dominant phase.
pub fn aggregate_by_phase(slips: &[Slip]) -> Vec<PhaseStats> {
    let mut tallies: BTreeMap<CyclePhase, Tally> = BTreeMap::new();

    for slip in slips {
        let won = match slip.status {
            SlipStatus::Settled(Outcome::Won) => true,
            SlipStatus::Settled(Outcome::Lost | Outcome::Push) => false,
            _ => continue,
        };
        let tally = tallies.entry(slip.dominant_phase()).or_default();
        tally.bets += 1;
        tally.wins += usize::from(won);
        tally.staked += slip.stake;
        tally.profit += slip.profit.unwrap_or(0.0);
    }

    tallies
        .into_iter()
        .map(|(phase, t)| PhaseStats {
            phase,
            total_bets: t.bets,
            total_wins: t.wins,
            win_rate: ratio(t.wins, t.bets),
            staked: t.staked,
            profit: t.profit,
            roi: if t.staked > 0.0 { t.profit / t.staked } else { 0.0 },
        })
        .collect()
}

/// Slips placed on `date`, counted by dominant phase.
pub fn bets_on(slips: &[Slip], date: NaiveDate) -> BTreeMap<CyclePhase, usize> {
    let mut counts = BTreeMap::new();
    for slip in slips.iter().filter(|s| s.date == date) {
        if matches!(slip.status, SlipStatus::Settled(Outcome::Void)) {
            continue;
        }
        *counts.entry(slip.dominant_phase()).or_default() += 1;
    }
    counts
}
