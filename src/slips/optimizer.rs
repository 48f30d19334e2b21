use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use super::payout::{MAX_LEGS, MIN_LEGS, PayoutTables};
use super::{Leg, Slip, TicketType};
use crate::mapping::normalize_name;
use crate::settle::SlipStatus;

/// Beam-search slip generator.
#[derive(Debug, Clone)]
pub struct SlipOptimizer {
    pub payouts: PayoutTables,
    pub beam_width: usize,
    pub max_legs: usize,
    /// How many slips a single prop may appear on.
    pub max_per_prop: usize,
}

struct State {
    picks: Vec<usize>,
    score: f64,
}

impl SlipOptimizer {
    pub fn new(payouts: PayoutTables) -> Self {
        Self {
            payouts,
            beam_width: 50,
            max_legs: MAX_LEGS,
            max_per_prop: 3,
        }
    }

    /// Generates up to `target` distinct positive-EV slips of one ticket type.
    pub fn generate(
        &self,
        candidates: &[Leg],
        ticket: TicketType,
        target: usize,
        date: NaiveDate,
    ) -> Vec<Slip> {
        let mut usage: HashMap<&str, usize> = HashMap::new();
        let mut seen: HashSet<Vec<usize>> = HashSet::new();
        let mut slips = Vec::new();

        while slips.len() < target {
            let available: Vec<usize> = (0..candidates.len())
                .filter(|&i| {
                    usage.get(candidates[i].prop_id.as_str()).copied().unwrap_or(0) < self.max_per_prop
                })
                .collect();
            if available.len() < MIN_LEGS {
                debug!(available = available.len(), "Too few props left for another slip");
                break;
            }

            let Some((picks, ev)) = self.best_slip(candidates, &available, ticket, &seen) else {
                debug!("No positive-EV slip remaining");
                break;
            };

            for &i in &picks {
                *usage.entry(candidates[i].prop_id.as_str()).or_default() += 1;
            }
            let legs: Vec<Leg> = picks.iter().map(|&i| candidates[i].clone()).collect();
            seen.insert(picks);

            slips.push(Slip {
                slip_id: Slip::make_id(ticket, date, slips.len() + 1),
                date,
                ticket_type: ticket,
                legs,
                ev: (ev * 10_000.0).round() / 10_000.0,
                stake: 0.0,
                status: SlipStatus::Created,
                payout: None,
                profit: None,
                created_at: Utc::now(),
                settled_at: None,
            });
        }

        info!(ticket = %ticket, generated = slips.len(), target, "Slip generation finished");
        slips
    }

    /// Best slip over all sizes from `MIN_LEGS` to `max_legs`, excluding
    /// combinations already issued.
    fn best_slip(
        &self,
        candidates: &[Leg],
        available: &[usize],
        ticket: TicketType,
        seen: &HashSet<Vec<usize>>,
    ) -> Option<(Vec<usize>, f64)> {
        let mut beam = vec![State {
            picks: Vec::new(),
            score: 1.0,
        }];
        let mut best: Option<(Vec<usize>, f64)> = None;

        for size in 1..=self.max_legs {
            let mut next = Vec::new();
            for state in &beam {
                // Extend in index order only so each combination is built once.
                let start = state
                    .picks
                    .last()
                    .and_then(|last| available.iter().position(|i| i == last))
                    .map_or(0, |pos| pos + 1);

                for &idx in &available[start..] {
                    if !compatible(candidates, &state.picks, idx) {
                        continue;
                    }
                    let mut picks = state.picks.clone();
                    picks.push(idx);
                    let score = if size >= MIN_LEGS {
                        let probs: Vec<f64> = picks.iter().map(|&i| candidates[i].probability).collect();
                        self.payouts.ev(ticket, &probs)
                    } else {
                        state.score * candidates[idx].probability
                    };
                    next.push(State { picks, score });
                }
            }

            next.sort_by(|a, b| b.score.total_cmp(&a.score));

            if size >= MIN_LEGS {
                if let Some(top) = next.iter().find(|s| s.score > 0.0 && !seen.contains(&s.picks)) {
                    if best.as_ref().is_none_or(|(_, ev)| top.score > *ev) {
                        best = Some((top.picks.clone(), top.score));
                    }
                }
            }

            next.truncate(self.beam_width);
            if next.is_empty() {
                break;
            }
            beam = next;
        }

        best
    }
}

/// A leg may join a slip only if no existing leg shares its prop or player.
fn compatible(candidates: &[Leg], picks: &[usize], idx: usize) -> bool {
    let leg = &candidates[idx];
    let player = normalize_name(&leg.player);
    picks.iter().all(|&i| {
        let other = &candidates[i];
        other.prop_id != leg.prop_id && normalize_name(&other.player) != player
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slips::test_support::leg;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn pool(probs: &[f64]) -> Vec<Leg> {
        probs
            .iter()
            .enumerate()
            .map(|(i, p)| leg(&format!("P{i:03}"), &format!("Player {i}"), *p))
            .collect()
    }

    #[test]
    fn test_generates_positive_ev_slips_with_ids() {
        let opt = SlipOptimizer::new(PayoutTables::default());
        let legs = pool(&[0.7, 0.68, 0.66, 0.64, 0.62, 0.6, 0.58, 0.56]);
        let slips = opt.generate(&legs, TicketType::Power, 3, date());

        assert_eq!(slips.len(), 3);
        assert_eq!(slips[0].slip_id, "POWER_20240601_001");
        assert_eq!(slips[2].slip_id, "POWER_20240601_003");
        assert!(slips.iter().all(|s| s.ev > 0.0));
        assert!(slips.iter().all(|s| (MIN_LEGS..=MAX_LEGS).contains(&s.legs.len())));
        assert!(slips.iter().all(|s| s.status == SlipStatus::Created));
    }

    #[test]
    fn test_slips_are_distinct_and_respect_usage_cap() {
        let opt = SlipOptimizer::new(PayoutTables::default());
        let legs = pool(&[0.75, 0.74, 0.73, 0.72, 0.71, 0.7]);
        let slips = opt.generate(&legs, TicketType::Power, 20, date());

        let keys: HashSet<String> = slips.iter().map(Slip::key).collect();
        assert_eq!(keys.len(), slips.len());

        let mut usage: HashMap<String, usize> = HashMap::new();
        for s in &slips {
            for l in &s.legs {
                *usage.entry(l.prop_id.clone()).or_default() += 1;
            }
        }
        assert!(usage.values().all(|&n| n <= 3));
    }

    #[test]
    fn test_no_player_appears_twice_in_a_slip() {
        let opt = SlipOptimizer::new(PayoutTables::default());
        let mut legs = pool(&[0.8, 0.8, 0.8, 0.8]);
        let mut dup = leg("P900", "Player 0", 0.9);
        dup.prop_type = "Rebounds".to_string();
        legs.push(dup);

        for slip in opt.generate(&legs, TicketType::Power, 5, date()) {
            let players: HashSet<String> = slip.legs.iter().map(|l| normalize_name(&l.player)).collect();
            assert_eq!(players.len(), slip.legs.len());
        }
    }

    #[test]
    fn test_stops_when_ev_is_not_positive() {
        let opt = SlipOptimizer::new(PayoutTables::default());
        // 0.45^3 * 10 - 1 < 0 and larger slips are worse
        let legs = pool(&[0.45, 0.45, 0.45, 0.45, 0.45]);
        assert!(opt.generate(&legs, TicketType::Power, 5, date()).is_empty());
    }

    #[test]
    fn test_too_few_candidates() {
        let opt = SlipOptimizer::new(PayoutTables::default());
        let legs = pool(&[0.9, 0.9]);
        assert!(opt.generate(&legs, TicketType::Flex, 5, date()).is_empty());
    }

    #[test]
    fn test_flex_slips_have_flex_ids() {
        let opt = SlipOptimizer::new(PayoutTables::default());
        let legs = pool(&[0.8, 0.78, 0.76, 0.74, 0.72]);
        let slips = opt.generate(&legs, TicketType::Flex, 1, date());
        assert_eq!(slips.len(), 1);
        assert!(slips[0].slip_id.starts_with("FLEX_"));
    }
}
