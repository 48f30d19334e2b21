//! Phase-aware Kelly stake sizing.
//!
//! The raw Kelly fraction is divided by a per-phase divisor before the
//! bankroll caps are applied. Divisors are either static per phase or, in
//! dynamic mode, a linear function of the phase's recent win rate.

use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::cycle::CyclePhase;
use crate::error::RaterError;

pub const MIN_DIVISOR: f64 = 2.0;
pub const MAX_DIVISOR: f64 = 20.0;

/// American odds to decimal odds (−110 → 1.909…, +150 → 2.5).
pub fn american_to_decimal(odds: i32) -> f64 {
    if odds < 0 {
        1.0 + 100.0 / f64::from(odds.unsigned_abs())
    } else {
        1.0 + f64::from(odds) / 100.0
    }
}

/// Full Kelly fraction `(p·b − q) / b` with `b = decimal_odds − 1`.
pub fn raw_kelly(win_prob: f64, decimal_odds: f64) -> Result<f64, RaterError> {
    if !(0.0..=1.0).contains(&win_prob) {
        return Err(RaterError::InvalidConfig(format!("win probability {win_prob} outside 0..=1")));
    }
    if !(decimal_odds > 1.0) {
        return Err(RaterError::InvalidConfig(format!("decimal odds {decimal_odds} must exceed 1.0")));
    }
    let b = decimal_odds - 1.0;
    Ok((win_prob * b - (1.0 - win_prob)) / b)
}

pub(crate) fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `intercept − (win_rate − pivot) × slope`, clamped to the divisor bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearDivisor {
    pub intercept: f64,
    pub pivot: f64,
    pub slope: f64,
}

impl LinearDivisor {
    pub fn eval(&self, win_rate: f64) -> f64 {
        (self.intercept - (win_rate - self.pivot) * self.slope).clamp(MIN_DIVISOR, MAX_DIVISOR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivisorMode {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDivisors {
    pub mode: DivisorMode,
    #[serde(default)]
    pub static_divisors: BTreeMap<CyclePhase, f64>,
    #[serde(default)]
    pub dynamic_formulas: BTreeMap<CyclePhase, LinearDivisor>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DivisorFile {
    Structured(PhaseDivisors),
    Flat(BTreeMap<String, f64>),
}

impl Default for PhaseDivisors {
    fn default() -> Self {
        let static_divisors = BTreeMap::from([
            (CyclePhase::Menstrual, 8.0),
            (CyclePhase::Follicular, 6.0),
            (CyclePhase::Ovulatory, 4.0),
            (CyclePhase::Luteal, 5.0),
        ]);
        let linear = |intercept, pivot, slope| LinearDivisor {
            intercept,
            pivot,
            slope,
        };
        let dynamic_formulas = BTreeMap::from([
            (CyclePhase::Menstrual, linear(10.0, 0.45, 20.0)),
            (CyclePhase::Follicular, linear(8.0, 0.50, 16.0)),
            (CyclePhase::Ovulatory, linear(6.0, 0.55, 12.0)),
            (CyclePhase::Luteal, linear(7.0, 0.52, 14.0)),
        ]);
        Self {
            mode: DivisorMode::Static,
            static_divisors,
            dynamic_formulas,
        }
    }
}

impl PhaseDivisors {
    /// Parses either the structured form (`mode`, `static_divisors`,
    /// `dynamic_formulas`) or a flat `{"phase": divisor}` object.
    pub fn from_json(bytes: &[u8]) -> Result<Self, RaterError> {
        let file: DivisorFile = serde_json::from_slice(bytes)
            .map_err(|e| RaterError::InvalidConfig(format!("divisor config: {e}")))?;

        let divisors = match file {
            DivisorFile::Structured(d) => d,
            DivisorFile::Flat(map) => {
                let mut static_divisors = BTreeMap::new();
                for (phase, value) in map {
                    static_divisors.insert(phase.parse::<CyclePhase>()?, value);
                }
                PhaseDivisors {
                    mode: DivisorMode::Static,
                    static_divisors,
                    ..Default::default()
                }
            }
        };
        divisors.validate()?;
        Ok(divisors)
    }

    /// Loads from `path`, falling back to defaults when the file is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Divisor config not found, using defaults");
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)?;
        Ok(Self::from_json(&bytes)?)
    }

    fn validate(&self) -> Result<(), RaterError> {
        for (phase, d) in &self.static_divisors {
            if !(*d > 0.0) {
                return Err(RaterError::InvalidConfig(format!(
                    "invalid divisor for phase {phase}: {d}"
                )));
            }
        }
        Ok(())
    }

    fn static_divisor(&self, phase: CyclePhase) -> f64 {
        let defaults = PhaseDivisors::default();
        self.static_divisors
            .get(&phase)
            .or_else(|| self.static_divisors.get(&CyclePhase::Follicular))
            .or_else(|| defaults.static_divisors.get(&phase))
            .copied()
            .unwrap_or(6.0)
    }

    /// Divisor for `phase`; dynamic formulas apply only when a win rate is known.
    pub fn divisor(&self, phase: CyclePhase, win_rate: Option<f64>) -> f64 {
        if self.mode == DivisorMode::Dynamic {
            if let (Some(wr), Some(formula)) = (win_rate, self.dynamic_formulas.get(&phase)) {
                return formula.eval(wr);
            }
        }
        self.static_divisor(phase)
    }

    /// Divisor at a few reference win rates, for reporting.
    pub fn divisor_curve(&self, phase: CyclePhase) -> Vec<(f64, f64)> {
        [0.45, 0.50, 0.52, 0.55, 0.60]
            .into_iter()
            .map(|wr| (wr, self.divisor(phase, Some(wr))))
            .collect()
    }
}

/// A bet under consideration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub win_prob: f64,
    pub decimal_odds: f64,
    pub phase: CyclePhase,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub id: String,
    pub phase: CyclePhase,
    pub kelly_fraction: f64,
    pub expected_growth: f64,
    pub stake: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedBet {
    pub bet_num: usize,
    pub phase: CyclePhase,
    pub stake: f64,
    pub won: bool,
    pub bankroll: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub initial_bankroll: f64,
    pub final_bankroll: f64,
    pub total_return: f64,
    pub num_bets: usize,
    pub win_rate: f64,
    pub avg_stake: f64,
    pub bets: Vec<SimulatedBet>,
}

#[derive(Debug, Clone)]
pub struct BankrollOptimizer {
    pub divisors: PhaseDivisors,
    /// Cap on any single stake as a fraction of bankroll.
    pub max_bet_fraction: f64,
    /// Stakes below this are not placed at all.
    pub min_bet: f64,
    /// Cap on the total staked across one portfolio, as a fraction of bankroll.
    pub max_exposure: f64,
}

impl Default for BankrollOptimizer {
    fn default() -> Self {
        Self::new(PhaseDivisors::default())
    }
}

impl BankrollOptimizer {
    pub fn new(divisors: PhaseDivisors) -> Self {
        Self {
            divisors,
            max_bet_fraction: 0.05,
            min_bet: 5.0,
            max_exposure: 0.25,
        }
    }

    pub fn with_constraints(mut self, min_bet: f64, max_bet_fraction: f64) -> Self {
        self.min_bet = min_bet.max(0.0);
        self.max_bet_fraction = max_bet_fraction.clamp(0.0, 1.0);
        self
    }

    /// Divided and capped Kelly fraction; zero for non-positive edges.
    pub fn kelly_fraction(
        &self,
        win_prob: f64,
        decimal_odds: f64,
        phase: CyclePhase,
        win_rate: Option<f64>,
    ) -> Result<f64, RaterError> {
        let raw = raw_kelly(win_prob, decimal_odds)?;
        if raw <= 0.0 {
            return Ok(0.0);
        }
        let divisor = self.divisors.divisor(phase, win_rate);
        Ok((raw / divisor).min(self.max_bet_fraction))
    }

    /// Stake in currency units, rounded to cents; zero when below the minimum bet.
    pub fn calculate_stake(
        &self,
        bankroll: f64,
        win_prob: f64,
        decimal_odds: f64,
        phase: CyclePhase,
        win_rate: Option<f64>,
    ) -> Result<f64, RaterError> {
        if bankroll <= 0.0 {
            return Ok(0.0);
        }
        let fraction = self.kelly_fraction(win_prob, decimal_odds, phase, win_rate)?;
        let stake = bankroll * fraction;
        if fraction <= 0.0 || stake < self.min_bet {
            return Ok(0.0);
        }
        Ok(round_cents(stake))
    }

    /// Sizes a bet from its expected value alone: `bankroll × ev / divisor`,
    /// capped at the max bet fraction.
    pub fn size_bet_by_ev(&self, bankroll: f64, ev: f64, phase: CyclePhase) -> f64 {
        if bankroll <= 0.0 || ev <= 0.0 {
            return 0.0;
        }
        let divisor = self.divisors.divisor(phase, None);
        let stake = (bankroll * ev / divisor).min(bankroll * self.max_bet_fraction);
        if stake < self.min_bet {
            return 0.0;
        }
        round_cents(stake)
    }

    /// Ranks opportunities by expected growth and allocates stakes from the
    /// remaining bankroll until `max_bets` or the exposure cap is reached.
    pub fn optimize_portfolio(
        &self,
        bankroll: f64,
        opportunities: &[Opportunity],
        win_rate: Option<f64>,
        max_bets: usize,
    ) -> Result<Vec<Allocation>, RaterError> {
        let mut ranked = Vec::with_capacity(opportunities.len());
        for opp in opportunities {
            let f = self.kelly_fraction(opp.win_prob, opp.decimal_odds, opp.phase, win_rate)?;
            let growth = f * (opp.win_prob * opp.decimal_odds - 1.0);
            ranked.push((opp, f, growth));
        }
        ranked.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut allocated = 0.0;
        let mut selected = Vec::new();

        for (opp, fraction, growth) in ranked.into_iter().take(max_bets) {
            if fraction <= 0.0 {
                continue;
            }
            let remaining = bankroll - allocated;
            let stake =
                self.calculate_stake(remaining, opp.win_prob, opp.decimal_odds, opp.phase, win_rate)?;
            if stake < self.min_bet || stake <= 0.0 {
                debug!(id = %opp.id, stake, "Stake below minimum, skipping");
                continue;
            }

            allocated += stake;
            selected.push(Allocation {
                id: opp.id.clone(),
                phase: opp.phase,
                kelly_fraction: fraction,
                expected_growth: growth,
                stake,
            });

            if allocated >= bankroll * self.max_exposure {
                info!(allocated, "Exposure cap reached");
                break;
            }
        }

        Ok(selected)
    }

    /// Monte-Carlo bankroll path with jittered probabilities and odds.
    pub fn simulate_growth<R: Rng>(
        &self,
        rng: &mut R,
        initial_bankroll: f64,
        num_bets: usize,
        avg_win_prob: f64,
        avg_odds: f64,
        phase_weights: &[(CyclePhase, f64)],
        win_rate_by_phase: &BTreeMap<CyclePhase, f64>,
    ) -> Result<SimulationResult, RaterError> {
        let total_weight: f64 = phase_weights.iter().map(|(_, w)| w.max(0.0)).sum();
        if phase_weights.is_empty() || !(total_weight > 0.0) {
            return Err(RaterError::InvalidConfig(
                "phase distribution must have positive weight".to_string(),
            ));
        }

        let mut bankroll = initial_bankroll;
        let mut bets = Vec::new();

        for i in 0..num_bets {
            let mut pick = rng.random::<f64>() * total_weight;
            let mut phase = phase_weights[phase_weights.len() - 1].0;
            for (p, w) in phase_weights {
                let w = w.max(0.0);
                if pick < w {
                    phase = *p;
                    break;
                }
                pick -= w;
            }

            let win_prob = (avg_win_prob + rng.random_range(-0.08..0.08)).clamp(0.3, 0.7);
            let odds = (avg_odds + rng.random_range(-0.3..0.3)).max(1.5);
            let win_rate = win_rate_by_phase.get(&phase).copied().or(Some(0.52));

            let stake = self.calculate_stake(bankroll, win_prob, odds, phase, win_rate)?;
            if stake <= 0.0 {
                continue;
            }

            let won = rng.random::<f64>() < win_prob;
            if won {
                bankroll += stake * (odds - 1.0);
            } else {
                bankroll -= stake;
            }
            bets.push(SimulatedBet {
                bet_num: i + 1,
                phase,
                stake,
                won,
                bankroll,
            });
        }

        let wins = bets.iter().filter(|b| b.won).count();
        let total_staked: f64 = bets.iter().map(|b| b.stake).sum();
        let n = bets.len();

        Ok(SimulationResult {
            initial_bankroll,
            final_bankroll: bankroll,
            total_return: if initial_bankroll > 0.0 {
                (bankroll - initial_bankroll) / initial_bankroll
            } else {
                0.0
            },
            num_bets: n,
            win_rate: if n == 0 { 0.0 } else { wins as f64 / n as f64 },
            avg_stake: if n == 0 { 0.0 } else { total_staked / n as f64 },
            bets,
        })
    }
}
