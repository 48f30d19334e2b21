//! Historical backtest over game logs.
//!
//! Every game in range is priced from the player's earlier games only,
//! against a synthetic line hung a little above their recent average. Legs
//! the candidate builder accepts are staked with the bankroll optimizer at
//! the default price and graded against the game itself.

use anyhow::Result;
use chrono::NaiveDate;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::analyzers::utility::{mean, ratio};
use crate::cycle::{CyclePhase, CycleTracker};
use crate::features::{GameLogIndex, GameLogRow, prop_value};
use crate::mapping::PlayerMapping;
use crate::projection::{DEFAULT_AMERICAN_ODDS, Projection};
use crate::settle::{LegResult, grade_actual};
use crate::slips::{CandidateBuilder, Side};
use crate::staking::{BankrollOptimizer, american_to_decimal, round_cents};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub prop_types: Vec<String>,
    /// Prior games required before a game is priced.
    pub min_games: usize,
    pub recent_games: usize,
    pub confidence_threshold: f64,
    /// Line shading above the recent average, as a fraction of it.
    pub house_edge: f64,
    /// Standard deviation of the line noise, as a fraction of the recent average.
    pub line_variance: f64,
    pub initial_bankroll: f64,
    pub max_bet: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            start: None,
            end: None,
            prop_types: ["Points", "Rebounds", "Assists", "Steals", "Blocked Shots"]
                .map(String::from)
                .to_vec(),
            min_games: 5,
            recent_games: 10,
            confidence_threshold: 0.55,
            house_edge: 0.05,
            line_variance: 0.1,
            initial_bankroll: 10_000.0,
            max_bet: 100.0,
        }
    }
}

impl BacktestConfig {
    fn in_range(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

/// One graded historical bet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestBet {
    pub date: NaiveDate,
    pub player: String,
    pub prop_type: String,
    pub line: f64,
    pub side: Side,
    pub probability: f64,
    pub actual: f64,
    pub result: LegResult,
    pub phase: CyclePhase,
    pub stake: f64,
    pub profit: f64,
    pub bankroll_after: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BacktestMetrics {
    pub total_bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub pushes: usize,
    pub hit_rate: f64,
    pub total_wagered: f64,
    pub total_profit: f64,
    pub roi: f64,
    /// Largest peak-to-trough fall of the bankroll, as a fraction of the peak.
    pub max_drawdown: f64,
    /// Mean over standard deviation of per-bet returns.
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseMetrics {
    pub phase: CyclePhase,
    #[serde(flatten)]
    pub metrics: BacktestMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub dates: usize,
    pub props_priced: usize,
    pub legs: usize,
    pub unstaked: usize,
    pub initial_bankroll: f64,
    pub final_bankroll: f64,
    pub bankroll_return: f64,
    pub overall: BacktestMetrics,
    pub by_phase: Vec<PhaseMetrics>,
}

/// Box-Muller draw from N(0, 1).
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Line for a player averaging `avg`: shaded by the house edge, jittered,
/// snapped to the half point and never below 0.5.
fn synthetic_line<R: Rng>(rng: &mut R, avg: f64, config: &BacktestConfig) -> f64 {
    let sigma = avg.abs() * config.line_variance;
    let noise = if sigma > 0.0 {
        standard_normal(rng) * sigma
    } else {
        0.0
    };
    let raw = avg * (1.0 + config.house_edge) + noise;
    ((raw * 2.0).round() / 2.0).max(0.5)
}

/// Game logs carry stats ids already, so each player maps to itself.
fn identity_mappings(rows: &[GameLogRow]) -> Vec<PlayerMapping> {
    let mut by_name: BTreeMap<&str, &GameLogRow> = BTreeMap::new();
    for row in rows {
        if row.player_id.as_deref().is_some_and(|id| !id.is_empty()) {
            by_name.entry(row.player_name.as_str()).or_insert(row);
        }
    }
    by_name
        .into_values()
        .map(|row| PlayerMapping {
            source_name: row.player_name.clone(),
            stats_id: row.player_id.clone(),
            stats_name: Some(row.player_name.clone()),
            confidence_score: 100.0,
            mapping_date: row.game_date,
            auto_mapped: true,
        })
        .collect()
}

/// Walks the game-log dates in order, pricing and grading each day's games.
#[instrument(skip_all, fields(rows = rows.len()))]
pub fn run_backtest<R: Rng>(
    rows: &[GameLogRow],
    tracker: &CycleTracker,
    optimizer: &BankrollOptimizer,
    config: &BacktestConfig,
    rng: &mut R,
) -> Result<(Vec<BacktestBet>, BacktestReport)> {
    let index = GameLogIndex::new(rows.to_vec());
    let mappings = identity_mappings(rows);
    let mut builder = CandidateBuilder::new(&index, &mappings, tracker, config.confidence_threshold);
    builder.recent_games = config.recent_games;
    builder.min_games = config.min_games;
    let odds = american_to_decimal(DEFAULT_AMERICAN_ODDS);

    let mut by_date: BTreeMap<NaiveDate, Vec<&GameLogRow>> = BTreeMap::new();
    for row in rows.iter().filter(|r| config.in_range(r.game_date)) {
        by_date.entry(row.game_date).or_default().push(row);
    }

    let mut bankroll = config.initial_bankroll;
    let mut bets: Vec<BacktestBet> = Vec::new();
    let mut props_priced = 0;
    let mut legs_total = 0;
    let mut unstaked = 0;

    for (date, games) in by_date.iter_mut() {
        let date = *date;
        games.sort_by(|a, b| a.player_name.cmp(&b.player_name));

        let mut board = Vec::new();
        for game in games.iter() {
            for prop_type in &config.prop_types {
                let form = index.recent_form(
                    game.player_id.as_deref(),
                    &game.player_name,
                    prop_type,
                    config.recent_games,
                    Some(date),
                );
                let Some(form) = form.filter(|f| f.games >= config.min_games) else {
                    continue;
                };
                let line = synthetic_line(rng, form.mean, config);
                let id = format!("{}_{}_{}", date.format("%Y%m%d"), game.player_name, prop_type);
                board.push(Projection::new(&id, &game.player_name, prop_type, line));
            }
        }
        props_priced += board.len();

        let (legs, _) = builder.build(&board, date);
        legs_total += legs.len();

        for leg in legs {
            let actual = index
                .game_on(leg.stats_id.as_deref(), &leg.player, date)
                .and_then(|g| prop_value(g, &leg.prop_type));
            let Some(actual) = actual else {
                continue;
            };

            let stake = optimizer
                .calculate_stake(bankroll, leg.probability, odds, leg.phase, None)?
                .min(config.max_bet);
            if stake <= 0.0 {
                unstaked += 1;
                continue;
            }

            let result = grade_actual(&leg, actual);
            let profit = match result {
                LegResult::Hit => round_cents(stake * (odds - 1.0)),
                LegResult::Miss => -stake,
                LegResult::Push => 0.0,
            };
            bankroll += profit;

            bets.push(BacktestBet {
                date,
                player: leg.player,
                prop_type: leg.prop_type,
                line: leg.line,
                side: leg.side,
                probability: leg.probability,
                actual,
                result,
                phase: leg.phase,
                stake,
                profit,
                bankroll_after: round_cents(bankroll),
            });
        }
        debug!(%date, bets = bets.len(), bankroll, "Backtest day graded");
    }

    let overall = metrics(&bets, config.initial_bankroll);

    let mut phases: BTreeMap<CyclePhase, Vec<BacktestBet>> = BTreeMap::new();
    for bet in &bets {
        phases.entry(bet.phase).or_default().push(bet.clone());
    }
    let by_phase = phases
        .into_iter()
        .map(|(phase, phase_bets)| PhaseMetrics {
            phase,
            metrics: metrics(&phase_bets, config.initial_bankroll),
        })
        .collect();

    let final_bankroll = round_cents(bankroll);
    let report = BacktestReport {
        start: config.start,
        end: config.end,
        dates: by_date.len(),
        props_priced,
        legs: legs_total,
        unstaked,
        initial_bankroll: config.initial_bankroll,
        final_bankroll,
        bankroll_return: if config.initial_bankroll > 0.0 {
            (final_bankroll - config.initial_bankroll) / config.initial_bankroll
        } else {
            0.0
        },
        overall,
        by_phase,
    };

    info!(
        dates = report.dates,
        bets = report.overall.total_bets,
        hit_rate = report.overall.hit_rate,
        roi = report.overall.roi,
        final_bankroll,
        "Backtest finished"
    );
    Ok((bets, report))
}

/// Summary statistics for a sequence of bets, with drawdown measured on a
/// bankroll starting at `initial_bankroll`.
pub fn metrics(bets: &[BacktestBet], initial_bankroll: f64) -> BacktestMetrics {
    let count = |r: LegResult| bets.iter().filter(|b| b.result == r).count();
    let wins = count(LegResult::Hit);
    let total_wagered: f64 = bets.iter().map(|b| b.stake).sum();
    let total_profit: f64 = bets.iter().map(|b| b.profit).sum();

    let mut value = initial_bankroll;
    let mut peak = initial_bankroll;
    let mut max_drawdown: f64 = 0.0;
    for bet in bets {
        value += bet.profit;
        peak = peak.max(value);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - value) / peak);
        }
    }

    let returns: Vec<f64> = bets
        .iter()
        .filter(|b| b.stake > 0.0)
        .map(|b| b.profit / b.stake)
        .collect();
    let sharpe_ratio = if returns.len() > 1 {
        let avg = mean(&returns);
        let std = (returns.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / returns.len() as f64).sqrt();
        if std > 0.0 { avg / std } else { 0.0 }
    } else {
        0.0
    };

    BacktestMetrics {
        total_bets: bets.len(),
        wins,
        losses: count(LegResult::Miss),
        pushes: count(LegResult::Push),
        hit_rate: ratio(wins, bets.len()),
        total_wagered: round_cents(total_wagered),
        total_profit: round_cents(total_profit),
        roi: if total_wagered > 0.0 {
            total_profit / total_wagered
        } else {
            0.0
        },
        max_drawdown,
        sharpe_ratio,
    }
}
