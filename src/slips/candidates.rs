use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::{Leg, Side};
use crate::analyzers::utility::normal_cdf;
use crate::cycle::CycleTracker;
use crate::features::GameLogIndex;
use crate::mapping::{PlayerMapping, lookup, normalize_name};
use crate::projection::Projection;

pub const SAME_PLAYER_CORRELATION: f64 = 0.8;
pub const SAME_GAME_CORRELATION: f64 = 0.5;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CandidateReport {
    pub considered: usize,
    pub combo_skipped: usize,
    pub no_history: usize,
    pub below_threshold: usize,
    pub accepted: usize,
}

/// Turns projections into priced legs using recent form and cycle modifiers.
pub struct CandidateBuilder<'a> {
    index: &'a GameLogIndex,
    mappings: &'a [PlayerMapping],
    tracker: &'a CycleTracker,
    pub recent_games: usize,
    pub min_games: usize,
    pub confidence_threshold: f64,
}

impl<'a> CandidateBuilder<'a> {
    pub fn new(
        index: &'a GameLogIndex,
        mappings: &'a [PlayerMapping],
        tracker: &'a CycleTracker,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            index,
            mappings,
            tracker,
            recent_games: 10,
            min_games: 3,
            confidence_threshold,
        }
    }

    /// Probability that the over hits, from the cycle-adjusted recent mean
    /// against the line under a normal model.
    fn over_probability(mean: f64, std: Option<f64>, modifier: f64, line: f64) -> f64 {
        let projected = mean * modifier;
        let sigma = std
            .filter(|s| *s > 0.0)
            .unwrap_or_else(|| (projected.abs() * 0.25).max(1.0));
        normal_cdf((projected - line) / sigma)
    }

    #[instrument(skip_all, fields(projections = projections.len(), %date))]
    pub fn build(&self, projections: &[Projection], date: NaiveDate) -> (Vec<Leg>, CandidateReport) {
        let mut report = CandidateReport::default();
        let mut legs = Vec::new();

        for p in projections {
            report.considered += 1;
            if p.is_combo() {
                report.combo_skipped += 1;
                continue;
            }

            let stats_id = lookup(self.mappings, &p.player);
            let form = match self.index.recent_form(stats_id, &p.player, &p.prop_type, self.recent_games, Some(date)) {
                Some(f) if f.games >= self.min_games => f,
                _ => {
                    debug!(player = %p.player, prop = %p.prop_type, "Not enough history");
                    report.no_history += 1;
                    continue;
                }
            };

            let cycle_key = stats_id.unwrap_or(&p.player);
            let modifier = self.tracker.prop_modifier(cycle_key, date, &p.prop_type);
            let phase = self.tracker.phase_on(cycle_key, date);

            let p_over = Self::over_probability(form.mean, form.std, modifier, p.line);
            let (side, probability) = if p_over >= 0.5 {
                (Side::Over, p_over)
            } else {
                (Side::Under, 1.0 - p_over)
            };

            if probability < self.confidence_threshold {
                report.below_threshold += 1;
                continue;
            }

            report.accepted += 1;
            legs.push(Leg {
                prop_id: p.projection_id.clone(),
                player: p.player.clone(),
                stats_id: stats_id.map(str::to_string),
                prop_type: p.prop_type.clone(),
                line: p.line,
                side,
                probability,
                game_id: p.game_id.clone(),
                phase,
            });
        }

        info!(
            considered = report.considered,
            accepted = report.accepted,
            no_history = report.no_history,
            below_threshold = report.below_threshold,
            "Candidates built"
        );
        (legs, report)
    }
}

/// Pairwise correlation proxy: same player 0.8, same game 0.5, else 0.
pub fn correlation(a: &Leg, b: &Leg) -> f64 {
    if normalize_name(&a.player) == normalize_name(&b.player) {
        return SAME_PLAYER_CORRELATION;
    }
    match (&a.game_id, &b.game_id) {
        (Some(x), Some(y)) if x == y => SAME_GAME_CORRELATION,
        _ => 0.0,
    }
}

/// Greedy pick of straight bets, strongest first, dropping any leg whose
/// correlation with an already selected leg exceeds `threshold`.
pub fn correlation_filter(mut legs: Vec<Leg>, threshold: f64) -> Vec<Leg> {
    legs.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    let mut selected: Vec<Leg> = Vec::new();
    for leg in legs {
        if selected.iter().all(|s| correlation(s, &leg) <= threshold) {
            selected.push(leg);
        }
    }
    selected
}
