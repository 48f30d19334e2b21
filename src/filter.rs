//! Alternate-line filter.
//!
//! Boards post "demon" (raised) and "goblin" (lowered) variants next to the
//! standard line for the same player and stat. Only the standard line is
//! priced at the normal payout, so everything else is dropped before slips are
//! built. When the board labels variants explicitly we trust the label;
//! otherwise the variant is inferred from the spread of lines.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::projection::Projection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineVariant {
    Goblin,
    Standard,
    Demon,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct FilterReport {
    pub input: usize,
    pub kept: usize,
    pub demons: usize,
    pub goblins: usize,
}

#[derive(Debug, Clone)]
pub struct AnomalyFilter {
    /// Percentage spread between two lines beyond which they are treated as
    /// a standard/alternate pair rather than two standard lines.
    pub tolerance_pct: f64,
}

impl Default for AnomalyFilter {
    fn default() -> Self {
        Self { tolerance_pct: 15.0 }
    }
}

fn spread_pct(lo: f64, hi: f64) -> f64 {
    if lo <= 0.0 {
        if hi > lo { f64::INFINITY } else { 0.0 }
    } else {
        (hi - lo).abs() / lo * 100.0
    }
}

fn group_by_player_stat(projections: Vec<Projection>) -> Vec<Vec<Projection>> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), Vec<Projection>> = HashMap::new();

    for p in projections {
        let key = (p.player.clone(), p.prop_type.clone());
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(p);
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect()
}

fn labelled(p: &Projection) -> Option<LineVariant> {
    match p.odds_type.as_deref()?.to_ascii_lowercase().as_str() {
        "standard" => Some(LineVariant::Standard),
        "demon" => Some(LineVariant::Demon),
        "goblin" => Some(LineVariant::Goblin),
        _ => None,
    }
}

impl AnomalyFilter {
    pub fn new(tolerance_pct: f64) -> Self {
        Self { tolerance_pct }
    }

    /// Keeps only standard lines, preserving first-seen group order.
    pub fn filter(&self, projections: Vec<Projection>) -> (Vec<Projection>, FilterReport) {
        let mut report = FilterReport {
            input: projections.len(),
            ..Default::default()
        };
        let mut kept = Vec::with_capacity(projections.len());

        for mut group in group_by_player_stat(projections) {
            if group.len() == 1 {
                kept.append(&mut group);
                continue;
            }

            if group.iter().any(|p| labelled(p) == Some(LineVariant::Standard)) {
                for p in group {
                    match labelled(&p) {
                        Some(LineVariant::Demon) => report.demons += 1,
                        Some(LineVariant::Goblin) => report.goblins += 1,
                        _ => kept.push(p),
                    }
                }
                continue;
            }

            group.sort_by(|a, b| a.line.total_cmp(&b.line));

            if group.len() == 2 {
                if spread_pct(group[0].line, group[1].line) > self.tolerance_pct {
                    debug!(
                        player = %group[0].player,
                        prop_type = %group[0].prop_type,
                        kept = group[0].line,
                        dropped = group[1].line,
                        "Dropping probable demon line"
                    );
                    group.truncate(1);
                    report.demons += 1;
                }
                kept.append(&mut group);
            } else {
                let mid = group.len() / 2;
                report.goblins += mid;
                report.demons += group.len() - mid - 1;
                debug!(
                    player = %group[mid].player,
                    prop_type = %group[mid].prop_type,
                    kept = group[mid].line,
                    "Keeping median line of alternate group"
                );
                kept.push(group.swap_remove(mid));
            }
        }

        report.kept = kept.len();
        info!(
            input = report.input,
            kept = report.kept,
            demons = report.demons,
            goblins = report.goblins,
            "Alternate lines filtered"
        );
        (kept, report)
    }

    /// Labels each projection of a single player/stat group.
    pub fn classify(&self, group: &[Projection]) -> Vec<(String, LineVariant)> {
        if group.len() < 2 {
            return group
                .iter()
                .map(|p| (p.projection_id.clone(), LineVariant::Standard))
                .collect();
        }

        let mut sorted: Vec<&Projection> = group.iter().collect();
        sorted.sort_by(|a, b| a.line.total_cmp(&b.line));

        if sorted.len() == 2 {
            let alternate = spread_pct(sorted[0].line, sorted[1].line) > self.tolerance_pct;
            let (lo, hi) = if alternate {
                (LineVariant::Goblin, LineVariant::Demon)
            } else {
                (LineVariant::Standard, LineVariant::Standard)
            };
            return vec![
                (sorted[0].projection_id.clone(), lo),
                (sorted[1].projection_id.clone(), hi),
            ];
        }

        let last = sorted.len() - 1;
        sorted
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let variant = match i {
                    0 => LineVariant::Goblin,
                    i if i == last => LineVariant::Demon,
                    _ => LineVariant::Standard,
                };
                (p.projection_id.clone(), variant)
            })
            .collect()
    }
}
