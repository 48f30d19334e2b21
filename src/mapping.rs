//! Fuzzy association between board player names and a statistics source's
//! player identifiers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use strsim::normalized_levenshtein;
use tracing::{debug, info, warn};

use crate::projection::split_combo;

/// A player row from the statistics source (e.g. a season roster export).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterPlayer {
    pub stats_id: String,
    pub name: String,
}

/// One persisted mapping row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerMapping {
    pub source_name: String,
    pub stats_id: Option<String>,
    pub stats_name: Option<String>,
    pub confidence_score: f64,
    pub mapping_date: NaiveDate,
    pub auto_mapped: bool,
}

impl PlayerMapping {
    pub fn is_resolved(&self) -> bool {
        self.stats_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub stats_id: String,
    pub stats_name: String,
    pub score: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct MappingReport {
    pub considered: usize,
    pub already_mapped: usize,
    pub auto_mapped: usize,
    pub needs_review: usize,
}

/// Lowercases, strips punctuation and collapses whitespace.
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// "First Middle Last" → "Last, First Middle".
pub fn last_first(name: &str) -> String {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{}, {}", last, rest.join(" ")),
        _ => name.to_string(),
    }
}

/// Edit-distance similarity on a 0–100 scale.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(a, b) * 100.0
}

fn sorted_tokens(s: &str) -> BTreeSet<String> {
    normalize_name(s)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn join(tokens: impl IntoIterator<Item = String>) -> String {
    tokens.into_iter().collect::<Vec<_>>().join(" ")
}

/// Similarity after sorting tokens, so word order does not matter.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&join(sorted_tokens(a)), &join(sorted_tokens(b)))
}

/// Similarity of the shared tokens against each side's full token set, so
/// extra middle names or suffixes do not sink the score.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta = sorted_tokens(a);
    let tb = sorted_tokens(b);

    let common = join(ta.intersection(&tb).cloned());
    let only_a = join(ta.difference(&tb).cloned());
    let only_b = join(tb.difference(&ta).cloned());

    let combined = |extra: &str| match (common.is_empty(), extra.is_empty()) {
        (true, _) => extra.to_string(),
        (false, true) => common.clone(),
        (false, false) => format!("{common} {extra}"),
    };
    let full_a = combined(&only_a);
    let full_b = combined(&only_b);

    let mut best = ratio(&full_a, &full_b);
    if !common.is_empty() {
        best = best.max(ratio(&common, &full_a)).max(ratio(&common, &full_b));
    }
    best
}

#[derive(Debug, Clone)]
struct IndexedPlayer {
    stats_id: String,
    full_name: String,
    last_first: String,
    normalized: String,
}

pub struct PlayerMapper {
    /// Minimum score (0–100) for a match to be accepted without review.
    pub threshold: f64,
    roster: Vec<IndexedPlayer>,
}

impl PlayerMapper {
    pub fn new(roster: &[RosterPlayer], threshold: f64) -> Self {
        let roster = roster
            .iter()
            .map(|p| IndexedPlayer {
                stats_id: p.stats_id.clone(),
                full_name: p.name.clone(),
                last_first: last_first(&p.name),
                normalized: normalize_name(&p.name),
            })
            .collect();
        Self { threshold, roster }
    }

    /// Highest-scoring roster entry across all matching strategies.
    pub fn best_match(&self, name: &str) -> Option<MatchCandidate> {
        let normalized = normalize_name(name);
        let mut best: Option<MatchCandidate> = None;

        for player in &self.roster {
            let score = [
                ratio(name, &player.full_name),
                ratio(name, &player.last_first),
                ratio(&normalized, &player.normalized),
                token_sort_ratio(name, &player.full_name),
                token_set_ratio(name, &player.full_name),
            ]
            .into_iter()
            .fold(0.0, f64::max);

            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(MatchCandidate {
                    stats_id: player.stats_id.clone(),
                    stats_name: player.full_name.clone(),
                    score,
                });
            }
        }

        best
    }

    /// Adds mapping rows for board names not yet resolved in `existing`.
    ///
    /// Combo names are split into their players. Resolved rows are carried
    /// over untouched; unresolved rows are retried and replaced.
    pub fn map_new_players(
        &self,
        board_names: &[String],
        existing: Vec<PlayerMapping>,
        today: NaiveDate,
    ) -> (Vec<PlayerMapping>, MappingReport) {
        let mut report = MappingReport::default();

        let mut rows: Vec<PlayerMapping> = Vec::with_capacity(existing.len());
        let mut index: HashMap<String, usize> = HashMap::new();
        for row in existing {
            if index.contains_key(&row.source_name) {
                warn!(name = %row.source_name, "Duplicate mapping row, keeping first");
                continue;
            }
            index.insert(row.source_name.clone(), rows.len());
            rows.push(row);
        }

        let names: BTreeSet<&str> = board_names
            .iter()
            .flat_map(|n| split_combo(n))
            .collect();

        for name in names {
            report.considered += 1;

            if let Some(&i) = index.get(name) {
                if rows[i].is_resolved() {
                    report.already_mapped += 1;
                    continue;
                }
            }

            let row = match self.best_match(name) {
                Some(m) if m.score >= self.threshold => {
                    debug!(name, stats_id = %m.stats_id, score = m.score, "Auto-mapped player");
                    report.auto_mapped += 1;
                    PlayerMapping {
                        source_name: name.to_string(),
                        stats_id: Some(m.stats_id),
                        stats_name: Some(m.stats_name),
                        confidence_score: round1(m.score),
                        mapping_date: today,
                        auto_mapped: true,
                    }
                }
                candidate => {
                    let score = candidate.as_ref().map(|m| m.score).unwrap_or(0.0);
                    warn!(
                        name,
                        best = candidate.as_ref().map(|m| m.stats_name.as_str()).unwrap_or(""),
                        score,
                        "No confident match, needs review"
                    );
                    report.needs_review += 1;
                    PlayerMapping {
                        source_name: name.to_string(),
                        stats_id: None,
                        stats_name: candidate.map(|m| m.stats_name),
                        confidence_score: round1(score),
                        mapping_date: today,
                        auto_mapped: false,
                    }
                }
            };

            match index.get(name) {
                Some(&i) => rows[i] = row,
                None => {
                    index.insert(name.to_string(), rows.len());
                    rows.push(row);
                }
            }
        }

        info!(
            considered = report.considered,
            already_mapped = report.already_mapped,
            auto_mapped = report.auto_mapped,
            needs_review = report.needs_review,
            "Player mapping complete"
        );
        (rows, report)
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Looks up a stats id by board name from a mapping table.
pub fn lookup<'a>(mappings: &'a [PlayerMapping], source_name: &str) -> Option<&'a str> {
    mappings
        .iter()
        .find(|m| m.source_name == source_name)
        .and_then(|m| m.stats_id.as_deref())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<RosterPlayer> {
        vec![
            RosterPlayer {
                stats_id: "wilsoaj01w".into(),
                name: "A'ja Wilson".into(),
            },
            RosterPlayer {
                stats_id: "clarkca02w".into(),
                name: "Caitlin Clark".into(),
            },
            RosterPlayer {
                stats_id: "plumke01w".into(),
                name: "Kelsey Plum".into(),
            },
        ]
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  A'ja   WILSON "), "aja wilson");
        assert_eq!(normalize_name("D.J. Carton Jr."), "dj carton jr");
    }

    #[test]
    fn test_last_first() {
        assert_eq!(last_first("Caitlin Clark"), "Clark, Caitlin");
        assert_eq!(last_first("Mary Ellen Smith"), "Smith, Mary Ellen");
        assert_eq!(last_first("Cher"), "Cher");
    }

    #[test]
    fn test_ratio_bounds() {
        assert_eq!(ratio("abc", "abc"), 100.0);
        assert_eq!(ratio("", ""), 0.0);
        assert!(ratio("abc", "xyz") < 1.0);
    }

    #[test]
    fn test_token_sort_ignores_order() {
        assert_eq!(token_sort_ratio("Clark Caitlin", "Caitlin Clark"), 100.0);
    }

    #[test]
    fn test_token_set_ignores_extra_tokens() {
        assert_eq!(token_set_ratio("Caitlin Clark", "Caitlin Elizabeth Clark"), 100.0);
        assert!(token_set_ratio("Caitlin Clark", "Kelsey Plum") < 50.0);
    }

    #[test]
    fn test_best_match_punctuation_variant() {
        let mapper = PlayerMapper::new(&roster(), 85.0);
        let m = mapper.best_match("Aja Wilson").unwrap();
        assert_eq!(m.stats_id, "wilsoaj01w");
        assert!(m.score >= 85.0);
    }

    #[test]
    fn test_map_new_players_splits_combos_and_keeps_existing() {
        let mapper = PlayerMapper::new(&roster(), 85.0);
        let existing = vec![PlayerMapping {
            source_name: "Caitlin Clark".into(),
            stats_id: Some("clarkca02w".into()),
            stats_name: Some("Caitlin Clark".into()),
            confidence_score: 100.0,
            mapping_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            auto_mapped: false,
        }];
        let names = vec![
            "Caitlin Clark".to_string(),
            "A'ja Wilson + Kelsey Plum".to_string(),
            "Zzyzx Qwerty".to_string(),
        ];

        let (rows, report) = mapper.map_new_players(&names, existing, day());

        assert_eq!(report.considered, 4);
        assert_eq!(report.already_mapped, 1);
        assert_eq!(report.auto_mapped, 2);
        assert_eq!(report.needs_review, 1);
        assert_eq!(rows.len(), 4);

        assert_eq!(lookup(&rows, "Kelsey Plum"), Some("plumke01w"));
        assert_eq!(lookup(&rows, "Zzyzx Qwerty"), None);
        let clark = rows.iter().find(|r| r.source_name == "Caitlin Clark").unwrap();
        assert_eq!(clark.mapping_date, NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
    }

    #[test]
    fn test_unresolved_rows_are_retried() {
        let mapper = PlayerMapper::new(&roster(), 85.0);
        let existing = vec![PlayerMapping {
            source_name: "Kelsey Plum".into(),
            stats_id: None,
            stats_name: None,
            confidence_score: 0.0,
            mapping_date: day(),
            auto_mapped: false,
        }];
        let (rows, report) = mapper.map_new_players(&["Kelsey Plum".to_string()], existing, day());
        assert_eq!(rows.len(), 1);
        assert_eq!(report.auto_mapped, 1);
        assert!(rows[0].is_resolved());
    }
}
