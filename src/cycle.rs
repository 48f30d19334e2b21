//! Cycle-phase tracking and the performance modifiers derived from it.
//!
//! Entries are keyed by an anonymised player id. The modifier for a date is
//! taken from the most recent entry on or before that date, weighted by the
//! entry's confidence, and falls back to neutral once the entry is stale.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RaterError;
use crate::features::{Stat, prop_stats};
use crate::output::{read_json, write_json};

/// Entries older than this many days no longer inform the modifier.
pub const STALE_AFTER_DAYS: i64 = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Follicular,
    Ovulatory,
    Luteal,
    Menstrual,
    Unknown,
}

impl CyclePhase {
    pub const KNOWN: [CyclePhase; 4] = [
        CyclePhase::Follicular,
        CyclePhase::Ovulatory,
        CyclePhase::Luteal,
        CyclePhase::Menstrual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CyclePhase::Follicular => "follicular",
            CyclePhase::Ovulatory => "ovulatory",
            CyclePhase::Luteal => "luteal",
            CyclePhase::Menstrual => "menstrual",
            CyclePhase::Unknown => "unknown",
        }
    }

    /// Baseline performance multiplier for the phase.
    pub fn base_modifier(self) -> f64 {
        match self {
            CyclePhase::Follicular => 1.05,
            CyclePhase::Ovulatory => 1.10,
            CyclePhase::Luteal => 0.95,
            CyclePhase::Menstrual => 0.90,
            CyclePhase::Unknown => 1.0,
        }
    }

    /// Stat-specific multiplier, falling back to the phase baseline.
    pub fn stat_modifier(self, stat: Stat) -> f64 {
        use CyclePhase::*;
        match (self, stat) {
            (Follicular, Stat::Pts) => 1.03,
            (Follicular, Stat::Reb) => 1.05,
            (Follicular, Stat::Ast) => 1.04,
            (Follicular, Stat::Stl) => 1.06,
            (Follicular, Stat::Blk) => 1.02,
            (Ovulatory, Stat::Pts) => 1.08,
            (Ovulatory, Stat::Reb) => 1.10,
            (Ovulatory, Stat::Ast) => 1.12,
            (Ovulatory, Stat::Stl) => 1.15,
            (Ovulatory, Stat::Blk) => 1.08,
            (Luteal, Stat::Pts) => 0.96,
            (Luteal, Stat::Reb) => 0.94,
            (Luteal, Stat::Ast) => 0.95,
            (Luteal, Stat::Stl) => 0.93,
            (Luteal, Stat::Blk) => 0.95,
            (Menstrual, Stat::Pts) => 0.92,
            (Menstrual, Stat::Reb) => 0.88,
            (Menstrual, Stat::Ast) => 0.90,
            (Menstrual, Stat::Stl) => 0.87,
            (Menstrual, Stat::Blk) => 0.89,
            (phase, _) => phase.base_modifier(),
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CyclePhase {
    type Err = RaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "follicular" => Ok(CyclePhase::Follicular),
            "ovulatory" => Ok(CyclePhase::Ovulatory),
            "luteal" => Ok(CyclePhase::Luteal),
            "menstrual" => Ok(CyclePhase::Menstrual),
            "unknown" | "" => Ok(CyclePhase::Unknown),
            other => Err(RaterError::InvalidConfig(format!("unknown cycle phase '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    UserInput,
    Predicted,
    Imported,
    TestFixture,
}

fn default_confidence() -> f64 {
    1.0
}

fn default_source() -> DataSource {
    DataSource::UserInput
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleEntry {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub player_id: String,
    pub date: NaiveDate,
    pub cycle_phase: CyclePhase,
    #[serde(default)]
    pub cycle_day: Option<u8>,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
    #[serde(default = "default_source")]
    pub source: DataSource,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl CycleEntry {
    pub fn new(player_id: &str, date: NaiveDate, phase: CyclePhase, confidence: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            player_id: player_id.to_string(),
            date,
            cycle_phase: phase,
            cycle_day: None,
            confidence_score: confidence,
            source: DataSource::UserInput,
            created_at: now,
            updated_at: now,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(format!("confidence {} outside 0..=1", self.confidence_score));
        }
        if self.cycle_phase == CyclePhase::Unknown {
            return Err("phase must be known".to_string());
        }
        if self.player_id.trim().is_empty() {
            return Err("empty player id".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub ingested: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

/// The phase in effect for a player on a date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseReading {
    pub phase: CyclePhase,
    pub confidence: f64,
    pub age_days: i64,
}

#[derive(Debug, Default)]
pub struct CycleTracker {
    entries: BTreeMap<String, Vec<CycleEntry>>,
}

impl CycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds entries, skipping duplicates (same player and date) and invalid rows.
    pub fn ingest(&mut self, entries: impl IntoIterator<Item = CycleEntry>) -> IngestReport {
        let mut report = IngestReport::default();

        for entry in entries {
            if let Err(reason) = entry.validate() {
                warn!(player_id = %entry.player_id, date = %entry.date, reason = %reason, "Rejecting cycle entry");
                report.invalid += 1;
                continue;
            }

            let list = self.entries.entry(entry.player_id.clone()).or_default();
            if list.iter().any(|e| e.date == entry.date) {
                debug!(player_id = %entry.player_id, date = %entry.date, "Duplicate cycle entry skipped");
                report.duplicates += 1;
                continue;
            }
            list.push(entry);
            report.ingested += 1;
        }

        for list in self.entries.values_mut() {
            list.sort_by_key(|e| e.date);
        }

        info!(
            ingested = report.ingested,
            duplicates = report.duplicates,
            invalid = report.invalid,
            "Cycle data ingested"
        );
        report
    }

    pub fn player_count(&self) -> usize {
        self.entries.len()
    }

    /// Latest non-stale reading on or before `date`.
    pub fn reading(&self, player_id: &str, date: NaiveDate) -> Option<PhaseReading> {
        let latest = self
            .entries
            .get(player_id)?
            .iter()
            .rev()
            .find(|e| e.date <= date)?;

        let age_days = (date - latest.date).num_days();
        if age_days > STALE_AFTER_DAYS {
            return None;
        }
        Some(PhaseReading {
            phase: latest.cycle_phase,
            confidence: latest.confidence_score,
            age_days,
        })
    }

    pub fn phase_on(&self, player_id: &str, date: NaiveDate) -> CyclePhase {
        self.reading(player_id, date)
            .map(|r| r.phase)
            .unwrap_or(CyclePhase::Unknown)
    }

    /// Confidence-weighted multiplier: `1 + (base − 1) × confidence`.
    pub fn phase_modifier(&self, player_id: &str, date: NaiveDate) -> f64 {
        match self.reading(player_id, date) {
            Some(r) => 1.0 + (r.phase.base_modifier() - 1.0) * r.confidence,
            None => 1.0,
        }
    }

    /// Like [`phase_modifier`](Self::phase_modifier) but using the per-stat
    /// table; combo props average their component stats.
    pub fn prop_modifier(&self, player_id: &str, date: NaiveDate, prop_type: &str) -> f64 {
        let Some(r) = self.reading(player_id, date) else {
            return 1.0;
        };
        let base = match prop_stats(prop_type) {
            Some(stats) if !stats.is_empty() => {
                stats.iter().map(|s| r.phase.stat_modifier(*s)).sum::<f64>() / stats.len() as f64
            }
            _ => r.phase.base_modifier(),
        };
        1.0 + (base - 1.0) * r.confidence
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path, &self.entries)
    }

    /// Loads a tracker from disk; a missing file yields an empty tracker.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No cycle data found, starting empty");
            return Ok(Self::new());
        }
        let entries: BTreeMap<String, Vec<CycleEntry>> = read_json(path)?;
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    #[test]
    fn test_no_data_is_neutral() {
        let tracker = CycleTracker::new();
        assert_eq!(tracker.phase_modifier("p1", d(10)), 1.0);
        assert_eq!(tracker.phase_on("p1", d(10)), CyclePhase::Unknown);
    }

    #[test]
    fn test_modifier_weighted_by_confidence() {
        let mut tracker = CycleTracker::new();
        tracker.ingest([CycleEntry::new("p1", d(1), CyclePhase::Ovulatory, 0.5)]);
        let m = tracker.phase_modifier("p1", d(3));
        assert!((m - 1.05).abs() < 1e-12);
    }

    #[test]
    fn test_uses_latest_entry_on_or_before_date() {
        let mut tracker = CycleTracker::new();
        tracker.ingest([
            CycleEntry::new("p1", d(10), CyclePhase::Luteal, 1.0),
            CycleEntry::new("p1", d(1), CyclePhase::Follicular, 1.0),
        ]);
        assert_eq!(tracker.phase_on("p1", d(5)), CyclePhase::Follicular);
        assert_eq!(tracker.phase_on("p1", d(10)), CyclePhase::Luteal);
        assert!((tracker.phase_modifier("p1", d(12)) - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_future_only_entries_are_neutral() {
        let mut tracker = CycleTracker::new();
        tracker.ingest([CycleEntry::new("p1", d(20), CyclePhase::Menstrual, 1.0)]);
        assert_eq!(tracker.phase_modifier("p1", d(10)), 1.0);
    }

    #[test]
    fn test_stale_entries_are_neutral() {
        let mut tracker = CycleTracker::new();
        tracker.ingest([CycleEntry::new("p1", d(1), CyclePhase::Menstrual, 1.0)]);
        let day_35 = d(1) + chrono::Duration::days(35);
        let day_36 = d(1) + chrono::Duration::days(36);
        assert!((tracker.phase_modifier("p1", day_35) - 0.90).abs() < 1e-12);
        assert_eq!(tracker.phase_modifier("p1", day_36), 1.0);
    }

    #[test]
    fn test_duplicates_and_invalid_rejected() {
        let mut tracker = CycleTracker::new();
        let report = tracker.ingest([
            CycleEntry::new("p1", d(1), CyclePhase::Luteal, 1.0),
            CycleEntry::new("p1", d(1), CyclePhase::Menstrual, 1.0),
            CycleEntry::new("p2", d(1), CyclePhase::Luteal, 1.7),
            CycleEntry::new("p3", d(1), CyclePhase::Unknown, 1.0),
        ]);
        assert_eq!(report.ingested, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.invalid, 2);
        assert_eq!(tracker.phase_on("p1", d(1)), CyclePhase::Luteal);
    }

    #[test]
    fn test_prop_modifier_uses_stat_table() {
        let mut tracker = CycleTracker::new();
        tracker.ingest([CycleEntry::new("p1", d(1), CyclePhase::Ovulatory, 1.0)]);
        assert!((tracker.prop_modifier("p1", d(1), "Steals") - 1.15).abs() < 1e-12);
        assert!((tracker.prop_modifier("p1", d(1), "Pts+Asts") - 1.10).abs() < 1e-12);
        assert!((tracker.prop_modifier("p1", d(1), "Fantasy Score") - 1.10).abs() < 1e-12);
    }

    #[test]
    fn test_entry_json_defaults() {
        let json = r#"{"player_id": "p9", "date": "2025-06-02", "cycle_phase": "luteal"}"#;
        let entry: CycleEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.confidence_score, 1.0);
        assert_eq!(entry.source, DataSource::UserInput);
        assert_eq!(entry.cycle_day, None);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join("prop_rater_cycle_test.json");
        let mut tracker = CycleTracker::new();
        tracker.ingest([CycleEntry::new("p1", d(1), CyclePhase::Luteal, 0.8)]);
        tracker.save(&path).unwrap();

        let loaded = CycleTracker::load(&path).unwrap();
        assert_eq!(loaded.player_count(), 1);
        assert_eq!(loaded.phase_on("p1", d(2)), CyclePhase::Luteal);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!("Luteal".parse::<CyclePhase>().unwrap(), CyclePhase::Luteal);
        assert!("peak".parse::<CyclePhase>().is_err());
    }
}
