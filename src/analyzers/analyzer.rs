use crate::analyzers::aggregate::{aggregate_by_phase, bets_on};
use crate::analyzers::confidence::record_confidence;
use crate::analyzers::grade::{risk_divisors, threshold_projections};
use crate::analyzers::types::PhaseReport;
use crate::output::{read_json, write_json, write_records};
use crate::slips::Slip;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::fs;
use std::path::Path;
use tracing::{info, instrument};

/// Aggregates every slip file under `slip_dir`, writes the per-phase CSV,
/// appends today's confidence log entries and writes `phase_report.json`.
#[instrument(skip_all, fields(slip_dir = %slip_dir.as_ref().display(), %date))]
pub fn analyze(
    slip_dir: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    date: NaiveDate,
) -> Result<PhaseReport> {
    let out_dir = out_dir.as_ref();
    let slips = load_slip_dir(slip_dir)?;

    let phases = aggregate_by_phase(&slips);
    write_records(out_dir.join("backtest_by_phase.csv"), &phases)?;

    let changes = record_confidence(out_dir.join("phase_confidence_log.csv"), &phases, date)?;
    let divisors = risk_divisors(&phases);
    let projections = threshold_projections(&phases, &bets_on(&slips, date));

    let report = PhaseReport {
        generated_at: Utc::now(),
        date,
        phases,
        divisors,
        changes,
        projections,
    };
    write_json(out_dir.join("phase_report.json"), &report)?;

    info!(slips = slips.len(), phases = report.phases.len(), "Phase report written");
    Ok(report)
}

/// Reads all `slips_*.json` files in `dir`, in file name order.
pub fn load_slip_dir(dir: impl AsRef<Path>) -> Result<Vec<Slip>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_slip_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("slips_") && n.ends_with(".json"));
        if is_slip_file {
            files.push(path);
        }
    }
    files.sort();

    let mut slips = Vec::new();
    for path in files {
        let mut batch: Vec<Slip> = read_json(&path)?;
        slips.append(&mut batch);
    }
    Ok(slips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::CyclePhase;
    use crate::settle::{Outcome, SlipStatus};
    use crate::slips::test_support::{leg, slip};
    use std::env;

    #[test]
    fn test_analyze_writes_outputs() {
        let root = env::temp_dir().join("prop_rater_analyze_test");
        let _ = fs::remove_dir_all(&root);
        let slip_dir = root.join("slips");

        let mut l = leg("1", "A", 0.7);
        l.phase = CyclePhase::Follicular;
        let mut won = slip("POWER_20240601_001", vec![l], 0.2);
        won.status = SlipStatus::Settled(Outcome::Won);
        won.stake = 10.0;
        won.profit = Some(90.0);
        write_json(slip_dir.join("slips_2024-06-01.json"), &vec![won]).unwrap();
        // Not a slip file
        write_json(slip_dir.join("other.json"), &vec![1, 2, 3]).unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let report = analyze(&slip_dir, &root, date).unwrap();

        assert_eq!(report.phases.len(), 1);
        assert_eq!(report.phases[0].total_wins, 1);
        assert_eq!(report.divisors.len(), 4);
        assert!(root.join("backtest_by_phase.csv").exists());
        assert!(root.join("phase_confidence_log.csv").exists());
        assert!(root.join("phase_report.json").exists());

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_missing_slip_dir_is_empty() {
        let dir = env::temp_dir().join("prop_rater_no_such_slip_dir");
        assert!(load_slip_dir(&dir).unwrap().is_empty());
    }
}
