use crate::analyzers::grade::confidence_status;
use crate::analyzers::types::{ConfidenceLogEntry, PhaseStats, StatusChange};
use crate::output::{append_record, read_records_or_empty};
use anyhow::Result;
use chrono::NaiveDate;
use std::path::Path;
use tracing::{debug, info};

/// Appends one log entry per phase for `date`, skipping phases already
/// logged that day, and reports status changes against each phase's
/// previous entry.
pub fn record_confidence(
    log_path: impl AsRef<Path>,
    stats: &[PhaseStats],
    date: NaiveDate,
) -> Result<Vec<StatusChange>> {
    let log_path = log_path.as_ref();
    let history: Vec<ConfidenceLogEntry> = read_records_or_empty(log_path)?;

    let mut changes = Vec::new();
    for s in stats {
        if history.iter().any(|e| e.date == date && e.phase == s.phase) {
            debug!(phase = %s.phase, %date, "Confidence already logged");
            continue;
        }

        let entry = ConfidenceLogEntry {
            date,
            phase: s.phase,
            total_bets: s.total_bets,
            total_wins: s.total_wins,
            win_rate: s.win_rate,
            confidence_status: confidence_status(s.total_bets, s.win_rate),
        };

        let previous = history
            .iter()
            .filter(|e| e.phase == s.phase && e.date < date)
            .max_by_key(|e| e.date);
        if let Some(prev) = previous {
            if prev.confidence_status != entry.confidence_status {
                let change = StatusChange {
                    phase: s.phase,
                    date,
                    from: prev.confidence_status,
                    to: entry.confidence_status,
                    upgrade: entry.confidence_status > prev.confidence_status,
                };
                info!(
                    phase = %change.phase,
                    from = %change.from,
                    to = %change.to,
                    upgrade = change.upgrade,
                    "Confidence status changed"
                );
                changes.push(change);
            }
        }

        append_record(log_path, &entry)?;
    }

    Ok(changes)
}
