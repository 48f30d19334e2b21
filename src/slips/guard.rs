use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;
use tracing::{error, warn};

use super::Slip;
use crate::error::RaterError;
use crate::output::read_json;
use crate::settle::SlipStatus;

/// Fails with `InsufficientSlips` when fewer than `minimum` slips were
/// produced, unless `bypass` is set.
pub fn enforce_minimum(slips: &[Slip], minimum: usize, bypass: bool) -> Result<(), RaterError> {
    let count = slips.len();
    if count >= minimum {
        return Ok(());
    }
    if bypass {
        warn!(count, minimum, "Guard rail bypassed");
        return Ok(());
    }
    error!(count, minimum, "Guard rail violation");
    Err(RaterError::InsufficientSlips { count, minimum })
}

/// Drops slips whose picks repeat an earlier slip, keeping first occurrences.
pub fn dedupe(slips: Vec<Slip>) -> Vec<Slip> {
    let mut seen = HashSet::new();
    let before = slips.len();
    let kept: Vec<Slip> = slips.into_iter().filter(|s| seen.insert(s.key())).collect();
    if kept.len() < before {
        warn!(removed = before - kept.len(), "Duplicate slips removed");
    }
    kept
}

/// Fails with `DataIntegrity` when the slip file at `path` already holds
/// slips that were placed. A missing file or one with only created slips
/// may be replaced.
pub fn ensure_replaceable(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(());
    }
    let existing: Vec<Slip> = read_json(path)?;
    let placed = existing
        .iter()
        .filter(|s| s.status != SlipStatus::Created)
        .count();
    if placed > 0 {
        error!(path = %path.display(), placed, "Refusing to overwrite placed slips");
        return Err(RaterError::DataIntegrity(format!(
            "{} already holds {placed} placed slip(s)",
            path.display()
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::write_json;
    use crate::settle::Outcome;
    use crate::slips::test_support::{leg, slip};
    use std::env;
    use std::fs;

    fn three() -> Vec<Slip> {
        (1..=3)
            .map(|i| slip(&format!("s{i}"), vec![leg(&i.to_string(), "A", 0.7)], 0.1))
            .collect()
    }

    #[test]
    fn test_minimum_met() {
        assert!(enforce_minimum(&three(), 3, false).is_ok());
    }

    #[test]
    fn test_minimum_violated() {
        let err = enforce_minimum(&three(), 5, false).unwrap_err();
        assert!(matches!(err, RaterError::InsufficientSlips { count: 3, minimum: 5 }));
    }

    #[test]
    fn test_bypass() {
        assert!(enforce_minimum(&[], 5, true).is_ok());
    }

    #[test]
    fn test_dedupe_keeps_first() {
        let mut slips = three();
        let mut copy = slips[0].clone();
        copy.slip_id = "dup".to_string();
        slips.push(copy);

        let kept = dedupe(slips);
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|s| s.slip_id != "dup"));
    }

    #[test]
    fn test_placed_slips_are_not_replaceable() {
        let dir = env::temp_dir().join("prop_rater_guard_replace_test");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("slips_2024-06-01.json");

        assert!(ensure_replaceable(&path).is_ok());

        let drafts = three();
        write_json(&path, &drafts).unwrap();
        assert!(ensure_replaceable(&path).is_ok());

        let mut placed = three();
        placed[0].status = SlipStatus::Pending;
        placed[1].status = SlipStatus::Settled(Outcome::Won);
        write_json(&path, &placed).unwrap();
        let err = ensure_replaceable(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RaterError>(),
            Some(RaterError::DataIntegrity(msg)) if msg.contains("2 placed")
        ));

        fs::remove_dir_all(&dir).unwrap();
    }
}
