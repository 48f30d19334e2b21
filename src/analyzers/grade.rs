use crate::analyzers::types::{ConfidenceStatus, PhaseStats, RiskDivisor, RiskLevel, ThresholdProjection};
use crate::cycle::CyclePhase;
use crate::staking::{DivisorMode, PhaseDivisors};
use std::collections::BTreeMap;

/// Bets a phase needs before its confidence can leave LOW.
pub const PRODUCTION_SAMPLE: usize = 20;
pub const FALLBACK_DIVISOR: f64 = 10.0;

/// Win rates above 1 are read as percentages.
fn as_fraction(win_rate: f64) -> f64 {
    if win_rate > 1.0 { win_rate / 100.0 } else { win_rate }
}

/// Converts a phase track record into a confidence status.
///
/// | Bets | Win rate    | Status |
/// |------|-------------|--------|
/// | < 20 | any         | LOW    |
/// | any  | < 0.60      | LOW    |
/// | >= 20| 0.60..0.70  | MEDIUM |
/// | >= 20| >= 0.70     | HIGH   |
pub fn confidence_status(total_bets: usize, win_rate: f64) -> ConfidenceStatus {
    let win_rate = as_fraction(win_rate);
    match (total_bets, win_rate) {
        (n, w) if n < PRODUCTION_SAMPLE || w < 0.6 => ConfidenceStatus::Low,
        (_, w) if w < 0.7 => ConfidenceStatus::Medium,
        _ => ConfidenceStatus::High,
    }
}

/// Kelly divisor from a phase's win rate and sample size.
///
/// | Win rate | Bets | Divisor | Risk   |
/// |----------|------|---------|--------|
/// | >= 70 %  | >= 4 | 3       | HIGH   |
/// | >= 60 %  | >= 3 | 5       | MEDIUM |
/// | other    |      | 10      | LOW    |
pub fn risk_divisor(stats: &PhaseStats) -> RiskDivisor {
    let win_rate = as_fraction(stats.win_rate);
    let n = stats.total_bets;
    let (divisor, risk) = match (win_rate, n) {
        (w, n) if w >= 0.7 && n >= 4 => (3.0, RiskLevel::High),
        (w, n) if w >= 0.6 && n >= 3 => (5.0, RiskLevel::Medium),
        _ => (FALLBACK_DIVISOR, RiskLevel::Low),
    };
    RiskDivisor {
        phase: stats.phase,
        divisor,
        win_rate,
        sample_size: n,
        risk,
    }
}

/// Divisors for every known phase; phases without history get the fallback.
pub fn risk_divisors(stats: &[PhaseStats]) -> Vec<RiskDivisor> {
    let mut out: Vec<RiskDivisor> = CyclePhase::KNOWN
        .iter()
        .map(|phase| match stats.iter().find(|s| s.phase == *phase) {
            Some(s) => risk_divisor(s),
            None => RiskDivisor {
                phase: *phase,
                divisor: FALLBACK_DIVISOR,
                win_rate: 0.0,
                sample_size: 0,
                risk: RiskLevel::Fallback,
            },
        })
        .collect();
    if let Some(s) = stats.iter().find(|s| s.phase == CyclePhase::Unknown) {
        out.push(risk_divisor(s));
    }
    out
}

/// Static Kelly divisor config built from the computed risk divisors.
pub fn divisor_config(divisors: &[RiskDivisor]) -> PhaseDivisors {
    PhaseDivisors {
        mode: DivisorMode::Static,
        static_divisors: divisors.iter().map(|d| (d.phase, d.divisor)).collect(),
        ..PhaseDivisors::default()
    }
}

/// `ceil((threshold − current) / today)`; zero once reached, `None` with no bets today.
pub fn days_to_threshold(current: usize, today: usize, threshold: usize) -> Option<u64> {
    if current >= threshold {
        return Some(0);
    }
    if today == 0 {
        return None;
    }
    Some((threshold - current).div_ceil(today) as u64)
}

pub fn threshold_projections(
    stats: &[PhaseStats],
    today: &BTreeMap<CyclePhase, usize>,
) -> Vec<ThresholdProjection> {
    stats
        .iter()
        .map(|s| {
            let today_bets = today.get(&s.phase).copied().unwrap_or(0);
            ThresholdProjection {
                phase: s.phase,
                current_bets: s.total_bets,
                today_bets,
                days_to_20: days_to_threshold(s.total_bets, today_bets, 20),
                days_to_30: days_to_threshold(s.total_bets, today_bets, 30),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(phase: CyclePhase, bets: usize, rate: f64) -> PhaseStats {
        PhaseStats {
            phase,
            total_bets: bets,
            total_wins: (bets as f64 * rate).round() as usize,
            win_rate: rate,
            staked: 0.0,
            profit: 0.0,
            roi: 0.0,
        }
    }

    #[test]
    fn test_confidence_status_boundaries() {
        assert_eq!(confidence_status(19, 0.95), ConfidenceStatus::Low);
        assert_eq!(confidence_status(20, 0.59), ConfidenceStatus::Low);
        assert_eq!(confidence_status(20, 0.60), ConfidenceStatus::Medium);
        assert_eq!(confidence_status(50, 0.69), ConfidenceStatus::Medium);
        assert_eq!(confidence_status(20, 0.70), ConfidenceStatus::High);
        // Percentages are accepted
        assert_eq!(confidence_status(25, 72.0), ConfidenceStatus::High);
    }

    #[test]
    fn test_risk_divisor_rules() {
        assert_eq!(risk_divisor(&stats(CyclePhase::Luteal, 4, 0.75)).divisor, 3.0);
        assert_eq!(risk_divisor(&stats(CyclePhase::Luteal, 3, 0.75)).divisor, 5.0);
        assert_eq!(risk_divisor(&stats(CyclePhase::Luteal, 3, 0.6)).risk, RiskLevel::Medium);
        assert_eq!(risk_divisor(&stats(CyclePhase::Luteal, 2, 0.9)).divisor, 10.0);
        assert_eq!(risk_divisor(&stats(CyclePhase::Luteal, 40, 0.55)).risk, RiskLevel::Low);
    }

    #[test]
    fn test_missing_phases_get_fallback() {
        let divisors = risk_divisors(&[stats(CyclePhase::Ovulatory, 10, 0.8)]);
        assert_eq!(divisors.len(), 4);
        let ovulatory = divisors.iter().find(|d| d.phase == CyclePhase::Ovulatory).unwrap();
        assert_eq!(ovulatory.divisor, 3.0);
        let menstrual = divisors.iter().find(|d| d.phase == CyclePhase::Menstrual).unwrap();
        assert_eq!(menstrual.risk, RiskLevel::Fallback);
        assert_eq!(menstrual.divisor, FALLBACK_DIVISOR);
    }

    #[test]
    fn test_divisor_config_round_trips_into_staking() {
        let config = divisor_config(&risk_divisors(&[stats(CyclePhase::Ovulatory, 10, 0.8)]));
        assert_eq!(config.divisor(CyclePhase::Ovulatory, None), 3.0);
        assert_eq!(config.divisor(CyclePhase::Luteal, None), 10.0);
    }

    #[test]
    fn test_days_to_threshold() {
        assert_eq!(days_to_threshold(12, 3, 20), Some(3));
        assert_eq!(days_to_threshold(12, 4, 20), Some(2));
        assert_eq!(days_to_threshold(25, 0, 20), Some(0));
        assert_eq!(days_to_threshold(5, 0, 20), None);
    }

    #[test]
    fn test_threshold_projections_use_today_counts() {
        let today = BTreeMap::from([(CyclePhase::Luteal, 5)]);
        let p = threshold_projections(
            &[stats(CyclePhase::Luteal, 10, 0.6), stats(CyclePhase::Menstrual, 1, 0.0)],
            &today,
        );
        assert_eq!(p[0].days_to_20, Some(2));
        assert_eq!(p[0].days_to_30, Some(4));
        assert_eq!(p[1].days_to_20, None);
    }
}
