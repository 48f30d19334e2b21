use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use super::TicketType;
use crate::error::RaterError;

pub const MIN_LEGS: usize = 3;
pub const MAX_LEGS: usize = 6;

/// Payout multipliers. Power keys are leg counts; flex keys are `"{hits}_of_{legs}"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutTables {
    pub power: BTreeMap<usize, f64>,
    pub flex: BTreeMap<String, f64>,
}

impl Default for PayoutTables {
    fn default() -> Self {
        Self {
            power: BTreeMap::from([(3, 10.0), (4, 20.0), (5, 40.0), (6, 100.0)]),
            flex: BTreeMap::from([
                ("3_of_3".to_string(), 5.0),
                ("3_of_4".to_string(), 2.5),
                ("4_of_4".to_string(), 10.0),
                ("4_of_5".to_string(), 4.0),
                ("5_of_5".to_string(), 20.0),
                ("5_of_6".to_string(), 10.0),
                ("6_of_6".to_string(), 40.0),
            ]),
        }
    }
}

fn flex_key(hits: usize, legs: usize) -> String {
    format!("{hits}_of_{legs}")
}

impl PayoutTables {
    pub fn from_json(bytes: &[u8]) -> Result<Self, RaterError> {
        let tables: PayoutTables = serde_json::from_slice(bytes)
            .map_err(|e| RaterError::InvalidConfig(format!("payout tables: {e}")))?;

        let negative = tables
            .power
            .values()
            .chain(tables.flex.values())
            .any(|m| !(*m >= 0.0));
        if negative {
            return Err(RaterError::InvalidConfig(
                "payout multipliers must be non-negative".to_string(),
            ));
        }
        Ok(tables)
    }

    /// Loads from `path`, falling back to defaults when the file is absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Payout tables not found, using defaults");
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)?;
        Ok(Self::from_json(&bytes)?)
    }

    pub fn power_payout(&self, legs: usize) -> f64 {
        self.power.get(&legs).copied().unwrap_or(0.0)
    }

    pub fn flex_payout(&self, hits: usize, legs: usize) -> f64 {
        self.flex.get(&flex_key(hits, legs)).copied().unwrap_or(0.0)
    }

    /// Multiplier paid for `hits` correct picks out of `legs`.
    pub fn payout(&self, ticket: TicketType, hits: usize, legs: usize) -> f64 {
        match ticket {
            TicketType::Power if hits == legs => self.power_payout(legs),
            TicketType::Power => 0.0,
            TicketType::Flex => self.flex_payout(hits, legs),
        }
    }

    /// `P(all hit) × payout − 1`; −1 outside the supported slip sizes.
    pub fn power_ev(&self, probs: &[f64]) -> f64 {
        if !(MIN_LEGS..=MAX_LEGS).contains(&probs.len()) {
            return -1.0;
        }
        let all_hit: f64 = probs.iter().product();
        self.power_payout(probs.len()) * all_hit - 1.0
    }

    /// Sum over payout tiers of `P(exactly k hits) × payout − 1`.
    pub fn flex_ev(&self, probs: &[f64]) -> f64 {
        let n = probs.len();
        if !(MIN_LEGS..=MAX_LEGS).contains(&n) {
            return -1.0;
        }
        let dist = hit_distribution(probs);
        let expected: f64 = dist
            .iter()
            .enumerate()
            .map(|(k, p)| self.flex_payout(k, n) * p)
            .sum();
        expected - 1.0
    }

    pub fn ev(&self, ticket: TicketType, probs: &[f64]) -> f64 {
        match ticket {
            TicketType::Power => self.power_ev(probs),
            TicketType::Flex => self.flex_ev(probs),
        }
    }
}

/// Poisson-binomial distribution of the hit count: `dist[k] = P(exactly k hits)`.
fn hit_distribution(probs: &[f64]) -> Vec<f64> {
    let mut dist = vec![0.0; probs.len() + 1];
    dist[0] = 1.0;
    for (i, p) in probs.iter().enumerate() {
        for k in (0..=i + 1).rev() {
            let hit = if k > 0 { dist[k - 1] * p } else { 0.0 };
            dist[k] = dist[k] * (1.0 - p) + hit;
        }
    }
    dist
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_hit_distribution_sums_to_one() {
        let d = hit_distribution(&[0.5, 0.5, 0.5]);
        assert!(approx(d[0], 0.125));
        assert!(approx(d[1], 0.375));
        assert!(approx(d[2], 0.375));
        assert!(approx(d[3], 0.125));

        let d = hit_distribution(&[0.9, 0.3, 0.6, 0.55]);
        assert!(approx(d.iter().sum::<f64>(), 1.0));
    }

    #[test]
    fn test_power_ev() {
        let t = PayoutTables::default();
        // 0.5^3 * 10 - 1 = 0.25
        assert!(approx(t.power_ev(&[0.5, 0.5, 0.5]), 0.25));
        assert_eq!(t.power_ev(&[0.9, 0.9]), -1.0);
        assert_eq!(t.power_ev(&[0.9; 7]), -1.0);
    }

    #[test]
    fn test_flex_ev_three_legs() {
        let t = PayoutTables::default();
        // Only 3_of_3 pays at 3 legs: 0.125 * 5 - 1
        assert!(approx(t.flex_ev(&[0.5, 0.5, 0.5]), -0.375));
    }

    #[test]
    fn test_flex_ev_four_legs() {
        let t = PayoutTables::default();
        let p = [0.6; 4];
        let all = 0.6f64.powi(4);
        let three = 4.0 * 0.6f64.powi(3) * 0.4;
        assert!(approx(t.flex_ev(&p), all * 10.0 + three * 2.5 - 1.0));
    }

    #[test]
    fn test_payout_lookup() {
        let t = PayoutTables::default();
        assert_eq!(t.payout(TicketType::Power, 4, 4), 20.0);
        assert_eq!(t.payout(TicketType::Power, 3, 4), 0.0);
        assert_eq!(t.payout(TicketType::Flex, 4, 5), 4.0);
        assert_eq!(t.payout(TicketType::Flex, 2, 5), 0.0);
    }

    #[test]
    fn test_json_loading() {
        let json = br#"{"power": {"3": 6.0}, "flex": {"3_of_3": 3.0}}"#;
        let t = PayoutTables::from_json(json).unwrap();
        assert_eq!(t.power_payout(3), 6.0);
        assert_eq!(t.power_payout(4), 0.0);

        assert!(PayoutTables::from_json(br#"{"power": {"3": -1}, "flex": {}}"#).is_err());
        assert!(PayoutTables::from_json(br#"{"power": {}}"#).is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("prop_rater_missing_payouts.json");
        let _ = std::fs::remove_file(&path);
        assert_eq!(PayoutTables::load(&path).unwrap(), PayoutTables::default());
    }
}
