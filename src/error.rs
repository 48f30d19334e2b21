//! Domain errors for the rating and slip pipeline.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RaterError {
    /// Fewer slips than the daily guard rail requires.
    #[error(
        "insufficient slips generated: {count} found, minimum {minimum} required (use --bypass-guard-rail to override)"
    )]
    InsufficientSlips { count: usize, minimum: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("slip {slip_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        slip_id: String,
        from: String,
        to: String,
    },

    #[error("unknown league '{0}' (expected one of NFL, NBA, MLB, NHL, NCAAF, NCAAB, WNBA)")]
    UnknownLeague(String),

    #[error("data integrity check failed: {0}")]
    DataIntegrity(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_slips_message_mentions_bypass() {
        let err = RaterError::InsufficientSlips {
            count: 2,
            minimum: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("2 found"));
        assert!(msg.contains("minimum 5"));
        assert!(msg.contains("--bypass-guard-rail"));
    }
}
