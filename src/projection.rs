//! Player-prop projections as offered on a board.

use crate::error::RaterError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_AMERICAN_ODDS: i32 = -110;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum League {
    Nfl,
    Nba,
    Mlb,
    Nhl,
    Ncaaf,
    Ncaab,
    Wnba,
}

impl League {
    /// Numeric league identifier used by the projections API.
    pub fn api_id(self) -> u32 {
        match self {
            League::Nfl => 1,
            League::Nba => 2,
            League::Mlb => 3,
            League::Nhl => 4,
            League::Ncaaf => 5,
            League::Ncaab => 6,
            League::Wnba => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            League::Nfl => "NFL",
            League::Nba => "NBA",
            League::Mlb => "MLB",
            League::Nhl => "NHL",
            League::Ncaaf => "NCAAF",
            League::Ncaab => "NCAAB",
            League::Wnba => "WNBA",
        }
    }
}

impl fmt::Display for League {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for League {
    type Err = RaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NFL" => Ok(League::Nfl),
            "NBA" => Ok(League::Nba),
            "MLB" => Ok(League::Mlb),
            "NHL" => Ok(League::Nhl),
            "NCAAF" => Ok(League::Ncaaf),
            "NCAAB" => Ok(League::Ncaab),
            "WNBA" => Ok(League::Wnba),
            _ => Err(RaterError::UnknownLeague(s.to_string())),
        }
    }
}

/// One prop line: a player, a stat, and the number to beat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub projection_id: String,
    pub player_id: Option<String>,
    pub player: String,
    pub team: Option<String>,
    pub position: Option<String>,
    pub prop_type: String,
    pub line: f64,
    /// Board-declared line variant ("standard", "demon", "goblin") when present.
    pub odds_type: Option<String>,
    pub over_odds: i32,
    pub under_odds: i32,
    pub start_time: Option<String>,
    pub game_id: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub league: Option<League>,
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    pub flash_sale: bool,
    pub is_promo: bool,
}

impl Projection {
    /// Minimal projection, mostly useful for building fixtures.
    pub fn new(projection_id: &str, player: &str, prop_type: &str, line: f64) -> Self {
        Self {
            projection_id: projection_id.to_string(),
            player_id: None,
            player: player.to_string(),
            team: None,
            position: None,
            prop_type: prop_type.to_string(),
            line,
            odds_type: None,
            over_odds: DEFAULT_AMERICAN_ODDS,
            under_odds: DEFAULT_AMERICAN_ODDS,
            start_time: None,
            game_id: None,
            home_team: None,
            away_team: None,
            league: None,
            source: "prizepicks".to_string(),
            fetched_at: Utc::now(),
            flash_sale: false,
            is_promo: false,
        }
    }

    pub fn is_combo(&self) -> bool {
        self.player.contains('+')
    }

    /// Individual player names; combo entries ("A + B") are split.
    pub fn individual_players(&self) -> Vec<&str> {
        split_combo(&self.player)
    }
}

pub fn split_combo(name: &str) -> Vec<&str> {
    name.split('+')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
