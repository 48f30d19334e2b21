//! JSON:API board parser.
//!
//! A board response carries projections in `data` and the objects they point
//! at (players, stat types, games) in `included`. Each projection links to
//! those through `relationships.<kind>.data.id`.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::projection::{DEFAULT_AMERICAN_ODDS, League, Projection};

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    data: Option<Vec<Value>>,
    #[serde(default)]
    included: Option<Vec<Value>>,
}

impl Document {
    fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("board is not a JSON:API document")
    }

    fn data(&mut self) -> Vec<Resource> {
        resources(self.data.take().unwrap_or_default(), "data")
    }

    fn included(&mut self) -> Vec<Resource> {
        resources(self.included.take().unwrap_or_default(), "included")
    }
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(default)]
    id: Value,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    relationships: Map<String, Value>,
}

#[derive(Debug, Default)]
struct PlayerInfo {
    name: String,
    team: Option<String>,
    position: Option<String>,
}

#[derive(Debug, Default)]
struct GameInfo {
    home_team: Option<String>,
    away_team: Option<String>,
    start_time: Option<String>,
}

/// Decodes a board document into projections.
///
/// Inactive projections and items that are not of type `projection` are
/// skipped. Items without a usable line are skipped with a warning.
pub fn parse_board(bytes: &[u8], league: Option<League>) -> Result<Vec<Projection>> {
    let mut doc = Document::decode(bytes)?;
    let data = doc.data();
    let included = doc.included();

    let mut players = HashMap::new();
    let mut stat_types = HashMap::new();
    let mut games = HashMap::new();

    for item in &included {
        let Some(id) = id_string(&item.id) else {
            continue;
        };
        match item.kind.as_str() {
            "new_player" => {
                players.insert(
                    id,
                    PlayerInfo {
                        name: str_attr(&item.attributes, "name").unwrap_or_default(),
                        team: str_attr(&item.attributes, "team"),
                        position: str_attr(&item.attributes, "position"),
                    },
                );
            }
            "stat_type" => {
                if let Some(name) = str_attr(&item.attributes, "name") {
                    stat_types.insert(id, name);
                }
            }
            "game" => {
                games.insert(
                    id,
                    GameInfo {
                        home_team: str_attr(&item.attributes, "home_team"),
                        away_team: str_attr(&item.attributes, "away_team"),
                        start_time: str_attr(&item.attributes, "start_time"),
                    },
                );
            }
            _ => {}
        }
    }

    let fetched_at = Utc::now();
    let mut projections = Vec::with_capacity(data.len());

    for item in &data {
        if item.kind != "projection" {
            continue;
        }
        let Some(id) = id_string(&item.id) else {
            warn!("Projection without id, skipping");
            continue;
        };
        let attrs = &item.attributes;

        if attrs.get("is_active").and_then(Value::as_bool) == Some(false) {
            continue;
        }

        let Some(line) = attrs.get("line_score").and_then(number) else {
            warn!(projection_id = %id, "Projection without numeric line_score, skipping");
            continue;
        };

        let player_id = related_id(&item.relationships, "new_player");
        let game_id = related_id(&item.relationships, "game");
        let stat_type = related_id(&item.relationships, "stat_type")
            .and_then(|sid| stat_types.get(&sid).cloned())
            .or_else(|| str_attr(attrs, "stat_type"))
            .unwrap_or_else(|| "Unknown".to_string());

        let player = player_id.as_ref().and_then(|pid| players.get(pid));
        let game = game_id.as_ref().and_then(|gid| games.get(gid));

        projections.push(Projection {
            projection_id: id,
            player_id: player_id.clone(),
            player: player
                .map(|p| p.name.clone())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            team: player.and_then(|p| p.team.clone()),
            position: player.and_then(|p| p.position.clone()),
            prop_type: stat_type,
            line,
            odds_type: str_attr(attrs, "odds_type"),
            over_odds: odds_attr(attrs, "odds_type_over"),
            under_odds: odds_attr(attrs, "odds_type_under"),
            start_time: game
                .and_then(|g| g.start_time.clone())
                .or_else(|| str_attr(attrs, "start_time")),
            game_id,
            home_team: game.and_then(|g| g.home_team.clone()),
            away_team: game.and_then(|g| g.away_team.clone()),
            league,
            source: "prizepicks".to_string(),
            fetched_at,
            flash_sale: attrs.get("flash_sale").and_then(Value::as_bool).unwrap_or(false),
            is_promo: attrs.get("is_promo").and_then(Value::as_bool).unwrap_or(false),
        });
    }

    debug!(
        data = data.len(),
        included = included.len(),
        parsed = projections.len(),
        "Board parsed"
    );

    Ok(projections)
}

/// Distinct player names referenced in a board's `included` section.
pub fn board_player_names(bytes: &[u8]) -> Result<Vec<String>> {
    let mut names: Vec<String> = Document::decode(bytes)?
        .included()
        .iter()
        .filter(|item| item.kind == "new_player")
        .filter_map(|item| str_attr(&item.attributes, "name"))
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

/// Decodes each item on its own so one malformed entry does not sink the board.
fn resources(items: Vec<Value>, section: &'static str) -> Vec<Resource> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Resource>(item) {
            Ok(resource) => Some(resource),
            Err(e) => {
                warn!(section, error = %e, "Malformed JSON:API item, skipping");
                None
            }
        })
        .collect()
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn related_id(relationships: &Map<String, Value>, kind: &str) -> Option<String> {
    relationships
        .get(kind)
        .and_then(|r| r.get("data"))
        .and_then(|d| d.get("id"))
        .and_then(id_string)
}

fn str_attr(attrs: &Map<String, Value>, key: &str) -> Option<String> {
    match attrs.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts JSON numbers and numeric strings.
fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn odds_attr(attrs: &Map<String, Value>, key: &str) -> i32 {
    attrs
        .get(key)
        .and_then(number)
        .map(|v| v.round() as i32)
        .unwrap_or(DEFAULT_AMERICAN_ODDS)
}
