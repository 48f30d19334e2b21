//! Game-log ingestion and rolling-window features.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

use crate::analyzers::utility::{mean, sample_stddev};
use crate::mapping::normalize_name;

pub const DEFAULT_WINDOWS: [usize; 3] = [3, 5, 10];

/// One historical box-score line for a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct GameLogRow {
    #[serde(default)]
    pub player_id: Option<String>,
    pub player_name: String,
    pub game_date: NaiveDate,
    pub pts: f64,
    pub reb: f64,
    pub ast: f64,
    pub stl: f64,
    pub blk: f64,
    pub tov: f64,
    pub min: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    Pts,
    Reb,
    Ast,
    Stl,
    Blk,
    Tov,
    Min,
}

impl Stat {
    pub const ALL: [Stat; 7] = [
        Stat::Pts,
        Stat::Reb,
        Stat::Ast,
        Stat::Stl,
        Stat::Blk,
        Stat::Tov,
        Stat::Min,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Stat::Pts => "PTS",
            Stat::Reb => "REB",
            Stat::Ast => "AST",
            Stat::Stl => "STL",
            Stat::Blk => "BLK",
            Stat::Tov => "TOV",
            Stat::Min => "MIN",
        }
    }

    pub fn value(self, row: &GameLogRow) -> f64 {
        match self {
            Stat::Pts => row.pts,
            Stat::Reb => row.reb,
            Stat::Ast => row.ast,
            Stat::Stl => row.stl,
            Stat::Blk => row.blk,
            Stat::Tov => row.tov,
            Stat::Min => row.min,
        }
    }

    fn from_token(token: &str) -> Option<Stat> {
        match token.trim().to_ascii_lowercase().as_str() {
            "points" | "pts" => Some(Stat::Pts),
            "rebounds" | "rebs" | "reb" => Some(Stat::Reb),
            "assists" | "asts" | "ast" => Some(Stat::Ast),
            "steals" | "stls" | "stl" => Some(Stat::Stl),
            "blocks" | "blocked shots" | "blks" | "blk" => Some(Stat::Blk),
            "turnovers" | "tov" | "to" => Some(Stat::Tov),
            "minutes" | "min" => Some(Stat::Min),
            _ => None,
        }
    }
}

/// Stats summed by a board prop type, e.g. "Pts+Rebs+Asts".
pub fn prop_stats(prop_type: &str) -> Option<Vec<Stat>> {
    prop_type.split('+').map(Stat::from_token).collect()
}

/// Value of a prop type for one game, `None` if the prop is not box-score based.
pub fn prop_value(row: &GameLogRow, prop_type: &str) -> Option<f64> {
    prop_stats(prop_type).map(|stats| stats.iter().map(|s| s.value(row)).sum())
}

/// Reads a game-log CSV, skipping malformed rows with a warning.
pub fn read_game_logs(path: impl AsRef<Path>) -> Result<Vec<GameLogRow>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (idx, result) in rdr.deserialize::<GameLogRow>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                skipped += 1;
                warn!(row = idx + 1, error = %e, "Skipping malformed game-log row");
            }
        }
    }
    info!(path = %path.display(), rows = rows.len(), skipped, "Game logs loaded");
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollingStat {
    pub stat: Stat,
    pub window: usize,
    pub mean: f64,
    pub std: Option<f64>,
    pub z: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub game: GameLogRow,
    pub rolling: Vec<RollingStat>,
}

impl FeatureRow {
    pub fn get(&self, stat: Stat, window: usize) -> Option<&RollingStat> {
        self.rolling
            .iter()
            .find(|r| r.stat == stat && r.window == window)
    }
}

fn group_sorted(rows: &[GameLogRow]) -> Vec<Vec<&GameLogRow>> {
    let mut by_player: HashMap<&str, Vec<&GameLogRow>> = HashMap::new();
    for row in rows {
        by_player.entry(row.player_name.as_str()).or_default().push(row);
    }
    let mut groups: Vec<Vec<&GameLogRow>> = by_player.into_values().collect();
    for g in &mut groups {
        g.sort_by_key(|r| r.game_date);
    }
    groups.sort_by(|a, b| a[0].player_name.cmp(&b[0].player_name));
    groups
}

/// Rolling mean/std/z-score of each stat over the previous `windows` games.
///
/// Only games strictly before the current one are used. A player's first game
/// has no history and is omitted from the output.
pub fn add_rolling_features(rows: &[GameLogRow], windows: &[usize]) -> Vec<FeatureRow> {
    let mut out = Vec::new();

    for games in group_sorted(rows) {
        for i in 1..games.len() {
            let current = games[i];
            let mut rolling = Vec::with_capacity(Stat::ALL.len() * windows.len());

            for stat in Stat::ALL {
                for &window in windows {
                    let start = i.saturating_sub(window);
                    let history: Vec<f64> = games[start..i].iter().map(|g| stat.value(g)).collect();

                    let avg = mean(&history);
                    let std = sample_stddev(&history, avg);
                    let z = std
                        .filter(|s| *s > 0.0)
                        .map(|s| (stat.value(current) - avg) / s);

                    rolling.push(RollingStat {
                        stat,
                        window,
                        mean: avg,
                        std,
                        z,
                    });
                }
            }

            out.push(FeatureRow {
                game: current.clone(),
                rolling,
            });
        }
    }

    out
}

/// Writes feature rows with one `<STAT>_<N>G_{AVG,STD,Z}` triple per stat and window.
pub fn write_feature_csv(path: impl AsRef<Path>, rows: &[FeatureRow], windows: &[usize]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("opening {} for writing", path.display()))?;

    let mut header = vec!["PLAYER_NAME".to_string(), "GAME_DATE".to_string()];
    header.extend(Stat::ALL.iter().map(|s| s.column().to_string()));
    for stat in Stat::ALL {
        for w in windows {
            let col = stat.column();
            header.push(format!("{col}_{w}G_AVG"));
            header.push(format!("{col}_{w}G_STD"));
            header.push(format!("{col}_{w}G_Z"));
        }
    }
    writer.write_record(&header)?;

    let fmt = |v: Option<f64>| v.map(|x| format!("{x:.4}")).unwrap_or_default();

    for row in rows {
        let mut record = vec![
            row.game.player_name.clone(),
            row.game.game_date.to_string(),
        ];
        record.extend(Stat::ALL.iter().map(|s| s.value(&row.game).to_string()));
        for stat in Stat::ALL {
            for &w in windows {
                let r = row.get(stat, w);
                record.push(fmt(r.map(|r| r.mean)));
                record.push(fmt(r.and_then(|r| r.std)));
                record.push(fmt(r.and_then(|r| r.z)));
            }
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "Feature CSV written");
    Ok(())
}

/// Recent form for one player and prop.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentForm {
    pub mean: f64,
    pub std: Option<f64>,
    pub games: usize,
}

/// Game logs indexed by player id and normalized name for quick lookups.
pub struct GameLogIndex {
    by_key: HashMap<String, Vec<GameLogRow>>,
}

impl GameLogIndex {
    pub fn new(rows: Vec<GameLogRow>) -> Self {
        let mut by_key: HashMap<String, Vec<GameLogRow>> = HashMap::new();
        for row in rows {
            if let Some(id) = row.player_id.as_ref().filter(|id| !id.is_empty()) {
                by_key.entry(format!("id:{id}")).or_default().push(row.clone());
            }
            by_key
                .entry(format!("name:{}", normalize_name(&row.player_name)))
                .or_default()
                .push(row);
        }
        for games in by_key.values_mut() {
            games.sort_by_key(|r| r.game_date);
        }
        Self { by_key }
    }

    fn games(&self, stats_id: Option<&str>, player_name: &str) -> Option<&[GameLogRow]> {
        stats_id
            .and_then(|id| self.by_key.get(&format!("id:{id}")))
            .or_else(|| self.by_key.get(&format!("name:{}", normalize_name(player_name))))
            .map(Vec::as_slice)
    }

    /// Form over the last `n` games before `before` (all games when `None`).
    pub fn recent_form(
        &self,
        stats_id: Option<&str>,
        player_name: &str,
        prop_type: &str,
        n: usize,
        before: Option<NaiveDate>,
    ) -> Option<RecentForm> {
        let games = self.games(stats_id, player_name)?;
        let eligible: Vec<&GameLogRow> = games
            .iter()
            .filter(|g| before.is_none_or(|d| g.game_date < d))
            .collect();
        let start = eligible.len().saturating_sub(n);
        let values: Vec<f64> = eligible[start..]
            .iter()
            .filter_map(|g| prop_value(g, prop_type))
            .collect();
        if values.is_empty() {
            return None;
        }
        let avg = mean(&values);
        Some(RecentForm {
            mean: avg,
            std: sample_stddev(&values, avg),
            games: values.len(),
        })
    }

    /// Mean of the player's last `n` games for `prop_type`.
    pub fn recent_average(&self, player_name: &str, prop_type: &str, n: usize) -> Option<f64> {
        self.recent_form(None, player_name, prop_type, n, None)
            .map(|form| form.mean)
    }

    /// The game a player played on `date`, if any.
    pub fn game_on(&self, stats_id: Option<&str>, player_name: &str, date: NaiveDate) -> Option<&GameLogRow> {
        self.games(stats_id, player_name)?
            .iter()
            .find(|g| g.game_date == date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, day: u32, pts: f64) -> GameLogRow {
        GameLogRow {
            player_id: None,
            player_name: name.to_string(),
            game_date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            pts,
            reb: 5.0,
            ast: 2.0,
            stl: 1.0,
            blk: 0.0,
            tov: 2.0,
            min: 30.0,
        }
    }

    #[test]
    fn test_prop_value_combos() {
        let r = row("A", 1, 20.0);
        assert_eq!(prop_value(&r, "Points"), Some(20.0));
        assert_eq!(prop_value(&r, "Pts+Rebs+Asts"), Some(27.0));
        assert_eq!(prop_value(&r, "Blks+Stls"), Some(1.0));
        assert_eq!(prop_value(&r, "Fantasy Score"), None);
    }

    #[test]
    fn test_first_game_dropped_and_history_only() {
        // Out of order on purpose: sorting by date must come first.
        let rows = vec![row("A", 3, 30.0), row("A", 1, 10.0), row("A", 2, 20.0)];
        let features = add_rolling_features(&rows, &[3]);

        assert_eq!(features.len(), 2);
        let second = &features[0];
        assert_eq!(second.game.pts, 20.0);
        let r = second.get(Stat::Pts, 3).unwrap();
        assert_eq!(r.mean, 10.0);
        assert_eq!(r.std, None);
        assert_eq!(r.z, None);

        let third = &features[1];
        let r = third.get(Stat::Pts, 3).unwrap();
        assert_eq!(r.mean, 15.0);
        let std = r.std.unwrap();
        assert!((std - 50f64.sqrt()).abs() < 1e-9);
        assert!((r.z.unwrap() - 15.0 / std).abs() < 1e-9);
    }

    #[test]
    fn test_window_limits_history() {
        let rows: Vec<_> = (1..=6).map(|d| row("A", d, d as f64)).collect();
        let features = add_rolling_features(&rows, &[2]);
        let last = features.last().unwrap();
        // Games 4 and 5 precede game 6.
        assert_eq!(last.get(Stat::Pts, 2).unwrap().mean, 4.5);
    }

    #[test]
    fn test_zero_variance_has_no_z() {
        let rows = vec![row("A", 1, 10.0), row("A", 2, 10.0), row("A", 3, 12.0)];
        let features = add_rolling_features(&rows, &[3]);
        let r = features[1].get(Stat::Pts, 3).unwrap();
        assert_eq!(r.std, Some(0.0));
        assert_eq!(r.z, None);
    }

    #[test]
    fn test_players_are_independent() {
        let rows = vec![row("A", 1, 10.0), row("B", 2, 40.0), row("A", 3, 30.0)];
        let features = add_rolling_features(&rows, &[3]);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].game.player_name, "A");
        assert_eq!(features[0].get(Stat::Pts, 3).unwrap().mean, 10.0);
    }

    #[test]
    fn test_recent_form_respects_cutoff() {
        let index = GameLogIndex::new(vec![row("A'ja Wilson", 1, 10.0), row("A'ja Wilson", 2, 20.0), row("A'ja Wilson", 3, 90.0)]);
        let cutoff = NaiveDate::from_ymd_opt(2024, 6, 3);
        let form = index.recent_form(None, "Aja Wilson", "Points", 5, cutoff).unwrap();
        assert_eq!(form.games, 2);
        assert_eq!(form.mean, 15.0);

        assert!(index.recent_form(None, "Nobody", "Points", 5, None).is_none());
        assert_eq!(index.recent_average("A'ja Wilson", "Points", 2), Some(55.0));
    }

    #[test]
    fn test_write_feature_csv_header() {
        let path = format!("{}/prop_rater_features_test.csv", std::env::temp_dir().display());
        let rows = vec![row("A", 1, 10.0), row("A", 2, 12.0)];
        let features = add_rolling_features(&rows, &[3, 5]);
        write_feature_csv(&path, &features, &[3, 5]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        assert!(header.starts_with("PLAYER_NAME,GAME_DATE,PTS"));
        assert!(header.contains("PTS_3G_AVG,PTS_3G_STD,PTS_3G_Z"));
        assert!(header.contains("MIN_5G_Z"));
        assert_eq!(content.lines().count(), 2);

        std::fs::remove_file(&path).unwrap();
    }
}
