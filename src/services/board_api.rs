//! Trait and types for pulling projection boards from a provider.

use anyhow::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use prop_rater::output::write_gzip;
use prop_rater::projection::{League, Projection};

/// One league's board as fetched: the raw response plus parsed projections.
#[derive(Debug, Clone)]
pub struct Board {
    pub league: League,
    pub fetched_at: DateTime<Utc>,
    pub raw: Bytes,
    pub projections: Vec<Projection>,
}

impl Board {
    /// Writes the raw response to `<dir>/board_<league>_<timestamp>.json.gz`.
    pub fn archive(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let name = format!(
            "board_{}_{}.json.gz",
            self.league.as_str().to_lowercase(),
            self.fetched_at.format("%Y%m%d_%H%M%S")
        );
        let path = dir.as_ref().join(name);
        write_gzip(&path, &self.raw)?;
        Ok(path)
    }
}

/// Abstraction over a projection provider (e.g., PrizePicks).
#[async_trait::async_trait]
pub trait ProjectionSource {
    /// Returns the current board for `league`; `live` selects in-game lines.
    async fn fetch_board(&self, league: League, live: bool) -> Result<Board>;
}
