use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use tracing::{info, instrument};

use prop_rater::config::Settings;
use prop_rater::fetch::auth::ApiKey;
use prop_rater::fetch::{Backoff, BasicClient, HttpClient, Retry, fetch_bytes};
use prop_rater::parser::parse_board;
use prop_rater::projection::League;

use crate::services::board_api::{Board, ProjectionSource};

const PER_PAGE: u32 = 250;
const INCLUDE: &str = "stat_type,new_player,league,game";

pub struct PrizePicksClient<C> {
    client: C,
    base_url: String,
}

impl PrizePicksClient<Retry<Box<dyn HttpClient>>> {
    /// Authenticated when an API key is configured, anonymous otherwise.
    /// Either way requests go through the retry wrapper.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let basic = BasicClient::new().context("building HTTP client")?;
        let inner: Box<dyn HttpClient> = match &settings.api_key {
            Some(key) => Box::new(ApiKey::bearer(basic, key)?),
            None => Box::new(basic),
        };
        Ok(Self::new(Retry::new(inner, Backoff::default()), &settings.base_url))
    }
}

impl<C: HttpClient> PrizePicksClient<C> {
    pub fn new(client: C, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn board_url(&self, league: League, live: bool) -> Result<Url> {
        let league_id = league.api_id().to_string();
        let per_page = PER_PAGE.to_string();
        let mut params = vec![
            ("league_id", league_id.as_str()),
            ("per_page", per_page.as_str()),
            ("single_stat", "true"),
            ("include", INCLUDE),
        ];
        if live {
            params.push(("live", "true"));
        }
        Url::parse_with_params(&format!("{}/projections", self.base_url), &params)
            .with_context(|| format!("invalid base URL '{}'", self.base_url))
    }
}

#[async_trait]
impl<C: HttpClient> ProjectionSource for PrizePicksClient<C> {
    #[instrument(skip(self), fields(league = %league))]
    async fn fetch_board(&self, league: League, live: bool) -> Result<Board> {
        let url = self.board_url(league, live)?;
        let fetched_at = Utc::now();
        let raw = fetch_bytes(&self.client, url.as_str()).await?;
        let projections = parse_board(&raw, Some(league))?;

        info!(bytes = raw.len(), projections = projections.len(), "Board fetched");
        Ok(Board {
            league,
            fetched_at,
            raw,
            projections,
        })
    }
}
