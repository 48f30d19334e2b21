//! CLI entry point for the prop rater.
//!
//! Provides subcommands for pulling projection boards, mapping board players
//! to the stats source, building game-log features, sizing stakes, generating
//! and settling slips, and reporting per-phase performance.

mod infra;
mod services;

use crate::infra::prizepicks::client::PrizePicksClient;
use crate::services::board_api::ProjectionSource;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use prop_rater::analyzers::analyzer::analyze;
use prop_rater::analyzers::grade::divisor_config;
use prop_rater::backtest::{BacktestConfig, run_backtest};
use prop_rater::config::Settings;
use prop_rater::cycle::{CycleEntry, CyclePhase, CycleTracker};
use prop_rater::features::{DEFAULT_WINDOWS, GameLogIndex, add_rolling_features, read_game_logs, write_feature_csv};
use prop_rater::filter::AnomalyFilter;
use prop_rater::mapping::{PlayerMapper, PlayerMapping, RosterPlayer};
use prop_rater::output::{print_json, read_json, read_records, read_records_or_empty, write_json, write_records};
use prop_rater::projection::{League, Projection};
use prop_rater::settle::{ResultBook, settle_slips, submit};
use prop_rater::slips::{
    CandidateBuilder, PayoutTables, Side, Slip, SlipOptimizer, SlipSummary, TicketType, assign_stakes,
    correlation_filter, dedupe, enforce_minimum, ensure_replaceable,
};
use prop_rater::staking::{BankrollOptimizer, DivisorMode, Opportunity, PhaseDivisors, american_to_decimal};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "prop_rater")]
#[command(about = "Rate player props, size stakes and track slips", long_about = None)]
struct Cli {
    /// Kelly divisor config
    #[arg(long, global = true, default_value = "config/phase_kelly_divisors.json")]
    divisors: PathBuf,

    /// Payout multiplier tables
    #[arg(long, global = true, default_value = "config/payout_tables.json")]
    payouts: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch projection boards, drop alternate lines and write a projections CSV
    Fetch {
        /// Leagues to pull (e.g. WNBA NBA)
        #[arg(short, long, num_args = 1.., default_value = "WNBA")]
        leagues: Vec<League>,

        /// Pull in-game lines
        #[arg(long, default_value_t = false)]
        live: bool,

        /// CSV file to write projections to
        #[arg(short, long, default_value = "output/projections.csv")]
        output: PathBuf,

        /// Optional: directory for gzip archives of the raw responses
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        /// Relative line spread (%) above which two lines count as alternates
        #[arg(long, default_value_t = 15.0)]
        tolerance: f64,
    },
    /// Map board players to stats-source ids
    Map {
        #[arg(short, long, default_value = "output/projections.csv")]
        projections: PathBuf,

        /// Roster CSV (stats_id, name)
        #[arg(short, long, default_value = "data/roster.csv")]
        roster: PathBuf,

        #[arg(short, long, default_value = "data/player_mappings.csv")]
        mappings: PathBuf,

        /// Minimum similarity (0-100) for an automatic mapping
        #[arg(short, long, default_value_t = 85.0)]
        threshold: f64,
    },
    /// Build rolling game-log features
    Features {
        #[arg(short, long, default_value = "data/gamelogs.csv")]
        gamelogs: PathBuf,

        #[arg(short, long, default_value = "output/features.csv")]
        output: PathBuf,

        /// Rolling window sizes, in games
        #[arg(short, long, num_args = 1.., default_values_t = DEFAULT_WINDOWS)]
        windows: Vec<usize>,
    },
    /// Import cycle-phase observations into the cycle store
    Cycles {
        /// CSV of cycle entries (player_id, date, cycle_phase, confidence_score, ...)
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, default_value = "data/cycles.json")]
        store: PathBuf,
    },
    /// Size a single bet, optionally simulating bankroll growth
    Stake {
        /// Model win probability (0-1)
        #[arg(short = 'p', long)]
        win_prob: f64,

        /// American odds
        #[arg(short, long, default_value_t = -110, allow_hyphen_values = true)]
        odds: i32,

        #[arg(long, default_value = "follicular")]
        phase: CyclePhase,

        /// Recent win rate for the phase (enables dynamic divisors)
        #[arg(long)]
        win_rate: Option<f64>,

        /// Overrides BANKROLL
        #[arg(short, long)]
        bankroll: Option<f64>,

        /// Simulate this many bets across all phases
        #[arg(long)]
        simulate: Option<usize>,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Generate, stake and place the day's slips
    Slips {
        #[arg(short, long, default_value = "output/projections.csv")]
        projections: PathBuf,

        #[arg(short, long, default_value = "data/gamelogs.csv")]
        gamelogs: PathBuf,

        #[arg(short, long, default_value = "data/player_mappings.csv")]
        mappings: PathBuf,

        #[arg(short, long, default_value = "data/cycles.json")]
        cycles: PathBuf,

        /// Slip date (defaults to today, UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(long, default_value_t = 5)]
        power: usize,

        #[arg(long, default_value_t = 5)]
        flex: usize,

        /// Also size up to this many uncorrelated straight picks
        #[arg(long, default_value_t = 0)]
        straight: usize,

        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Bypass the minimum slip count requirement (MINIMUM_SLIPS_PER_DAY)
        #[arg(long, default_value_t = false)]
        bypass_guard_rail: bool,
    },
    /// Grade pending slips for a date against a results CSV
    Settle {
        /// Results CSV (player, prop_type, actual)
        #[arg(short, long)]
        results: PathBuf,

        #[arg(short, long)]
        date: NaiveDate,

        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Replay the game logs against synthetic lines and report hit rate, ROI,
    /// drawdown and Sharpe overall and per phase
    Backtest {
        #[arg(short, long, default_value = "data/gamelogs.csv")]
        gamelogs: PathBuf,

        #[arg(short, long, default_value = "data/cycles.json")]
        cycles: PathBuf,

        #[arg(long)]
        start: Option<NaiveDate>,

        #[arg(long)]
        end: Option<NaiveDate>,

        /// Prop types to price (e.g. Points Rebounds)
        #[arg(short, long, num_args = 1..)]
        props: Option<Vec<String>>,

        /// Line noise as a fraction of the recent average
        #[arg(long, default_value_t = 0.1)]
        line_variance: f64,

        #[arg(long, default_value_t = 10_000.0)]
        bankroll: f64,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
    },
    /// Aggregate settled slips by cycle phase and update the confidence log
    Phases {
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Write the computed divisors to the Kelly divisor config
        #[arg(long, default_value_t = false)]
        write_divisors: bool,
    },
}

fn init_tracing() -> Result<WorkerGuard> {
    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/prop_rater.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("prop_rater.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    Ok(file_guard)
}

fn slip_path(output_dir: &Path, date: NaiveDate) -> PathBuf {
    output_dir.join("slips").join(format!("slips_{date}.json"))
}

fn summary_path(output_dir: &Path, date: NaiveDate) -> PathBuf {
    output_dir.join(format!("slips_{date}.csv"))
}

fn write_summaries(output_dir: &Path, date: NaiveDate, slips: &[Slip]) -> Result<()> {
    let rows: Vec<SlipSummary> = slips.iter().map(SlipSummary::from).collect();
    write_records(summary_path(output_dir, date), &rows)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file
    let _file_guard = init_tracing()?;

    let cli = Cli::parse();
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::Fetch {
            leagues,
            live,
            output,
            archive_dir,
            tolerance,
        } => {
            let settings = Settings::from_env()?;
            fetch_boards(&settings, &leagues, live, &output, archive_dir.as_deref(), tolerance).await?;
        }
        Commands::Map {
            projections,
            roster,
            mappings,
            threshold,
        } => {
            let board: Vec<Projection> = read_records(&projections)?;
            let names: Vec<String> = board.into_iter().map(|p| p.player).collect();
            let roster: Vec<RosterPlayer> = read_records(&roster)?;
            let existing: Vec<PlayerMapping> = read_records_or_empty(&mappings)?;

            let mapper = PlayerMapper::new(&roster, threshold);
            let (rows, report) = mapper.map_new_players(&names, existing, today);
            write_records(&mappings, &rows)?;
            print_json(&report)?;
        }
        Commands::Features {
            gamelogs,
            output,
            windows,
        } => {
            let rows = read_game_logs(&gamelogs)?;
            let features = add_rolling_features(&rows, &windows);
            write_feature_csv(&output, &features, &windows)?;
            info!(games = rows.len(), rows = features.len(), "Features built");
        }
        Commands::Cycles { input, store } => {
            let entries: Vec<CycleEntry> = read_records(&input)?;
            let mut tracker = CycleTracker::load(&store)?;
            let report = tracker.ingest(entries);
            tracker.save(&store)?;
            print_json(&report)?;
        }
        Commands::Stake {
            win_prob,
            odds,
            phase,
            win_rate,
            bankroll,
            simulate,
            seed,
        } => {
            let settings = Settings::from_env()?;
            let bankroll = bankroll.unwrap_or(settings.bankroll);
            let optimizer = BankrollOptimizer::new(PhaseDivisors::load(&cli.divisors)?);
            let decimal = american_to_decimal(odds);

            let fraction = optimizer.kelly_fraction(win_prob, decimal, phase, win_rate)?;
            let stake = optimizer.calculate_stake(bankroll, win_prob, decimal, phase, win_rate)?;
            info!(
                %phase,
                decimal_odds = decimal,
                divisor = optimizer.divisors.divisor(phase, win_rate),
                kelly_fraction = fraction,
                stake,
                "Stake sized"
            );
            if optimizer.divisors.mode == DivisorMode::Dynamic {
                for (rate, divisor) in optimizer.divisors.divisor_curve(phase) {
                    debug!(%phase, win_rate = rate, divisor, "Divisor curve");
                }
            }

            if let Some(n) = simulate {
                let weights: Vec<(CyclePhase, f64)> = CyclePhase::KNOWN.iter().map(|p| (*p, 1.0)).collect();
                let mut rng = StdRng::seed_from_u64(seed);
                let result = optimizer.simulate_growth(
                    &mut rng,
                    bankroll,
                    n,
                    win_prob,
                    decimal,
                    &weights,
                    &BTreeMap::new(),
                )?;
                info!(
                    final_bankroll = result.final_bankroll,
                    total_return = result.total_return,
                    bets = result.num_bets,
                    win_rate = result.win_rate,
                    avg_stake = result.avg_stake,
                    "Simulation finished"
                );
            }
        }
        Commands::Slips {
            projections,
            gamelogs,
            mappings,
            cycles,
            date,
            power,
            flex,
            straight,
            output_dir,
            bypass_guard_rail,
        } => {
            let settings = Settings::from_env()?;
            let date = date.unwrap_or(today);
            let path = slip_path(&output_dir, date);
            ensure_replaceable(&path)?;

            let board: Vec<Projection> = read_records(&projections)?;
            let index = GameLogIndex::new(read_game_logs(&gamelogs)?);
            let mappings: Vec<PlayerMapping> = read_records_or_empty(&mappings)?;
            let tracker = CycleTracker::load(&cycles)?;

            let builder = CandidateBuilder::new(&index, &mappings, &tracker, settings.confidence_threshold);
            let (legs, report) = builder.build(&board, date);
            print_json(&report)?;

            let optimizer = SlipOptimizer::new(PayoutTables::load(&cli.payouts)?);
            let mut slips = optimizer.generate(&legs, TicketType::Power, power, date);
            slips.extend(optimizer.generate(&legs, TicketType::Flex, flex, date));
            let mut slips = dedupe(slips);

            enforce_minimum(&slips, settings.minimum_slips, bypass_guard_rail)?;

            let bankroll = BankrollOptimizer::new(PhaseDivisors::load(&cli.divisors)?);
            assign_stakes(&mut slips, &bankroll, settings.bankroll);
            for slip in &mut slips {
                submit(slip)?;
            }

            write_json(&path, &slips)?;
            write_summaries(&output_dir, date, &slips)?;

            if straight > 0 {
                let odds: HashMap<&str, &Projection> =
                    board.iter().map(|p| (p.projection_id.as_str(), p)).collect();
                let opportunities: Vec<Opportunity> = correlation_filter(legs, 0.5)
                    .into_iter()
                    .map(|leg| {
                        let american = odds
                            .get(leg.prop_id.as_str())
                            .map(|p| if leg.side == Side::Over { p.over_odds } else { p.under_odds })
                            .unwrap_or(prop_rater::projection::DEFAULT_AMERICAN_ODDS);
                        Opportunity {
                            id: leg.prop_id,
                            win_prob: leg.probability,
                            decimal_odds: american_to_decimal(american),
                            phase: leg.phase,
                        }
                    })
                    .collect();
                let picks = bankroll.optimize_portfolio(settings.bankroll, &opportunities, None, straight)?;
                write_records(output_dir.join(format!("straight_{date}.csv")), &picks)?;
            }

            info!(slips = slips.len(), %date, "Slips placed");
        }
        Commands::Settle {
            results,
            date,
            output_dir,
        } => {
            let path = slip_path(&output_dir, date);
            let mut slips: Vec<Slip> =
                read_json(&path).with_context(|| format!("no slips recorded for {date}"))?;
            let book = ResultBook::from_csv(&results)?;
            let payouts = PayoutTables::load(&cli.payouts)?;

            let report = settle_slips(&mut slips, &book, &payouts, Utc::now())?;
            write_json(&path, &slips)?;
            write_summaries(&output_dir, date, &slips)?;
            print_json(&report)?;
        }
        Commands::Backtest {
            gamelogs,
            cycles,
            start,
            end,
            props,
            line_variance,
            bankroll,
            seed,
            output_dir,
        } => {
            let settings = Settings::from_env()?;
            let mut config = BacktestConfig {
                start,
                end,
                line_variance,
                initial_bankroll: bankroll,
                confidence_threshold: settings.confidence_threshold,
                ..Default::default()
            };
            if let Some(props) = props {
                config.prop_types = props;
            }

            let rows = read_game_logs(&gamelogs)?;
            let tracker = CycleTracker::load(&cycles)?;
            let optimizer = BankrollOptimizer::new(PhaseDivisors::load(&cli.divisors)?);
            let mut rng = StdRng::seed_from_u64(seed);

            let (bets, report) = run_backtest(&rows, &tracker, &optimizer, &config, &mut rng)?;
            write_records(output_dir.join("backtest_bets.csv"), &bets)?;
            write_json(output_dir.join("backtest_report.json"), &report)?;
            print_json(&report.by_phase)?;
        }
        Commands::Phases {
            output_dir,
            date,
            write_divisors,
        } => {
            let date = date.unwrap_or(today);
            let report = analyze(output_dir.join("slips"), &output_dir, date)?;

            for change in &report.changes {
                warn!(phase = %change.phase, from = %change.from, to = %change.to, "Confidence changed");
            }
            if write_divisors {
                write_json(&cli.divisors, &divisor_config(&report.divisors))?;
                info!(path = %cli.divisors.display(), "Kelly divisors updated");
            }
            print_json(&report.divisors)?;
        }
    }

    Ok(())
}

/// Pulls each league's board in turn, pausing `REQUEST_DELAY_MS` between
/// requests, then filters alternate lines and writes one projections CSV.
#[tracing::instrument(skip(settings, leagues, archive_dir), fields(league_count = leagues.len()))]
async fn fetch_boards(
    settings: &Settings,
    leagues: &[League],
    live: bool,
    output: &Path,
    archive_dir: Option<&Path>,
    tolerance: f64,
) -> Result<()> {
    let client = PrizePicksClient::from_settings(settings)?;

    let mut all = Vec::new();
    for (i, league) in leagues.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(settings.request_delay_ms)).await;
        }
        match client.fetch_board(*league, live).await {
            Ok(board) => {
                if let Some(dir) = archive_dir {
                    let path = board.archive(dir)?;
                    info!(path = %path.display(), "Board archived");
                }
                all.extend(board.projections);
            }
            Err(e) => error!(league = %league, error = %e, "Board fetch failed"),
        }
    }

    let (kept, _) = AnomalyFilter::new(tolerance).filter(all);
    write_records(output, &kept)
}
