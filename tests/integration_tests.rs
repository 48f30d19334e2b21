use chrono::{NaiveDate, Utc};
use prop_rater::analyzers::aggregate::aggregate_by_phase;
use prop_rater::analyzers::grade::confidence_status;
use prop_rater::analyzers::types::ConfidenceStatus;
use prop_rater::backtest::{BacktestConfig, run_backtest};
use prop_rater::cycle::{CyclePhase, CycleTracker};
use prop_rater::error::RaterError;
use prop_rater::features::{GameLogIndex, add_rolling_features, read_game_logs};
use prop_rater::filter::AnomalyFilter;
use prop_rater::mapping::{PlayerMapper, RosterPlayer, lookup};
use prop_rater::output::read_records;
use prop_rater::parser::{board_player_names, parse_board};
use prop_rater::projection::League;
use prop_rater::settle::{LegResult, Outcome, ResultBook, SlipStatus, settle_slips, submit};
use prop_rater::slips::{
    CandidateBuilder, PayoutTables, Side, SlipOptimizer, TicketType, assign_stakes, enforce_minimum,
};
use prop_rater::staking::BankrollOptimizer;
use rand::SeedableRng;
use rand::rngs::StdRng;

const BOARD: &[u8] = include_bytes!("fixtures/board_wnba.json");

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn slate_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 20).unwrap()
}

#[test]
fn test_board_parse_and_filter() {
    let projections = parse_board(BOARD, Some(League::Wnba)).expect("Failed to parse board");
    // The inactive projection is dropped
    assert_eq!(projections.len(), 6);
    assert!(projections.iter().all(|p| p.league == Some(League::Wnba)));

    let (kept, report) = AnomalyFilter::default().filter(projections);
    assert_eq!(kept.len(), 5);
    assert_eq!(report.demons, 1);
    assert!(kept.iter().all(|p| p.projection_id != "9002"));

    let names = board_player_names(BOARD).unwrap();
    assert_eq!(names.len(), 5);
}

#[test]
fn test_game_log_features_skip_bad_rows() {
    let rows = read_game_logs(fixture("gamelogs.csv")).unwrap();
    assert_eq!(rows.len(), 30);

    let features = add_rolling_features(&rows, &[3, 5]);
    // First game of each of five players has no history
    assert_eq!(features.len(), 25);
}

#[test]
fn test_full_pipeline() {
    let date = slate_date();

    let (board, _) = AnomalyFilter::default().filter(parse_board(BOARD, Some(League::Wnba)).unwrap());

    let roster: Vec<RosterPlayer> = read_records(fixture("roster.csv")).unwrap();
    let names: Vec<String> = board.iter().map(|p| p.player.clone()).collect();
    let (mappings, report) = PlayerMapper::new(&roster, 85.0).map_new_players(&names, Vec::new(), date);
    assert_eq!(report.auto_mapped, 5);
    assert_eq!(lookup(&mappings, "A'ja Wilson"), Some("1628932"));

    let index = GameLogIndex::new(read_game_logs(fixture("gamelogs.csv")).unwrap());
    let tracker = CycleTracker::new();
    let builder = CandidateBuilder::new(&index, &mappings, &tracker, 0.75);
    let (legs, candidates) = builder.build(&board, date);
    assert_eq!(candidates.accepted, 5);
    assert!(legs.iter().all(|l| l.side == Side::Over && l.phase == CyclePhase::Unknown));

    let optimizer = SlipOptimizer::new(PayoutTables::default());
    let mut slips = optimizer.generate(&legs, TicketType::Power, 3, date);
    assert!(!slips.is_empty());
    assert_eq!(slips[0].slip_id, "POWER_20240620_001");
    assert_eq!(slips[0].legs.len(), 5);

    assert!(enforce_minimum(&slips, 1, false).is_ok());
    assert!(matches!(
        enforce_minimum(&slips, 100, false),
        Err(RaterError::InsufficientSlips { minimum: 100, .. })
    ));

    assign_stakes(&mut slips, &BankrollOptimizer::default(), 1000.0);
    for slip in &mut slips {
        assert!(slip.stake > 0.0);
        submit(slip).unwrap();
        assert_eq!(slip.status, SlipStatus::Pending);
    }

    let book = ResultBook::from_csv(fixture("results.csv")).unwrap();
    let settled = settle_slips(&mut slips, &book, &PayoutTables::default(), Utc::now()).unwrap();
    assert_eq!(settled.settled, slips.len());
    assert_eq!(settled.won, slips.len());
    assert_eq!(slips[0].status, SlipStatus::Settled(Outcome::Won));
    assert_eq!(slips[0].payout, Some(slips[0].stake * 40.0));

    let phases = aggregate_by_phase(&slips);
    assert_eq!(phases.len(), 1);
    assert_eq!(phases[0].win_rate, 1.0);
    assert_eq!(
        confidence_status(phases[0].total_bets, phases[0].win_rate),
        ConfidenceStatus::Low
    );
}

#[test]
fn test_backtest_over_game_logs() {
    let rows = read_game_logs(fixture("gamelogs.csv")).unwrap();
    let config = BacktestConfig {
        prop_types: vec!["Points".to_string()],
        line_variance: 0.0,
        ..Default::default()
    };
    let mut rng = StdRng::seed_from_u64(42);

    let (bets, report) = run_backtest(
        &rows,
        &CycleTracker::new(),
        &BankrollOptimizer::default(),
        &config,
        &mut rng,
    )
    .expect("Backtest failed");

    // Only the sixth game of each player has five prior games
    assert_eq!(report.dates, 6);
    assert_eq!(report.props_priced, 5);
    assert_eq!(bets.len(), 5);
    assert!(bets.iter().all(|b| b.date == NaiveDate::from_ymd_opt(2024, 6, 11).unwrap()));

    // Shaded lines sit above each average and the sixth games came in under
    assert!(bets.iter().all(|b| b.side == Side::Under && b.result == LegResult::Hit));
    let wilson = bets.iter().find(|b| b.player == "Aja Wilson").unwrap();
    assert_eq!(wilson.line, 28.5);
    assert_eq!(wilson.actual, 27.0);

    assert_eq!(report.overall.wins, 5);
    assert_eq!(report.overall.hit_rate, 1.0);
    assert_eq!(report.overall.max_drawdown, 0.0);
    assert!((report.overall.total_profit - 454.55).abs() < 0.01);
    assert_eq!(report.by_phase.len(), 1);
    assert_eq!(report.by_phase[0].phase, CyclePhase::Unknown);
    assert_eq!(report.by_phase[0].metrics.total_bets, 5);
}
