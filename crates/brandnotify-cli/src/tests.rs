use brandnotify_core::BrandCatalog;
use chrono::Duration;

use super::*;
use crate::brands::{fmt_cooldown, format_brand_row};
use crate::cycle::events_from_seqs;
use crate::ledger::checked_email;

#[test]
fn parses_db_ping_command() {
    let cli =
        Cli::try_parse_from(["brandnotify-cli", "db", "ping"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Ping
        })
    ));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["brandnotify-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn run_once_defaults_to_no_limit_and_no_seqs() {
    let cli = Cli::try_parse_from(["brandnotify-cli", "run-once"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::RunOnce { limit: None, ref seqs }) if seqs.is_empty()
    ));
}

#[test]
fn run_once_accepts_limit_and_repeated_seq() {
    let cli = Cli::try_parse_from([
        "brandnotify-cli",
        "run-once",
        "--limit",
        "50",
        "--seq",
        "101",
        "--seq",
        "102",
    ])
    .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::RunOnce { limit: Some(50), ref seqs }) if seqs == &[101, 102]
    ));
}

#[test]
fn cursor_show_accepts_consumer_override() {
    let cli =
        Cli::try_parse_from(["brandnotify-cli", "cursor", "show", "--consumer", "backfill"])
            .unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Cursor {
            command: CursorCommands::Show { consumer: Some(ref c) }
        }) if c == "backfill"
    ));
}

#[test]
fn opt_out_add_takes_positional_email() {
    let cli =
        Cli::try_parse_from(["brandnotify-cli", "opt-out", "add", "press@nike.example"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::OptOut {
            command: OptOutCommands::Add { ref email }
        }) if email == "press@nike.example"
    ));
}

#[test]
fn opt_out_add_requires_email() {
    assert!(Cli::try_parse_from(["brandnotify-cli", "opt-out", "add"]).is_err());
}

#[test]
fn parses_seed_brands_and_brands_list() {
    let seed = Cli::try_parse_from(["brandnotify-cli", "seed-brands"]).unwrap();
    assert!(matches!(seed.command, Some(Commands::SeedBrands)));

    let list = Cli::try_parse_from(["brandnotify-cli", "brands", "list"]).unwrap();
    assert!(matches!(
        list.command,
        Some(Commands::Brands {
            command: BrandsCommands::List
        })
    ));
}

#[test]
fn events_from_seqs_rejects_non_positive() {
    assert!(events_from_seqs(&[5, 0]).is_err());
    let events = events_from_seqs(&[7, 9]).unwrap();
    assert_eq!(events.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![7, 9]);
    assert!(events.iter().all(|e| e.brand_hint.is_none()));
}

#[test]
fn checked_email_lowercases_and_rejects_garbage() {
    assert_eq!(checked_email(" Press@Nike.Example ").unwrap(), "press@nike.example");
    assert!(checked_email("not an email").is_err());
}

#[test]
fn fmt_cooldown_uses_largest_whole_unit() {
    assert_eq!(fmt_cooldown(Duration::days(14)), "14d");
    assert_eq!(fmt_cooldown(Duration::hours(6)), "6h");
    assert_eq!(fmt_cooldown(Duration::seconds(90)), "90s");
}

#[test]
fn brand_row_falls_back_to_default_cooldown() {
    let catalog = BrandCatalog::from_names(&["Coca-Cola"]).unwrap();
    let brand = catalog.brands().next().unwrap();
    let row = format_brand_row(brand, Duration::days(7));

    assert!(row.starts_with("cocacola"));
    assert!(row.contains("7d"));
    assert!(row.trim_end().ends_with('-'));
}
