// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Result};
use std::env;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use behavior_points::{
    load_roster_csv, Actor, Config, PointsService, Polarity, RegistrationRequest, Role,
    ServiceError,
};

/// Actor recorded on ledger entries made from the command line
const CLI_ACTOR: &str = "cli";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(ServiceError::ConfirmationRequired { .. }) = err.downcast_ref::<ServiceError>() {
                eprintln!("⚠️  {} Repita com --confirm para registrar.", err);
            } else {
                eprintln!("❌ Error: {:#}", err);
            }
            ExitCode::from(exit_code(&err))
        }
    }
}

/// 2 when a severe behavior still needs --confirm, 1 for everything else
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ServiceError>() {
        Some(ServiceError::ConfirmationRequired { .. }) => 2,
        _ => 1,
    }
}

fn run(args: &[String]) -> Result<()> {
    let config = Config::load()?;

    match args.get(1).map(String::as_str) {
        Some("import") => run_import(&config, &args[2..]),
        Some("leaderboard") => run_leaderboard(&config),
        Some("catalog") => run_catalog(&config),
        Some("register") => run_register(&config, &args[2..]),
        Some("history") => run_history(&config, &args[2..]),
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("Unknown command: {}", other)
        }
        // UI mode (default)
        None => run_ui_mode(&config),
    }
}

fn print_usage() {
    println!("behavior-points {}", behavior_points::VERSION);
    println!();
    println!("USAGE:");
    println!("  behavior-points                         Open the terminal UI");
    println!("  behavior-points import <roster.csv>     Import students from CSV");
    println!("  behavior-points leaderboard             Print the ranking");
    println!("  behavior-points catalog                 Print the behavior catalog");
    println!("  behavior-points register <student> <behavior> <justification...> [--confirm]");
    println!("  behavior-points history <student>       Print a student's ledger");
}

fn run_import(config: &Config, args: &[String]) -> Result<()> {
    let Some(csv_path) = args.first() else {
        bail!("Usage: behavior-points import <roster.csv>");
    };

    println!("🗄️  Roster Import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading CSV...");
    let students = load_roster_csv(Path::new(csv_path))?;
    println!("✓ Loaded {} students from CSV", students.len());

    println!("\n💾 Inserting students...");
    let mut service = PointsService::open(config)?;
    let summary = service.import_students(students)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Imported: {}", summary.inserted);
    if summary.skipped > 0 {
        println!("✓ Already present (skipped): {}", summary.skipped);
    }
    println!("✓ Roster now has {} students", service.students().len());

    Ok(())
}

fn run_leaderboard(config: &Config) -> Result<()> {
    let service = PointsService::open(config)?;

    println!("🏆 Ranking de Celebração");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for entry in service.leaderboard() {
        println!(
            "{:>3}. {:<28} {:>6}",
            entry.rank, entry.student.name, entry.student.points
        );
    }

    Ok(())
}

fn run_catalog(config: &Config) -> Result<()> {
    let service = PointsService::open(config)?;

    for (title, polarity) in [
        ("✅ Ações Positivas", Polarity::Positive),
        ("⛔ Ações Negativas", Polarity::Negative),
    ] {
        println!("{}", title);
        for behavior in service.catalog().by_polarity(polarity) {
            println!(
                "  {:<4} {:>+5}  {}{}",
                behavior.id,
                behavior.points,
                behavior.name,
                if behavior.is_severe() { "  ⚠" } else { "" }
            );
        }
        println!();
    }

    Ok(())
}

fn run_register(config: &Config, args: &[String]) -> Result<()> {
    let confirmed = args.iter().any(|a| a == "--confirm");
    let positional: Vec<&String> = args.iter().filter(|a| *a != "--confirm").collect();

    if positional.len() < 3 {
        bail!("Usage: behavior-points register <student> <behavior> <justification...> [--confirm]");
    }

    let request = RegistrationRequest {
        student_id: Some(positional[0].clone()),
        behavior_id: Some(positional[1].clone()),
        justification: positional[2..]
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        confirmed,
    };
    let actor = Actor::new(CLI_ACTOR, Role::Admin);

    let mut service = PointsService::open(config)?;
    let receipt = service.register_behavior(&actor, &request)?;

    if let Some(notice) = &receipt.notice {
        println!("ℹ️  {}", notice);
    }
    println!("✅ {}", receipt.message);
    println!(
        "   Saldo: {} → {}",
        receipt.outcome.previous_balance, receipt.outcome.new_balance
    );

    Ok(())
}

fn run_history(config: &Config, args: &[String]) -> Result<()> {
    let Some(student_id) = args.first() else {
        bail!("Usage: behavior-points history <student>");
    };

    let service = PointsService::open(config)?;
    let items = service.history(student_id)?;

    if items.is_empty() {
        println!("Nenhum registro para {}.", student_id);
        return Ok(());
    }

    for item in items {
        let entry = &item.entry;
        println!(
            "{}  {:>+5}  {:>5} → {:<5}  {}  ({})",
            entry.recorded_at.format("%Y-%m-%d %H:%M"),
            entry.applied_delta,
            entry.balance_before,
            entry.balance_after,
            item.behavior_name.as_deref().unwrap_or(&entry.behavior_id),
            entry.actor
        );
        println!("    {}", entry.justification);
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    use std::collections::HashMap;

    println!("🖥️  Loading Behavior Points UI...\n");

    let service = PointsService::open(config)?;
    let leaderboard = service.leaderboard();

    let mut activity = HashMap::new();
    for entry in &leaderboard {
        let items = service.recent_activity(&entry.student.id)?;
        activity.insert(entry.student.id.clone(), items);
    }

    println!("✓ Loaded {} students\n", leaderboard.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(leaderboard, service.catalog().all().to_vec(), activity);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    bail!(
        "TUI mode not available. Rebuild with `cargo build --features tui` \
         or use the API: `cargo run --bin points-server --features server`"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use behavior_points::ValidationError;

    #[test]
    fn test_exit_code_for_pending_confirmation() {
        let pending: anyhow::Error = ServiceError::ConfirmationRequired {
            behavior: "Infração Grave".to_string(),
            student: "Alex Johnson".to_string(),
            points: 100,
        }
        .into();
        assert_eq!(exit_code(&pending), 2);

        let invalid: anyhow::Error = ServiceError::from(ValidationError::MissingSelection).into();
        assert_eq!(exit_code(&invalid), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("Unknown command: nope")), 1);
    }
}
