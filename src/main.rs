//! nimbus: cloud cover conditions from the weather.gov forecast.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use nimbus_app::{AppError, Config};
use nimbus_conditions::{
    conditions, operations, ConditionArgs, ConditionError, ConditionEvaluator, WeatherService,
};

#[derive(Parser)]
#[command(
    name = "nimbus",
    version,
    about = "Cloud cover conditions from the weather.gov forecast"
)]
struct Cli {
    /// Configuration file (defaults to nimbus/config.toml in the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the classified forecast for the configured location as JSON.
    Forecast,

    /// Evaluate a named condition and print true or false.
    Condition {
        /// Condition name, see `nimbus conditions`.
        name: String,

        /// Cloud cover phrase, e.g. "Mostly Sunny".
        args: Vec<String>,

        /// RFC 3339 instant to evaluate at instead of now.
        #[arg(long, value_parser = parse_instant)]
        at: Option<DateTime<FixedOffset>>,
    },

    /// List the available conditions and operations.
    Conditions,
}

fn parse_instant(s: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("nimbus: {}", e.user_message());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    if let Command::Conditions = cli.command {
        return list();
    }

    let (config, validation) = Config::load_validated(cli.config.as_deref())?;
    nimbus_app::init_logging(&config.logging.level)?;
    // Validation ran before the subscriber existed.
    for warning in &validation.warnings {
        tracing::warn!("Config warning: {}", warning);
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling forecast requests");
            interrupt.cancel();
        }
    });

    let service = WeatherService::new(config.service_config());
    tracing::info!(
        "Using location {} ({})",
        service.config().coordinate,
        config.location.time_zone
    );

    match cli.command {
        Command::Forecast => {
            let operation = *operations()?
                .get("forecast")
                .ok_or_else(|| ConditionError::UnknownOperation("forecast".to_string()))?;
            let mut stdout = std::io::stdout().lock();
            service.run(operation, &mut stdout, &cancel).await?;
        }
        Command::Condition { name, args, at } => {
            let kind = *conditions()?
                .get(&name)
                .ok_or_else(|| ConditionError::UnknownCondition(name.clone()))?;

            let evaluator = ConditionEvaluator::new(service, config.time_zone()?);
            let args = ConditionArgs { due: at, args };
            let verdict = evaluator.evaluate(kind, &args, &cancel).await?;

            tracing::info!("{}: {}", name, verdict);
            println!("{}", verdict.holds);
        }
        Command::Conditions => {}
    }

    Ok(())
}

fn list() -> Result<(), AppError> {
    println!("Conditions:");
    for (name, _, help) in conditions()?.iter() {
        println!("  {:<16} {}", name, help);
    }
    println!("\nOperations:");
    for (name, _, help) in operations()?.iter() {
        println!("  {:<16} {}", name, help);
    }
    Ok(())
}
