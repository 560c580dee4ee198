//! mssql-pg-mirror CLI - mirror SQL Server tables into PostgreSQL.

use clap::{Parser, Subcommand};
use mssql_pg_mirror::error::{EXIT_SOURCE_ERROR, EXIT_TARGET_ERROR, EXIT_TRANSFER_ERROR};
use mssql_pg_mirror::orchestrator::PlanStatus;
use mssql_pg_mirror::{Config, MigrateError, Orchestrator, TableStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mssql-pg-mirror")]
#[command(about = "Mirror SQL Server tables into PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and reload every enabled table
    Run {
        /// Dry run: resolve columns and show queries without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate configuration without connecting
    Validate,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run { dry_run: true } => {
            let plans = Orchestrator::new(config).plan().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plans)?);
            } else {
                println!("Dry run plan:");
                for plan in &plans {
                    let target = format!("{}.{} -> {}", plan.schema, plan.table, plan.target_table);
                    match &plan.status {
                        PlanStatus::Ready => {
                            println!("  [{}] {}", plan.source, target);
                            if let Some(query) = &plan.query {
                                println!("    {}", query);
                            }
                        }
                        PlanStatus::SkippedEmpty => {
                            println!("  [{}] {} (skipped: no columns)", plan.source, target)
                        }
                        PlanStatus::SkippedDisabled => {
                            println!("  [{}] {} (skipped: disabled)", plan.source, target)
                        }
                        PlanStatus::Failed { cause } => {
                            println!("  [{}] {} (error: {})", plan.source, target, cause)
                        }
                    }
                }
            }

            if plans.iter().any(|p| matches!(p.status, PlanStatus::Failed { .. })) {
                return Ok(ExitCode::from(EXIT_TRANSFER_ERROR));
            }
        }

        Commands::Run { dry_run: false } => {
            let report = Orchestrator::new(config).run().await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nMirror completed!");
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!(
                    "  Tables: {} completed, {} skipped, {} failed",
                    report.tables_completed, report.tables_skipped, report.tables_failed
                );
                println!("  Rows: {}", report.rows_transferred);
                for result in &report.results {
                    if let TableStatus::Failed { cause } = &result.status {
                        println!(
                            "  Failed: {}:{}.{}: {}",
                            result.source, result.schema, result.table, cause
                        );
                    }
                }
            }

            if report.has_failures() {
                return Ok(ExitCode::from(EXIT_TRANSFER_ERROR));
            }
        }

        Commands::Validate => {
            let problems = config.table_problems();
            if problems.is_empty() {
                let tables: usize = config.sources.iter().map(|s| s.tables.len()).sum();
                println!(
                    "Configuration is valid: {} sources, {} tables",
                    config.sources.len(),
                    tables
                );
            } else {
                for problem in &problems {
                    println!("  {}", problem);
                }
                return Err(MigrateError::Config(format!(
                    "{} table entries are invalid",
                    problems.len()
                )));
            }
        }

        Commands::HealthCheck => {
            let result = Orchestrator::new(config).health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                for endpoint in std::iter::once(&result.destination).chain(&result.sources) {
                    println!(
                        "  {} ({}): {}",
                        endpoint.name,
                        endpoint.address,
                        if endpoint.connected { "OK" } else { "FAILED" }
                    );
                    if let Some(ref err) = endpoint.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy() { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.destination.connected {
                return Ok(ExitCode::from(EXIT_TARGET_ERROR));
            }
            if !result.healthy() {
                return Ok(ExitCode::from(EXIT_SOURCE_ERROR));
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
