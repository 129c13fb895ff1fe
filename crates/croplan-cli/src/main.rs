mod config;
mod plan_cmds;
mod weather_cmd;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use croplan_core::engine::Objective;
use croplan_db::pool;

use config::CroplanConfig;

#[derive(Parser)]
#[command(
    name = "croplan",
    about = "Cultivation plan reconciliation and weather-prediction cache"
)]
struct Cli {
    /// Database URL (overrides CROPLAN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a croplan config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/croplan")]
        db_url: String,
        /// Path to the agrr executable
        #[arg(long, default_value = "agrr")]
        agrr_path: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create the croplan database if needed and run migrations
    DbInit,
    /// Plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Weather prediction cache
    Weather {
        #[command(subcommand)]
        command: WeatherCommands,
    },
    /// Print shell completions to stdout
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Create a plan with its fields and crops from a TOML file
    Create {
        /// Path to the plan TOML file
        file: String,
    },
    /// Show plan details (or list all plans)
    Show {
        /// Plan ID to show (omit to list all)
        plan_id: Option<String>,
    },
    /// Print the current allocation snapshot as JSON
    Snapshot {
        plan_id: String,
    },
    /// Reconcile the plan against an optimizer proposal JSON file
    Reconcile {
        plan_id: String,
        /// Path to the proposal JSON file
        file: String,
    },
    /// Apply moves from a JSON file and re-optimize with agrr
    Adjust {
        plan_id: String,
        /// Path to the moves JSON file
        file: String,
        /// Optimization objective: maximize_profit or minimize_cost
        #[arg(long, default_value_t = Objective::MaximizeProfit)]
        objective: Objective,
    },
}

#[derive(Subcommand)]
pub enum WeatherCommands {
    /// Resolve weather for a plan, reusing or regenerating its cache
    Resolve {
        plan_id: String,
        /// Last date the series must cover (YYYY-MM-DD)
        #[arg(long)]
        until: chrono::NaiveDate,
        /// Print the resolved series as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Execute `croplan init`: write the config file.
fn cmd_init(db_url: &str, agrr_path: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: Some(db_url.to_string()),
        },
        engine: config::EngineSection {
            agrr_path: Some(agrr_path.to_string()),
            timeout_secs: Some(600),
        },
        horizon: config::HorizonSection {
            lookahead_years: Some(0),
        },
        weather: config::WeatherSection {
            model: Some(croplan_core::weather::DEFAULT_MODEL.to_string()),
        },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  engine.agrr_path = {agrr_path}");
    println!();
    println!("Next: run `croplan db-init` to create and migrate the database.");

    Ok(())
}

/// Execute `croplan db-init`: create the database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = CroplanConfig::resolve(cli_db_url)?;

    println!("Initializing croplan database...");

    if pool::ensure_database_exists(&resolved.db_config).await? {
        println!("Created database {}.", resolved.db_config.database_name().unwrap_or("croplan"));
    }
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("croplan db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            agrr_path,
            force,
        } => {
            cmd_init(&db_url, &agrr_path, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Plan { command } => {
            let resolved = CroplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_plan_command(command, &db_pool, &resolved).await;
            db_pool.close().await;
            result?;
        }
        Commands::Weather { command } => {
            let resolved = CroplanConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match command {
                WeatherCommands::Resolve {
                    plan_id,
                    until,
                    json,
                } => weather_cmd::run_resolve(&db_pool, &resolved, &plan_id, until, json).await,
            };
            db_pool.close().await;
            result?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "croplan", &mut std::io::stdout());
        }
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn adjust_parses_objective() {
        let cli = Cli::try_parse_from([
            "croplan",
            "plan",
            "adjust",
            "00000000-0000-0000-0000-000000000000",
            "moves.json",
            "--objective",
            "minimize_cost",
        ])
        .expect("should parse");
        match cli.command {
            Commands::Plan {
                command: PlanCommands::Adjust { objective, .. },
            } => assert_eq!(objective, Objective::MinimizeCost),
            _ => panic!("expected plan adjust"),
        }
    }

    #[test]
    fn weather_resolve_requires_a_date() {
        assert!(Cli::try_parse_from(["croplan", "weather", "resolve", "x", "--until", "soon"]).is_err());
        let cli = Cli::try_parse_from(["croplan", "weather", "resolve", "x", "--until", "2026-12-31"])
            .expect("should parse");
        assert!(matches!(cli.command, Commands::Weather { .. }));
    }
}
