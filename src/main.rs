//! Prism Federation - Main Entry Point
//!
//! Plans (and optionally runs) federated queries over the tables of a JSON
//! catalog, either once from the command line or in an interactive shell.

use anyhow::{bail, Context};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::process;
use tracing::Level;

use prism_federation::common::constants::{DEFAULT_OUTPUT_FORMAT, HISTORY_FILE_NAME};
use prism_federation::{FederatedDatabase, FederationError, PlannerConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> anyhow::Result<Self> {
        match value.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => bail!("invalid format '{}', use text or json", other),
        }
    }
}

struct Settings {
    execute: bool,
    format: OutputFormat,
}

fn run_interactive_mode(database: &mut FederatedDatabase, settings: &mut Settings) -> anyhow::Result<()> {
    println!("Prism Federation v{}", env!("CARGO_PKG_VERSION"));
    println!("Enter '.help' for usage hints.");
    println!("Enter SQL statements terminated with a semicolon (;)");
    println!();

    let mut rl = DefaultEditor::new()?;
    let history_file = dirs::home_dir()
        .map(|mut path| {
            path.push(HISTORY_FILE_NAME);
            path
        })
        .unwrap_or_else(|| PathBuf::from(HISTORY_FILE_NAME));
    let _ = rl.load_history(&history_file);

    let mut sql_buffer = String::new();
    loop {
        let prompt = if sql_buffer.is_empty() {
            "prism> "
        } else {
            "   ...> "
        };

        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();

                if sql_buffer.is_empty() && trimmed.starts_with('.') {
                    let _ = rl.add_history_entry(trimmed);
                    match handle_special_command(trimmed, database, settings) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => eprintln!("Error: {}", e),
                    }
                    continue;
                }

                if trimmed.is_empty() {
                    continue;
                }

                if !sql_buffer.is_empty() {
                    sql_buffer.push(' ');
                }
                sql_buffer.push_str(trimmed);

                if trimmed.ends_with(';') {
                    let _ = rl.add_history_entry(&sql_buffer);
                    if let Err(e) = run_statement(database, &sql_buffer, settings) {
                        eprintln!("Error: {}", e);
                    }
                    sql_buffer.clear();
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                sql_buffer.clear();
            }
            Err(ReadlineError::Eof) => {
                println!("exit");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_file);
    Ok(())
}

/// Returns `true` when the shell should exit
fn handle_special_command(
    command: &str,
    database: &mut FederatedDatabase,
    settings: &mut Settings,
) -> anyhow::Result<bool> {
    let parts: Vec<&str> = command.split_whitespace().collect();
    let cmd = parts.first().copied().unwrap_or("");

    match cmd {
        ".exit" | ".quit" => {
            println!("Goodbye!");
            return Ok(true);
        }
        ".help" => print_help(),
        ".tables" => {
            if database.registry().is_empty() {
                println!("No tables found");
            }
            for table in database.registry().tables() {
                let kind = if table.is_federated() { "federated" } else { "local" };
                println!(
                    "{:<30} {:<10} {}",
                    table.qualified_name(),
                    kind,
                    table.source.get_columns().join(", ")
                );
            }
        }
        ".execute" => {
            if let Some(setting) = parts.get(1) {
                settings.execute = setting.eq_ignore_ascii_case("on");
            }
            println!("Execute: {}", if settings.execute { "on" } else { "off" });
        }
        ".format" => {
            if let Some(format) = parts.get(1) {
                settings.format = OutputFormat::parse(format)?;
            }
            println!("Format: {:?}", settings.format);
        }
        ".set" => {
            let (Some(key), Some(value)) = (parts.get(1), parts.get(2)) else {
                bail!("usage: .set KEY VALUE");
            };
            database.set(key, value)?;
            println!("{} = {}", key, value);
        }
        ".show" => {
            println!("  execute: {}", if settings.execute { "on" } else { "off" });
            println!("   format: {:?}", settings.format);
            for (key, value) in database.config().list_all() {
                println!("  {}: {}", key, value);
            }
        }
        _ => {
            println!("Unknown command: {}", cmd);
            println!("Type '.help' for list of available commands.");
        }
    }
    Ok(false)
}

fn print_help() {
    println!(
        r#"
.help                    Show this help message
.quit                    Exit this program
.exit                    Exit this program
.tables                  List registered tables and their columns
.execute on|off          Run plans after printing them (default: off)
.format text|json        Plan output format
.set KEY VALUE           Change a planner setting
.show                    Show current settings

Settings:
  push_limit_hint       Forward LIMIT to fetches when safe (true/false)
  parallel_execution    Run independent steps concurrently (true/false)
  max_parallel_steps    Worker threads for parallel execution
  relation_prefix       Prefix of step output names

SQL Statements:
  Type SELECT statements terminated with a semicolon (;)
  Multi-line statements are supported
"#
    );
}

fn run_statement(database: &FederatedDatabase, sql: &str, settings: &Settings) -> anyhow::Result<()> {
    let sql = sql.trim().trim_end_matches(';');
    if !settings.execute {
        let plan = database.plan_sql(sql)?;
        match settings.format {
            OutputFormat::Text => print!("{}", plan),
            OutputFormat::Json => println!("{}", plan.to_json()?),
        }
        return Ok(());
    }

    let result = database.execute_sql(sql)?;
    match settings.format {
        OutputFormat::Text => {
            print!("{}", result.plan);
            println!();
            println!("{}", result.relation.to_table_string());
            println!(
                "{} row{} ({} steps, {} rows fetched, {} ms)",
                result.row_count(),
                if result.row_count() == 1 { "" } else { "s" },
                result.stats.steps_run,
                result.stats.rows_fetched,
                result.stats.elapsed_ms
            );
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "plan": result.plan,
                "result": result.relation.as_ref(),
                "stats": result.stats,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "prism-federation")]
#[command(about = "Federated SQL query planner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// JSON catalog describing the registered tables
    #[arg(short, long)]
    catalog: PathBuf,

    /// JSON planner configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQL query to plan
    #[arg(short, long)]
    query: Option<String>,

    /// Run the plan and print the result
    #[arg(short, long)]
    execute: bool,

    /// Output format: text or json
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FORMAT)]
    format: String,

    /// Run in interactive mode
    #[arg(short, long)]
    interactive: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => PlannerConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PlannerConfig::default(),
    };
    let mut database = FederatedDatabase::open(&cli.catalog)
        .with_context(|| format!("loading catalog {}", cli.catalog.display()))?
        .with_config(config);
    let mut settings = Settings {
        execute: cli.execute,
        format: OutputFormat::parse(&cli.format)?,
    };

    if let Some(query) = cli.query {
        if let Err(e) = run_statement(&database, &query, &settings) {
            eprintln!("Error: {}", e);
            let rejected = e
                .downcast_ref::<FederationError>()
                .is_some_and(FederationError::is_planning_error);
            process::exit(if rejected { 2 } else { 1 });
        }
    } else if cli.interactive {
        run_interactive_mode(&mut database, &mut settings)?;
    } else {
        eprintln!("Please provide either --query or --interactive flag");
        process::exit(1);
    }

    Ok(())
}
