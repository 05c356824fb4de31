use buildot::app::App;
use buildot::config::Settings;
use buildot::errors::AdapterError;
use buildot::mcp::help::{catalog_summary, describe_operation};
use buildot::services::logger::LogLevel;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "buildot")]
#[command(about = "Stdio MCP gateway for the building Data API and EMS API")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Data API base address (overrides DATA_API_BASE)
    #[arg(long, global = true)]
    data_api_base: Option<String>,

    /// EMS API base address (overrides EMS_API_BASE)
    #[arg(long, global = true)]
    ems_api_base: Option<String>,

    /// error, warn, info or debug (overrides BUILDOT_LOG_LEVEL)
    #[arg(long, global = true, env = "BUILDOT_LOG_LEVEL")]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve JSON-RPC over stdin/stdout (default)
    Serve,
    /// Print the operation catalog grouped by backend and module
    Operations,
    /// Print one operation's route, body shape and parameters
    Describe { name: String },
    /// Print adapter health without contacting any backend
    Health,
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

fn fail(err: &AdapterError) -> ! {
    eprintln!("buildot: {}", err);
    if let Some(hint) = err.hint() {
        eprintln!("hint: {}", hint);
    }
    std::process::exit(match err {
        AdapterError::UnknownOperation { .. } => 2,
        _ => 1,
    });
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match Settings::from_env() {
        Ok(settings) => settings
            .with_data_api_base(cli.data_api_base)
            .with_ems_api_base(cli.ems_api_base)
            .with_log_level(cli.log_level),
        Err(err) => fail(&err),
    };
    let app = match App::initialize(settings) {
        Ok(app) => app,
        Err(err) => fail(&err),
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            if let Err(err) = buildot::mcp::server::run_stdio(app).await {
                eprintln!("buildot: {}", err);
                std::process::exit(1);
            }
        }
        Command::Operations => print_json(&json!({
            "operations": app.catalog.len(),
            "catalog": catalog_summary(&app.catalog, None),
        })),
        Command::Describe { name } => match app.catalog.resolve(&name) {
            Ok(op) => print_json(&describe_operation(&app.catalog, op)),
            Err(err) => fail(&err),
        },
        Command::Health => print_json(&app.health()),
    }
}
