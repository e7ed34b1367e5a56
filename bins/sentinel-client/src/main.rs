mod commands;
mod exam;
mod workspace;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{ExamArgs, RunArgs, TestSource};
use sentinel_common::api::ApiClient;
use sentinel_common::config::ClientConfig;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Test Sentinel - Proctored exam client with local grading", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/sentinel.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overrides configuration and environment
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Exam duration in milliseconds
    #[arg(long, global = true)]
    duration_ms: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check credentials and print the account role
    Login {
        #[arg(short, long)]
        user_id: String,

        #[arg(short, long)]
        password: String,
    },

    /// List the problems assigned to a student with their starter code
    Show(TestSource),

    /// Run a solution against one problem's sample or hidden tests
    Run(RunArgs),

    /// Take a timed exam; Ctrl+C submits, expiry auto-submits
    Exam(ExamArgs),
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?.with_env_overrides(|key| std::env::var(key).ok())?,
        None => ClientConfig::load_default()?,
    };

    if let Some(url) = &cli.api_url {
        config.api_base = url.trim_end_matches('/').to_string();
    }
    if let Some(duration) = cli.duration_ms {
        config.exam_duration_ms = duration;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = load_config(&cli).map_err(|e| {
        error!("Failed to load configuration: {:#}", e);
        e
    })?;
    info!(api_base = %config.api_base, "Sentinel client starting");

    let client = ApiClient::new(&config)?;

    match &cli.command {
        Commands::Login { user_id, password } => {
            commands::login(&client, user_id, password).await?;
        }
        Commands::Show(source) => {
            commands::show(&config, &client, source).await?;
        }
        Commands::Run(args) => {
            commands::run(&config, &client, args).await?;
        }
        Commands::Exam(args) => {
            commands::exam(&config, &client, args).await?;
        }
    }

    Ok(())
}
