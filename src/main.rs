//! OpsDesk CLI
//!
//! Command-line front end over the task commands. Every subcommand prints the
//! `CommandResponse` as pretty JSON on stdout; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use opsdesk::commands;
use opsdesk::models::response::CommandResponse;
use opsdesk::models::settings::SettingsUpdate;
use opsdesk::state::{build_completion_client, AppState};
use opsdesk::storage::ConfigService;
use opsdesk::utils::paths::resolve_data_dir;

#[derive(Parser)]
#[command(name = "opsdesk")]
#[command(about = "OpsDesk - AI-planned IT operations tasks", long_about = None)]
struct Cli {
    /// Data directory (defaults to $OPSDESK_DATA_DIR, then ~/.opsdesk)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a new task from a description
    Create {
        description: String,
        /// Task context as a JSON object
        #[arg(long)]
        context: Option<String>,
    },
    /// List active tasks
    List {
        /// Print one summary row per task instead of full records
        #[arg(long)]
        summary: bool,
    },
    /// Show one task from active tasks or history
    Show { task_id: String },
    /// Execute a task's remaining steps
    Execute { task_id: String },
    /// Move an active task to history
    Archive { task_id: String },
    /// List archived tasks
    History,
    /// Show or update settings
    Config {
        #[arg(long)]
        model: Option<String>,
        /// Chat-completions URL; pass an empty string to reset
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        log_level: Option<String>,
    },
    /// Report service health
    Health,
}

fn init_tracing(fallback_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn emit<T: Serialize>(response: CommandResponse<T>) -> Result<ExitCode> {
    let rendered =
        serde_json::to_string_pretty(&response).context("failed to render command response")?;
    println!("{}", rendered);
    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let data_dir = resolve_data_dir(cli.data_dir.as_deref())?;
    let config = ConfigService::load_or_create(&data_dir)
        .with_context(|| format!("failed to load config from {}", data_dir.display()))?;
    let effective = config.effective_config();
    init_tracing(&effective.log_level);

    let state = Arc::new(AppState::new());
    let client = build_completion_client(&effective)?;
    state.initialize_with(config, client).await?;

    {
        let state = state.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received");
                state.cancel_all();
            }
        });
    }

    match cli.command {
        Commands::Create {
            description,
            context,
        } => emit(commands::create_task(description, context, &state).await),
        Commands::List { summary: true } => emit(commands::list_task_summaries(&state).await),
        Commands::List { summary: false } => emit(commands::list_active_tasks(&state).await),
        Commands::Show { task_id } => emit(commands::get_task(task_id, &state).await),
        Commands::Execute { task_id } => emit(commands::execute_task(task_id, &state).await),
        Commands::Archive { task_id } => emit(commands::archive_task(task_id, &state).await),
        Commands::History => emit(commands::get_task_history(&state).await),
        Commands::Config {
            model,
            base_url,
            temperature,
            max_tokens,
            log_level,
        } => {
            let update = SettingsUpdate {
                model,
                base_url,
                max_tokens,
                temperature,
                log_level,
            };
            emit(commands::update_settings(update, &state).await)
        }
        Commands::Health => emit(commands::get_health(&state).await),
    }
}
