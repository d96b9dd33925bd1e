// Library root for histq: exposes modules and the shared entry point for the binary.

pub mod ask;
pub mod cli;
pub mod config;
pub mod db;
pub mod provider;

use clap::Parser;
use cli::{Cli, Commands, ConfigAction};

use crate::ask::HistoryStore;

pub fn main_inner() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Ask { show_sql, words } => {
            if words.is_empty() {
                eprintln!("Usage: histq ask <your question>");
                std::process::exit(1);
            }
            let question = words.join(" ");

            let config = config::Config::load()?;
            // Refuse before touching the database or resolving provider keys.
            if !config.ask.enabled {
                return Err(ask::AskError::Disabled.into());
            }
            let db = db::Db::open(&config)?;
            let completer = provider::ProviderCompleter::from_config(&config)?;

            let outcome = ask::ask(&question, &config.ask, &db, &completer).await?;
            if show_sql {
                eprintln!(
                    "sql (attempt {}): {}\nrows: {} ({} skipped)",
                    outcome.attempts, outcome.sql, outcome.total_rows, outcome.skipped_rows
                );
            }
            if let Some(warning) = outcome.warning() {
                eprintln!("histq: warning: {warning}");
            }
            println!("{}", outcome.answer.trim_end());
        }

        Commands::Record {
            command,
            cwd,
            exit_code,
            timestamp,
            duration_ms,
            session,
            shell,
            git_branch,
        } => {
            let config = config::Config::load()?;
            let db = db::Db::open(&config)?;
            db.record(&db::NewCommand {
                timestamp: timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp()),
                command,
                exit_code,
                cwd,
                hostname: gethostname(),
                username: std::env::var("USER").unwrap_or_else(|_| "unknown".into()),
                shell,
                duration_ms,
                git_branch,
                hash: None,
                session_id: session,
            })?;
        }

        Commands::Stats => {
            let config = config::Config::load()?;
            let db = db::Db::open(&config)?;
            let snapshot = db.collect_stats(config.ask.top_commands)?;
            print!("{}", ask::snapshot::render_snapshot(&snapshot));
        }

        Commands::Config { action } => match action {
            ConfigAction::Path => println!("{}", config::Config::path().display()),
        },
    }
    Ok(())
}

fn gethostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.is_empty() {
            return name;
        }
    }
    std::process::Command::new("hostname")
        .output()
        .ok()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".into())
}
