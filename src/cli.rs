use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "histq",
    version = env!("HISTQ_BUILD_VERSION"),
    about = "Ask plain-language questions about your shell history"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a question about your command history
    Ask {
        /// Print the generated SQL to stderr
        #[arg(long, default_value_t = false)]
        show_sql: bool,
        /// The question, e.g. "which git commands failed last week?"
        #[arg(trailing_var_arg = true)]
        words: Vec<String>,
    },

    /// Append one command to the history (called by shell hooks)
    Record {
        #[arg(long)]
        command: String,
        #[arg(long, default_value = "")]
        cwd: String,
        #[arg(long, default_value_t = 0)]
        exit_code: i32,
        /// Unix seconds; defaults to now
        #[arg(long)]
        timestamp: Option<i64>,
        #[arg(long, default_value_t = 0)]
        duration_ms: i64,
        #[arg(long, default_value = "")]
        session: String,
        #[arg(long, default_value = "")]
        shell: String,
        #[arg(long)]
        git_branch: Option<String>,
    },

    /// Show aggregate history statistics
    Stats,

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the config file path
    Path,
}
