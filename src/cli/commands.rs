//! CLI command structure definitions using clap

use clap::{Args, Parser, Subcommand};

/// lazydispatch - dispatch and track GitHub Actions workflows
#[derive(Parser)]
#[command(name = "lazydispatch", version, about)]
pub struct Cli {
    /// Repository in owner/repo form (default: detected from origin)
    #[arg(long, global = true, env = "LAZYDISPATCH_REPO")]
    pub repo: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List and dispatch workflows
    Workflow(WorkflowArgs),
    /// List and run workflow chains
    Chain(ChainArgs),
    /// Show past invocations ranked by frecency
    History(HistoryArgs),
    /// Show cached or freshly fetched logs of a chain run
    Logs(LogsArgs),
}

#[derive(Args)]
pub struct WorkflowArgs {
    #[command(subcommand)]
    pub command: WorkflowCommand,
}

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// List workflows and whether they can be dispatched
    List,
    /// Dispatch a workflow and optionally watch the run
    Dispatch {
        /// Workflow filename, e.g. deploy.yml
        workflow: String,
        /// Branch to run on (default: current branch)
        #[arg(long)]
        branch: Option<String>,
        /// Input as key=value; repeatable
        #[arg(short = 'f', long = "field", value_parser = parse_key_val)]
        inputs: Vec<(String, String)>,
        /// Keep polling until the run completes
        #[arg(long)]
        watch: bool,
    },
    /// Watch an existing run until it completes
    Watch {
        /// Numeric run ID
        run_id: u64,
    },
}

#[derive(Args)]
pub struct ChainArgs {
    #[command(subcommand)]
    pub command: ChainCommand,
}

#[derive(Subcommand)]
pub enum ChainCommand {
    /// List chains defined in .github/lazydispatch.yml
    List,
    /// Execute a chain
    Run {
        /// Chain name
        chain: String,
        /// Branch to run on (default: current branch)
        #[arg(long)]
        branch: Option<String>,
        /// Chain variable as name=value; repeatable
        #[arg(long = "var", value_parser = parse_key_val)]
        variables: Vec<(String, String)>,
        /// Resume at this step index, reusing prior results from history
        #[arg(long)]
        resume_from: Option<usize>,
    },
}

#[derive(Args)]
pub struct HistoryArgs {
    /// Restrict to one workflow filename
    #[arg(long)]
    pub workflow: Option<String>,
    /// Maximum entries to show
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args)]
pub struct LogsArgs {
    /// Chain name the run belongs to
    pub chain: String,
    /// Numeric run ID
    pub run_id: u64,
    /// Workflow filename of the run (used when refetching)
    #[arg(long, default_value = "")]
    pub workflow: String,
    /// Show only error lines
    #[arg(long)]
    pub errors_only: bool,
    /// Highlight lines matching this term
    #[arg(long)]
    pub search: Option<String>,
    /// Keep streaming new lines until the run completes
    #[arg(long)]
    pub follow: bool,
}

/// Parse a `key=value` argument.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("'{s}' is not of the form key=value"))
}
