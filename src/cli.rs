use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command line interface for the application
#[derive(Parser)]
#[command(name = "ragdesk", version, about = "Task-routed retrieval-augmented help desk")]
pub struct Cli {
    /// Path to the system configuration file
    #[arg(short, long, default_value = "config/system.yaml")]
    pub config: PathBuf,

    /// Sets the logging verbosity level for the application
    /// Possible values: "error", "warn", "info", "debug", "trace"
    /// Default: "info"
    #[arg(long, default_value_t = String::from("info"))]
    pub logging_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
    /// Show the effective environment and policy flags
    Env,
    /// Show the definition of one task
    TaskInfo {
        task_id: String,
    },
    /// List the valid tasks found in the tasks directory
    Tasks,
    /// Answer a query with an explicit task
    Ask {
        #[arg(long)]
        task_id: String,
        #[arg(long, default_value = "demo")]
        task_type: String,
        #[arg(short, long)]
        query: String,
        /// Include fragments and prompt in the output
        #[arg(long)]
        debug: bool,
        /// Print the pipeline events after the answer
        #[arg(long)]
        trace: bool,
    },
    /// Let the classifier pick the task, then answer
    Route {
        #[arg(short, long)]
        query: String,
        #[arg(long)]
        debug: bool,
        #[arg(long)]
        trace: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ask_defaults() {
        let cli = Cli::parse_from(["ragdesk", "ask", "--task-id", "demo_hello", "-q", "hi"]);
        assert_eq!(cli.config, PathBuf::from("config/system.yaml"));
        match cli.command {
            Command::Ask {
                task_id,
                task_type,
                query,
                debug,
                trace,
            } => {
                assert_eq!(task_id, "demo_hello");
                assert_eq!(task_type, "demo");
                assert_eq!(query, "hi");
                assert!(!debug && !trace);
            }
            _ => panic!("expected ask"),
        }
    }
}
