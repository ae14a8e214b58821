//! Main entry point for the application.
//!
//! This module loads environment variables and the system configuration,
//! initializes logging and dispatches the selected subcommand.
//!
//! The application can be started in different modes:
//! - As an HTTP API serving the query pipeline (`serve`)
//! - As a one-shot query tool (`ask`, `route`)
//! - As an inspection tool for the environment and task catalog (`env`, `tasks`, `task-info`)

mod api;
mod app;
mod cli;
mod config;
mod constants;
mod core;
mod errors;
mod event;
mod export;
mod llm;
mod utils;

use crate::app::App;
use crate::cli::{Cli, Command};
use crate::config::SystemConfig;
use crate::core::{
    ConfigEnvironment, EnvironmentSource, QueryResponse, RoutedQueryRequest, TaskQueryRequest,
    TaskRegistry,
};
use crate::errors::Error;
use crate::event::{EventSink, MemoryEventSink, TracingEventSink};
use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Main entry point that initializes and runs the application.
///
/// # Initialization steps:
/// 1. Parse CLI arguments
/// 2. Load environment variables
/// 3. Load the system configuration
/// 4. Initialize logging system
/// 5. Run the selected subcommand
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv();

    let config = match config::load_system_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            utils::init_logging(&cli.logging_level, None);
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_dir = matches!(cli.command, Command::Serve { .. }).then(|| config.paths.logs_dir.as_path());
    utils::init_logging(&cli.logging_level, log_dir);
    if let Err(e) = dotenv {
        warn!("Failed to load .env file: {}", e);
    }

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: SystemConfig) -> Result<ExitCode, Error> {
    match command {
        Command::Serve { port } => {
            let app = Arc::new(App::from_config(config, Arc::new(TracingEventSink))?);
            info!("Starting API server on port {}", port);
            api::server::launch_server(app, port).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Env => {
            let environment = ConfigEnvironment::new(config.environment, config.policy.clone());
            println!("Environment: {}", environment.current_environment().to_string().bold());
            println!(
                "allow_corporate_in_dev: {}",
                environment.policy_flags().allow_corporate_in_dev
            );
            println!("LLM: {} ({})", config.llm.provider, config.llm.mode);
            println!("Tasks directory: {}", config.paths.tasks_dir.display());
            Ok(ExitCode::SUCCESS)
        }
        Command::TaskInfo { task_id } => {
            let registry = TaskRegistry::new(config.paths.tasks_dir);
            match registry.get(&task_id) {
                Ok(task) => {
                    println!("task_id     : {}", task.id.bold());
                    println!("name        : {}", task.display_name);
                    println!("description : {}", task.description);
                    println!("task_type   : {}", task.kind);
                    println!("sources     : {}", task.sources_mode);
                    println!("research    : {}", task.research_enabled);
                    println!("postprocess : {}", task.postprocessing);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("{} {}", "Error:".red(), e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Tasks => {
            let registry = TaskRegistry::new(config.paths.tasks_dir);
            let tasks = registry.list_all();
            if tasks.is_empty() {
                println!("No valid tasks found.");
                return Ok(ExitCode::SUCCESS);
            }
            for task in &tasks {
                println!(
                    "- {} [{}] {}",
                    task.id.green().bold(),
                    task.kind.to_string().yellow(),
                    task.display_name
                );
            }
            println!("{} task(s) loaded", registry.cached_ids().len());
            Ok(ExitCode::SUCCESS)
        }
        Command::Ask {
            task_id,
            task_type,
            query,
            debug,
            trace,
        } => {
            let request = TaskQueryRequest {
                task_id,
                task_type,
                query,
                debug,
            };
            let (app, events) = build_app(config, trace)?;
            let response = app.orchestrator.run(&request).await;
            let code = exit_code(&response);
            print_outcome(&response, events.as_deref())?;
            Ok(code)
        }
        Command::Route {
            query,
            debug,
            trace,
        } => {
            let request = RoutedQueryRequest { query, debug };
            let (app, events) = build_app(config, trace)?;
            let response = app.orchestrator.run_routed(&request).await;
            let code = exit_code(&response.response);
            print_outcome(&response, events.as_deref())?;
            Ok(code)
        }
    }
}

fn build_app(
    config: SystemConfig,
    trace: bool,
) -> Result<(App, Option<Arc<MemoryEventSink>>), Error> {
    if trace {
        let events = Arc::new(MemoryEventSink::new());
        let app = App::from_config(config, events.clone())?;
        Ok((app, Some(events)))
    } else {
        let sink: Arc<dyn EventSink> = Arc::new(TracingEventSink);
        Ok((App::from_config(config, sink)?, None))
    }
}

fn exit_code(response: &QueryResponse) -> ExitCode {
    if response.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_outcome<T: Serialize>(response: &T, events: Option<&MemoryEventSink>) -> Result<(), Error> {
    println!("{}", serde_json::to_string_pretty(response)?);
    if let Some(events) = events {
        println!("{}", "Pipeline events:".bold());
        for event in events.events() {
            println!(
                "  {} {} {}",
                event.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
                event.event_type.as_str().cyan(),
                event.payload
            );
        }
    }
    Ok(())
}
