//! Grafema CLI entry point.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "grafema")]
#[command(about = "Typed code property graph for JavaScript/TypeScript projects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the project and build the graph
    Analyze {
        /// Clear the graph and reanalyze everything
        #[arg(short, long)]
        force: bool,

        /// Restrict analysis to one service
        #[arg(short, long)]
        service: Option<String>,

        /// Worker count (0 = logical CPUs, capped at 16)
        #[arg(short, long, default_value = "0")]
        workers: usize,

        /// Diagnostics output format
        #[arg(long, default_value = "text", value_parser = ["text", "json", "csv"])]
        format: String,

        /// Save a graph snapshot under this name after analysis
        #[arg(long)]
        snapshot: Option<String>,
    },
    /// Analyze, then start the query API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "7433")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
    /// Analyze, then check guarantees (or one ad-hoc rule)
    Check {
        /// Evaluate a single Datalog rule instead of stored guarantees
        #[arg(long)]
        rule: Option<String>,

        /// Show every diagnostic, bypassing the suppression threshold
        #[arg(long)]
        verbose_report: bool,
    },
    /// Clear the .grafema state directory
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("grafema={log_level}")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("grafema v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("project root: {}", cli.root.display());

    let exit_code = match cli.command {
        Commands::Analyze {
            force,
            service,
            workers,
            format,
            snapshot,
        } => commands::analyze(cli.root, force, service, workers, &format, snapshot).await?,
        Commands::Serve { port, host } => {
            commands::serve(cli.root, host, port).await?;
            0
        }
        Commands::Check {
            rule,
            verbose_report,
        } => commands::check(cli.root, rule, verbose_report).await?,
        Commands::Clear => {
            commands::clear(cli.root)?;
            0
        }
        Commands::Version => {
            println!("grafema v{}", env!("CARGO_PKG_VERSION"));
            0
        }
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
