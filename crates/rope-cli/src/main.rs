use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use crate::commands::ExitStatus;

mod commands;
mod logging;
mod project;

#[derive(Parser)]
#[command(name = "rope", version)]
#[command(about = "Rope is a tool for managing Python dependencies 🧩")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    quiet: bool,

    /// Use verbose output.
    #[arg(global = true, long, short, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new rope project in the current directory.
    Init,
    /// Install and add one or more dependencies.
    Add(AddArgs),
    /// Remove one or more dependencies.
    Remove(RemoveArgs),
    /// Inspect the current dependencies.
    Show,
    /// Export the resolved dependencies in a format pip understands.
    Export,
    /// Inspect and clear the artifact cache.
    Cache,
    /// Print the configured PYTHONPATH.
    Pythonpath,
    /// Run a command with PYTHONPATH configured.
    Run(RunArgs),
    /// Show the rope version.
    Version,
    #[command(hide = true)]
    Install(AddArgs),
}

#[derive(Args)]
struct AddArgs {
    /// Abort the command after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// The dependency specifications to add, e.g. `requests==2.24.0`.
    #[arg(required = true, value_name = "SPEC")]
    packages: Vec<String>,
}

#[derive(Args)]
struct RemoveArgs {
    /// Reserved until `remove` is implemented.
    #[allow(dead_code)]
    #[arg(required = true, value_name = "NAME")]
    packages: Vec<String>,
}

#[derive(Args)]
struct RunArgs {
    /// The command to run, followed by its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::setup(if cli.quiet {
        logging::Level::Quiet
    } else if cli.verbose {
        logging::Level::Verbose
    } else {
        logging::Level::Default
    });

    let result = match cli.command {
        Commands::Init => commands::init(),
        Commands::Add(args) => commands::add(args.timeout, &args.packages).await,
        Commands::Remove(_) | Commands::Show | Commands::Cache => {
            Err(anyhow::anyhow!("not implemented"))
        }
        Commands::Export => commands::export().await,
        Commands::Pythonpath => commands::pythonpath().await,
        Commands::Run(args) => commands::run(&args.command).await,
        Commands::Version => {
            println!("rope version: {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitStatus::Success)
        }
        Commands::Install(_) => {
            println!("did you mean: 'rope add'?");
            Ok(ExitStatus::Usage)
        }
    };

    match result {
        Ok(status) => status.into(),
        Err(err) => {
            eprintln!("{}: {err:#}", "error".red().bold());
            ExitStatus::Failure.into()
        }
    }
}
