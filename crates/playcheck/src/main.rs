use anyhow::Result;
use clap::{Parser, Subcommand};
use playcheck::config::DEFAULT_CONFIG_FILE;
use playcheck::console::ConsoleSink;
use playcheck::project::{exit_status, Project};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "playcheck",
    version,
    about = "Converge an Ansible role and verify it with testinfra"
)]
struct Cli {
    /// Project configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Debug logging; also passes --debug to testinfra
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lint the test files with flake8, then run them with testinfra
    Verify {
        /// Run tests with sudo
        #[arg(long)]
        sudo: bool,
    },
    /// Run ansible-playbook with the `ansible` section of the project file
    Converge {
        /// Do not print an ERROR line when the playbook fails
        #[arg(long)]
        hide_errors: bool,
    },
    /// Print the resolved verifier options as JSON
    ShowOptions {
        #[arg(long)]
        sudo: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let project = Project::load(&cli.config)?;
    let mut sink = ConsoleSink;

    match cli.command {
        Command::Verify { sudo } => {
            let report = project.verify(cli.debug, sudo, &mut sink)?;
            println!("{}", report.summary());
            Ok(exit_status(&report.outcome))
        }
        Command::Converge { hide_errors } => {
            let outcome = project.converge(hide_errors, &mut sink)?;
            Ok(exit_status(&outcome))
        }
        Command::ShowOptions { sudo } => {
            println!("{}", project.show_options(cli.debug, sudo)?);
            Ok(0)
        }
    }
}
