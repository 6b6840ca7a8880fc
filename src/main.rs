mod cli;
mod commands;
mod config;
mod paths;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Overrides;
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    /// Settings given on the command line
    pub overrides: Overrides,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            if let Some(advice) = advice(&e) {
                ui::dim(advice);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        quiet: cli.quiet,
        overrides: Overrides {
            url: cli.url,
            token: cli.token,
            retries: cli.retries,
            schema: cli.schema,
            min_version: cli.min_version,
        },
    };

    match cli.command {
        Command::Apply(args) => commands::objects::apply(&ctx, args),
        Command::Diff(args) => commands::objects::diff(&ctx, args),
        Command::Read(args) => commands::objects::read(&ctx, args),
        Command::Delete(args) => commands::objects::delete(&ctx, args),
        Command::Schema { object_type } => commands::schema::run(&ctx, object_type.as_deref()),
        Command::Version => commands::version::run(&ctx),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "opconverge", &mut io::stdout());
            Ok(())
        }
    }
}

/// Advice for the first engine error in the chain.
fn advice(err: &anyhow::Error) -> Option<&'static str> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<converge::Error>())
        .map(|e| e.category().advice())
}
