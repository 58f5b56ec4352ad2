use clap::Parser;
use color_eyre::eyre::{Report, Result};
use nanometh::cli::{self, Cli, Command};

fn main() -> Result<(), Report> {
    // ------------------------------------------------------------------------
    // CLI Setup

    // Parse CLI parameters
    let args = Cli::parse();

    // initialize color_eyre crate for colorized logs
    color_eyre::install()?;

    // Set logging/verbosity level via RUST_LOG
    std::env::set_var("RUST_LOG", args.verbosity.to_string());

    // initialize env_logger crate for logging/verbosity level
    env_logger::init();

    match args.command {
        Command::Run(args) => {
            let report = cli::run(&args)?;
            report.built.iter().for_each(|artifact| println!("{artifact}"));
        }
        Command::Plan(args) => println!("{}", cli::plan(&args)?),
        Command::ExpandReference(args) => cli::expand_reference_file(&args)?,
        Command::ExpandModel(args) => cli::expand_models(&args)?,
        Command::Aggregate(args) => cli::aggregate(&args)?,
        Command::Evaluate(args) => println!("{:.4}", cli::evaluate(&args)?),
        Command::TrainingTable(args) => {
            if let Some(table) = cli::training_table(&args)? {
                println!("{table}");
            }
        }
    }

    Ok(())
}
