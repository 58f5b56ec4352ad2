use crate::alphabet::Alphabet;
use crate::cli::*;
use crate::config::Control;
use crate::pipeline::tests::fixture;

use clap::Parser;
use color_eyre::eyre::{eyre, Report, Result};

#[test]
fn parse_run() -> Result<(), Report> {
    let input = ["nanometh", "run", "-c", "pipeline.json", "-t", "a.tsv", "--target", "b.tsv", "-w", "4", "--dry-run"];
    let cli = Cli::parse_from(input);
    let Command::Run(args) = cli.command else { return Err(eyre!("expected the run command")) };
    assert_eq!(args.targets, ["a.tsv", "b.tsv"]);
    assert_eq!(args.workers, Some(4));
    assert_eq!(args.threads, None);
    assert!(args.dry_run && !args.progress);
    assert_eq!(cli.verbosity, crate::Verbosity::Info);
    Ok(())
}

#[test]
fn parse_training_table() -> Result<(), Report> {
    let input = [
        "nanometh", "training-table", "-n", "ecoli.sssi", "-s", "summary.tsv", "--seed", "r9.cpg.fofn",
        "--control", "methylated", "-v", "debug",
    ];
    let cli = Cli::parse_from(input);
    let Command::TrainingTable(args) = cli.command else { return Err(eyre!("expected the training-table command")) };
    assert_eq!(args.alphabet, Alphabet::Cpg);
    assert_eq!(args.control, Some(Control::Methylated));
    assert_eq!(args.output, None);
    assert_eq!(cli.verbosity, crate::Verbosity::Debug);
    Ok(())
}

#[test]
fn missing_required_argument() {
    assert!(Cli::try_parse_from(["nanometh", "aggregate", "-s", "sites.tsv"]).is_err());
}

#[test]
fn plan_and_dry_run_from_config() -> Result<(), Report> {
    let fixture = fixture()?;
    let config = fixture.root.join("pipeline.json");
    fixture.config.write(&config)?;

    let table = plan(&PlanArgs { config: config.clone(), dot: false })?;
    let trained = table.lines().find(|line| line.starts_with("| ecoli.sssi.cpg.trained.fofn "));
    assert!(trained.is_some_and(|line| line.contains("| train ")));
    let dot = plan(&PlanArgs { config: config.clone(), dot: true })?;
    assert!(dot.starts_with("digraph"));

    let args = RunArgs { config, dry_run: true, workers: Some(2), ..Default::default() };
    let report = run(&args)?;
    assert!(report.dry_run);
    assert!(report.built.contains(&"ecoli.sssi.cpg.islands.summary.tsv".to_string()));
    assert!(!fixture.work("").exists());
    Ok(())
}
