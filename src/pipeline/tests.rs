use crate::alphabet::Alphabet;
use crate::config::{BisulfiteSet, Config, Control, Evaluation, RegionKind, RegionSet, Sample, TssProfileOptions};
use crate::pipeline::*;
use crate::tools::{Action, Staging, Task};

use color_eyre::eyre::{Report, Result};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A directory of pipeline inputs, and a config with one trained sample over them.
pub(crate) struct Fixture {
    pub _dir: TempDir,
    pub root: PathBuf,
    pub config: Config,
}

impl Fixture {
    pub fn work(&self, name: &str) -> PathBuf {
        self.root.join("work").join(name)
    }
}

fn seed_model() -> String {
    let mut model = String::from("#kmer_size\t2\n");
    for (i, kmer) in Alphabet::Nucleotide.kmers(2).iter().enumerate() {
        model.push_str(&format!("{kmer}\t{}.0\t1.5\t0.9\t0.25\n", 50 + i));
    }
    model
}

pub(crate) fn fixture() -> Result<Fixture, Report> {
    let dir = tempfile::tempdir()?;
    let root = dir.path().canonicalize()?;
    std::fs::write(root.join("ecoli.fasta"), ">chr1\nACGTTCGAACGT\n")?;
    std::fs::write(root.join("sssi.fasta"), ">read_1\nACGTTCGA\n")?;
    std::fs::write(root.join("pcr.fasta"), ">read_2\nTTCGAACG\n")?;
    std::fs::write(root.join("r9.t.model"), seed_model())?;
    std::fs::write(root.join("r9.c.p1.model"), seed_model())?;
    std::fs::write(root.join("r9.nucleotide.fofn"), "r9.t.model\nr9.c.p1.model\n")?;
    std::fs::write(root.join("islands.bed"), "chr1\t0\t12\tisland_1\n")?;

    let mut config = Config::new();
    config.base_dir = root.clone();
    config.work_dir = root.join("work");
    config.references.insert("ecoli".into(), "ecoli.fasta".into());
    config.seed_models.insert("r9".into(), "r9.nucleotide.fofn".into());
    config.regions.insert("islands".into(), RegionSet { path: "islands.bed".into(), kind: RegionKind::CpgIsland });
    config.samples.push(Sample {
        id: "ecoli.sssi".into(),
        reads: "sssi.fasta".into(),
        reference: "ecoli".into(),
        seed: "r9".into(),
        train: true,
        control: Some(Control::Methylated),
        ..Default::default()
    });

    Ok(Fixture { _dir: dir, root, config })
}

/// Add an unmethylated control calling with the models trained on the first sample.
pub(crate) fn add_control(fixture: &mut Fixture) {
    fixture.config.samples.push(Sample {
        id: "ecoli.pcr".into(),
        reads: "pcr.fasta".into(),
        reference: "ecoli".into(),
        seed: "r9".into(),
        models_from: Some("ecoli.sssi".into()),
        control: Some(Control::Unmethylated),
        ..Default::default()
    });
    fixture.config.evaluations.push(Evaluation {
        alphabet: Alphabet::Cpg,
        unmethylated: "ecoli.pcr".into(),
        methylated: "ecoli.sssi".into(),
    });
}

fn names(steps: &[&Step]) -> Vec<String> {
    steps.iter().map(|step| step.name.clone()).collect()
}

#[test]
fn plan_one_sample() -> Result<(), Report> {
    let fixture = fixture()?;
    let pipeline = Pipeline::plan(&fixture.config)?;
    let root = |name: &str| fixture.root.join(name).to_string_lossy().into_owned();

    assert_eq!(pipeline.targets(), ["ecoli.sssi.cpg.islands.summary.tsv", "training.cpg.tsv"]);
    assert_eq!(pipeline.step("ecoli.sssi.cpg.sites.tsv")?.stage, Stage::Call);
    assert_eq!(
        names(&pipeline.inputs("ecoli.sssi.cpg.sites.tsv")?),
        ["ecoli.sssi.sorted.bam", "ecoli.cpg.fasta", "ecoli.sssi.cpg.trained.fofn", root("sssi.fasta").as_str()]
    );
    assert_eq!(
        names(&pipeline.inputs("ecoli.sssi.cpg.trained.fofn")?),
        [root("sssi.fasta").as_str(), "ecoli.sssi.sorted.bam", "ecoli.cpg.fasta", "r9.cpg.fofn"]
    );
    assert_eq!(names(&pipeline.inputs("ecoli.fasta.bwt")?), [root("ecoli.fasta")]);

    let trained = pipeline.step("ecoli.sssi.cpg.trained.fofn")?;
    assert_eq!(
        trained.outputs(),
        [
            fixture.work("ecoli.sssi.cpg.trained.t.model"),
            fixture.work("ecoli.sssi.cpg.trained.c.p1.model"),
            fixture.work("ecoli.sssi.cpg.trained.summary.tsv"),
            fixture.work("ecoli.sssi.cpg.trained.fofn"),
        ]
    );
    Ok(())
}

#[test]
fn nucleotide_alphabet_is_trained_but_not_called() -> Result<(), Report> {
    let mut fixture = fixture()?;
    fixture.config.alphabets = vec![Alphabet::Nucleotide, Alphabet::Cpg];
    let pipeline = Pipeline::plan(&fixture.config)?;

    assert!(pipeline.step("ecoli.nucleotide.fasta").is_ok());
    assert!(pipeline.step("ecoli.sssi.nucleotide.trained.fofn").is_ok());
    assert!(pipeline.step("ecoli.sssi.nucleotide.sites.tsv").is_err());
    assert!(pipeline.targets().contains(&"training.nucleotide.tsv".to_string()));
    Ok(())
}

#[test]
fn shared_steps_are_planned_once() -> Result<(), Report> {
    let mut fixture = fixture()?;
    add_control(&mut fixture);
    let pipeline = Pipeline::plan(&fixture.config)?;

    let indexes = pipeline.dag().get_nodes().into_iter().filter(|name| name.ends_with(".bwt")).count();
    assert_eq!(indexes, 1);
    assert_eq!(
        names(&pipeline.inputs("ecoli.pcr.cpg.sites.tsv")?)[2],
        "ecoli.sssi.cpg.trained.fofn"
    );
    Ok(())
}

#[test]
fn held_out_scoring_and_evaluation() -> Result<(), Report> {
    let mut fixture = fixture()?;
    add_control(&mut fixture);
    let pipeline = Pipeline::plan(&fixture.config)?;

    let score = pipeline.step("ecoli.pcr.cpg.heldout.summary.tsv")?;
    assert_eq!(score.stage, Stage::Score);
    let Recipe::Train { no_update, models, .. } = &score.recipe else {
        panic!("Unexpected recipe: {:?}", score.recipe);
    };
    assert!(*no_update);
    assert_eq!(models, &fixture.work("ecoli.sssi.cpg.trained.fofn"));

    let evaluation = pipeline.step("evaluation.cpg.ecoli.pcr.ecoli.sssi.roc.tsv")?;
    assert_eq!(evaluation.companions.len(), 2);
    assert_eq!(
        names(&pipeline.inputs(&evaluation.name)?),
        ["ecoli.pcr.cpg.sites.tsv", "ecoli.sssi.cpg.sites.tsv"]
    );
    // the trained sample itself is not scored
    assert!(pipeline.step("ecoli.sssi.cpg.heldout.summary.tsv").is_err());
    Ok(())
}

#[test]
fn models_from_untrained_alphabet() -> Result<(), Report> {
    let mut fixture = fixture()?;
    add_control(&mut fixture);
    fixture.config.samples[0].alphabets = Some(vec![Alphabet::Cpg]);
    fixture.config.samples[1].alphabets = Some(vec![Alphabet::Cpg, Alphabet::Nucleotide]);
    let error = Pipeline::plan(&fixture.config).err().map(|e| e.to_string()).unwrap_or_default();
    assert!(error.contains("not trained in the nucleotide alphabet"), "{error}");
    Ok(())
}

#[test]
fn bisulfite_comparison_and_tss_profile() -> Result<(), Report> {
    let mut fixture = fixture()?;
    std::fs::write(fixture.root.join("tss.bed"), "chr1\t5\t6\tgene_1\t0\t+\n")?;
    std::fs::write(fixture.root.join("sssi.cov"), "chr1\t2\t2\t100\t4\t0\n")?;
    fixture.config.regions.insert("tss".into(), RegionSet { path: "tss.bed".into(), kind: RegionKind::Tss });
    fixture.config.tss_profile = Some(TssProfileOptions { bin_width: 100, max_distance: 2000 });
    fixture.config.bisulfite.insert("bs".into(), BisulfiteSet { path: "sssi.cov".into(), sample: "ecoli.sssi".into() });
    let pipeline = Pipeline::plan(&fixture.config)?;

    assert_eq!(pipeline.step("ecoli.sssi.cpg.tss.tss_profile.tsv")?.stage, Stage::TssProfile);
    assert!(pipeline.step("ecoli.sssi.cpg.islands.tss_profile.tsv").is_err());
    assert_eq!(
        names(&pipeline.inputs("ecoli.sssi.cpg.bs.islands.comparison.tsv")?),
        ["ecoli.sssi.cpg.islands.summary.tsv", "bs.bisulfite.islands.summary.tsv"]
    );
    assert_eq!(pipeline.step("bs.bisulfite.tss.summary.tsv")?.stage, Stage::BisulfiteAggregate);
    Ok(())
}

#[test]
fn jobs_write_to_staging() -> Result<(), Report> {
    let fixture = fixture()?;
    let pipeline = Pipeline::plan(&fixture.config)?;
    let staging = Staging::new(fixture.work(".staging-test"));
    let staged = |name: &str| staging.path(name).to_string_lossy().into_owned();

    let job = pipeline.job("ecoli.fasta.bwt", &staging)?;
    assert_eq!(job.work_dir, fixture.root.join("work"));
    assert_eq!(job.outputs.last(), Some(&staging.path("ecoli.fasta.bwt")));
    let Some(Action::Exec(index)) = job.actions.first() else { panic!("Expected an invocation") };
    assert_eq!(index.program, "bwa");
    let reference = fixture.root.join("ecoli.fasta").to_string_lossy().into_owned();
    assert_eq!(index.args, ["index".to_string(), "-p".to_string(), staged("ecoli.fasta"), reference]);

    let job = pipeline.job("ecoli.sssi.cpg.sites.tsv", &staging)?;
    assert_eq!(job.outputs.len(), 4);
    let [Action::Exec(call), Action::Task(Task::SplitCalls { raw, sites, threshold, .. })] = job.actions.as_slice() else {
        panic!("Unexpected actions: {:?}", job.actions);
    };
    assert_eq!(call.args[0], "call-methylation");
    assert_eq!(call.stdout.as_deref(), Some(Path::new(&staged("ecoli.sssi.cpg.calls.tsv"))));
    assert_eq!(raw, &staging.path("ecoli.sssi.cpg.calls.tsv"));
    assert_eq!(sites, &staging.path("ecoli.sssi.cpg.sites.tsv"));
    assert_eq!(*threshold, 2.5);

    let job = pipeline.job("ecoli.sssi.cpg.trained.fofn", &staging)?;
    let args = job.actions.iter().filter_map(|a| match a {
        Action::Exec(invocation) => Some(invocation.args.join(" ")),
        Action::Task(_) => None,
    });
    let args = args.collect_vec();
    assert_eq!(args.len(), 1);
    assert!(args[0].starts_with("methyltrain -t 1 -m "));
    assert!(args[0].ends_with(&format!("--out-prefix {}", staged("ecoli.sssi.cpg.trained"))));
    Ok(())
}

#[test]
fn plan_table_and_dot() -> Result<(), Report> {
    let fixture = fixture()?;
    let pipeline = Pipeline::plan(&fixture.config)?;
    let table = pipeline.to_table()?.to_string();
    assert!(table.contains("expand-reference"));
    assert!(table.contains("ecoli.sssi.cpg.trained.fofn"));
    assert!(pipeline.to_dot()?.starts_with("digraph {"));
    Ok(())
}

#[test]
fn missing_seed_manifest() -> Result<(), Report> {
    let fixture = fixture()?;
    std::fs::remove_file(fixture.root.join("r9.nucleotide.fofn"))?;
    assert!(Pipeline::plan(&fixture.config).is_err());
    Ok(())
}

#[test]
fn region_id_repeating_a_stage_suffix() -> Result<(), Report> {
    // the aggregate of "heldout" regions has the name of the held-out score
    let mut heldout = fixture()?;
    add_control(&mut heldout);
    heldout.config.regions.insert("heldout".into(), RegionSet { path: "islands.bed".into(), kind: RegionKind::CpgIsland });
    let error = Pipeline::plan(&heldout.config).err().map(|e| e.to_string()).unwrap_or_default();
    assert!(error.contains("ecoli.pcr.cpg.heldout.summary.tsv"), "{error}");
    assert!(error.contains("score") && error.contains("aggregate"), "{error}");

    // the aggregate of "trained" regions overwrites the training summary
    let mut trained = fixture()?;
    trained.config.regions.insert("trained".into(), RegionSet { path: "islands.bed".into(), kind: RegionKind::CpgIsland });
    let error = Pipeline::plan(&trained.config).err().map(|e| e.to_string()).unwrap_or_default();
    assert!(error.contains("ecoli.sssi.cpg.trained.summary.tsv"), "{error}");
    assert!(error.contains("ecoli.sssi.cpg.trained.fofn"), "{error}");
    Ok(())
}

#[test]
fn inputs_must_be_planned_first() -> Result<(), Report> {
    let fixture = fixture()?;
    let mut pipeline = Pipeline::plan(&fixture.config)?;
    let output = fixture.work("ecoli.sssi.cpg.elsewhere.summary.tsv");
    let task = Task::Aggregate {
        sites: fixture.work("ecoli.sssi.cpg.sites.tsv"),
        regions: fixture.root.join("islands.bed"),
        threshold: 2.5,
        output: output.clone(),
    };
    let step = Step::derived(Stage::Aggregate, output, Vec::new(), Recipe::Task(task));
    let error = pipeline.add(step, &["ecoli.sssi.cpg.sites.tsv", "elsewhere.bed"]).err().map(|e| e.to_string());
    assert!(error.unwrap_or_default().contains("elsewhere.bed"));
    assert!(pipeline.step("ecoli.sssi.cpg.elsewhere.summary.tsv").is_err());
    Ok(())
}
