use crate::alphabet::Alphabet;
use crate::config::{Config, Control, Evaluation, RegionKind, Sample};
use crate::error::BuildError;

use color_eyre::eyre::{Report, Result};
use indoc::indoc;

const CONFIG: &str = indoc! {r#"
    {
      "work_dir": "work",
      "threads": 4,
      "references": { "ecoli": "ecoli.fasta" },
      "alphabets": ["nucleotide", "cpg"],
      "seed_models": { "r9": "r9.fofn" },
      "samples": [
        { "id": "sssi", "reads": "sssi.fasta", "reference": "ecoli", "seed": "r9", "train": true, "control": "methylated" },
        { "id": "pcr", "reads": "pcr.fasta", "reference": "ecoli", "seed": "r9", "models_from": "sssi", "control": "unmethylated", "alphabets": ["cpg"] }
      ],
      "regions": { "islands": { "path": "islands.bed", "kind": "cpg-island" } },
      "evaluations": [ { "alphabet": "cpg", "unmethylated": "pcr", "methylated": "sssi" } ]
    }
"#};

fn config() -> Result<Config, Report> {
    Ok(serde_json::from_str(CONFIG)?)
}

#[test]
fn defaults_fill_missing_fields() -> Result<(), Report> {
    let config = config()?;
    assert_eq!(config.threads, 4);
    assert_eq!(config.workers, 1);
    assert_eq!(config.call_threshold, 2.5);
    assert_eq!(config.tools.aligner, "bwa");
    assert_eq!(config.regions["islands"].kind, RegionKind::CpgIsland);
    assert_eq!(config.samples[1].control, Some(Control::Unmethylated));
    config.validate()?;
    Ok(())
}

#[test]
fn read_write_round_trip() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pipeline.json");
    let config = config()?;
    config.write(&path)?;

    let observed = Config::read(&path)?;
    assert_eq!(observed.samples, config.samples);
    assert_eq!(observed.resolve_path(&"ecoli.fasta"), dir.path().canonicalize()?.join("ecoli.fasta"));
    assert_eq!(observed.resolve_path(&"/data/x.fasta"), std::path::PathBuf::from("/data/x.fasta"));
    Ok(())
}

#[test]
fn alphabets_per_sample() -> Result<(), Report> {
    let config = config()?;
    assert_eq!(config.alphabets_of(config.sample("sssi")?), [Alphabet::Nucleotide, Alphabet::Cpg]);
    assert_eq!(config.alphabets_of(config.sample("pcr")?), [Alphabet::Cpg]);
    assert!(config.sample("NA12878").is_err());
    Ok(())
}

#[test]
fn unbound_sample_is_reported() -> Result<(), Report> {
    let registry = config()?.registry()?;
    assert_eq!(registry.reference_of("pcr")?, "ecoli");

    let error = registry.reference_of("NA12878").unwrap_err();
    assert_eq!(error.to_string(), "No reference bound for sample NA12878");
    assert!(matches!(error.downcast_ref::<BuildError>(), Some(BuildError::UnboundSample { .. })));
    Ok(())
}

#[test]
fn undeclared_reference_is_invalid() -> Result<(), Report> {
    let mut config = config()?;
    config.samples.push(Sample {
        id: "NA12878".into(),
        reads: "na12878.fasta".into(),
        reference: "human_g1k_v37".into(),
        seed: "r9".into(),
        ..Default::default()
    });
    assert!(config.registry().is_err());
    assert!(config.validate().is_err());
    Ok(())
}

#[test]
fn registry_rejects_rebinding() -> Result<(), Report> {
    let mut registry = config()?.registry()?;
    registry.declare("human", "human.fasta")?;
    assert!(registry.declare("human", "other.fasta").is_err());
    registry.bind("sssi", "ecoli")?;
    assert!(registry.bind("sssi", "human").is_err());
    assert_eq!(registry.reference_of("sssi")?, "ecoli");
    Ok(())
}

#[test]
fn validate_rejects_inconsistencies() -> Result<(), Report> {
    let mut duplicate = config()?;
    duplicate.samples.push(duplicate.samples[0].clone());
    assert!(duplicate.validate().is_err());

    let mut untrained = config()?;
    untrained.samples[0].train = false;
    assert!(untrained.validate().is_err());

    let mut nucleotide = config()?;
    nucleotide.evaluations = vec![Evaluation {
        alphabet: Alphabet::Nucleotide,
        unmethylated: "pcr".into(),
        methylated: "sssi".into(),
    }];
    assert!(nucleotide.validate().is_err());

    let mut workers = config()?;
    workers.workers = 0;
    assert!(workers.validate().is_err());

    let mut threshold = config()?;
    threshold.call_threshold = f64::NAN;
    assert!(threshold.validate().is_err());

    let mut dotted = config()?;
    let islands = dotted.regions.remove("islands").ok_or_else(|| color_eyre::eyre::eyre!("no islands"))?;
    dotted.regions.insert("cpg.islands".into(), islands);
    assert!(dotted.validate().is_err());
    Ok(())
}

#[test]
fn version_requirement() -> Result<(), Report> {
    let mut config = config()?;
    config.requires = Some("*".into());
    config.check_version()?;
    config.requires = Some("<0.0.1".into());
    assert!(config.check_version().is_err());
    config.requires = Some("not a version".into());
    assert!(config.check_version().is_err());
    Ok(())
}
