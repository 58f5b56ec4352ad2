use crate::alphabet::Alphabet;
use crate::config::Control;
use crate::model::{write_manifest, ModelRole, PoreModel};
use crate::training::*;
use crate::utils::{read_table, write_table};

use color_eyre::eyre::{Report, Result};
use std::path::{Path, PathBuf};

fn seed_model() -> String {
    let mut model = String::from("#kmer_size\t2\n");
    for (i, kmer) in Alphabet::Nucleotide.kmers(2).iter().enumerate() {
        model.push_str(&format!("{kmer}\t{}.0\t1.5\t0.9\t0.25\n", 50 + i));
    }
    model
}

/// Trained rows shifted from the seed by `shifts[i]` for the i-th k-mer, 0 otherwise.
fn trained_rows(role: ModelRole, shifts: &[f64]) -> Vec<SummaryRow> {
    Alphabet::Nucleotide
        .kmers(2)
        .into_iter()
        .enumerate()
        .map(|(i, kmer)| {
            let shift = shifts.get(i).copied().unwrap_or_default();
            SummaryRow {
                model: role.short().to_string(),
                kmer,
                level_mean: 50.0 + i as f64 + shift,
                level_stdv: 1.4,
                num_events: 10,
                was_trained: u8::from(i % 2 == 0),
            }
        })
        .collect()
}

fn write_seed(dir: &Path, roles: usize) -> Result<PathBuf, Report> {
    let models = (0..roles)
        .map(|role| {
            let path = dir.join(format!("seed.nucleotide.{role}.model"));
            std::fs::write(&path, seed_model())?;
            Ok(path)
        })
        .collect::<Result<Vec<_>, Report>>()?;
    let manifest = dir.join("seed.nucleotide.fofn");
    write_manifest(&manifest, &models)?;
    Ok(manifest)
}

#[test]
fn diff_cuts_are_inclusive() -> Result<(), Report> {
    let seed = PoreModel::parse(&seed_model())?;
    let rows = trained_rows(ModelRole::Template, &[0.1, -0.5, 0.99, 2.0, 4.5, -4.0]);
    let sample = TrainedSample {
        sample: "ecoli.sssi".into(),
        control: Some(Control::Methylated),
        alphabet: Alphabet::Nucleotide,
        summary: PathBuf::new(),
        seed: PathBuf::new(),
    };

    let row = summarise_model(&sample, ModelRole::Template, &rows, &seed)?;
    assert_eq!(row.model, "t");
    assert_eq!(row.total_kmers, 16);
    assert_eq!(row.total_events, 160);
    assert_eq!(row.trained_kmers, 8);
    assert_eq!((row.d0_1, row.d0_5, row.d1_0, row.d2_0, row.d4_0), (6, 5, 3, 3, 2));
    Ok(())
}

#[test]
fn kmer_count_mismatch() -> Result<(), Report> {
    let seed = PoreModel::parse(&seed_model())?;
    let mut rows = trained_rows(ModelRole::Template, &[]);
    rows.pop();
    let sample = TrainedSample {
        sample: "ecoli.sssi".into(),
        control: None,
        alphabet: Alphabet::Nucleotide,
        summary: PathBuf::new(),
        seed: PathBuf::new(),
    };
    assert!(summarise_model(&sample, ModelRole::Template, &rows, &seed).is_err());

    rows.push(SummaryRow { kmer: "NN".into(), ..rows[0].clone() });
    assert!(summarise_model(&sample, ModelRole::Template, &rows, &seed).is_err());
    Ok(())
}

#[test]
fn report_from_files() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let seed = write_seed(dir.path(), 2)?;
    let summary = dir.path().join("ecoli.sssi.nucleotide.trained.summary.tsv");
    let mut rows = trained_rows(ModelRole::ComplementPop1, &[]);
    rows.extend(trained_rows(ModelRole::Template, &[1.0]));
    write_table(&summary, &rows)?;

    let sample = TrainedSample {
        sample: "ecoli.sssi".into(),
        control: Some(Control::Methylated),
        alphabet: Alphabet::Nucleotide,
        summary,
        seed,
    };
    let output = dir.path().join("training.nucleotide.tsv");
    training_report(&[sample], &output)?;

    let report: Vec<TrainingRow> = read_table(&output)?;
    assert_eq!(report.len(), 2);
    assert_eq!(report[0].model, "t");
    assert_eq!(report[0].d1_0, 1);
    assert_eq!(report[1].model, "c.p1");
    assert_eq!(report[1].d0_1, 0);
    assert_eq!(report[1].control, Some(Control::Methylated));

    let markdown = to_markdown(&report);
    assert_eq!(markdown.lines().count(), 4);
    Ok(())
}

#[test]
fn summary_without_seed_role() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let seed = write_seed(dir.path(), 1)?;
    let summary = dir.path().join("summary.tsv");
    write_table(&summary, &trained_rows(ModelRole::ComplementPop2, &[]))?;

    let sample = TrainedSample {
        sample: "ecoli.sssi".into(),
        control: None,
        alphabet: Alphabet::Nucleotide,
        summary,
        seed,
    };
    assert!(summarise(&sample).is_err());
    Ok(())
}
