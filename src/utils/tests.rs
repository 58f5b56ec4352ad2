use crate::utils::{create_parent_dir, get_delimiter, read_table, write_table};

use color_eyre::eyre::{Report, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, PartialEq, Serialize)]
struct Row {
    contig: String,
    position: u64,
    score: Option<f64>,
}

#[test]
fn delimiter_by_extension() -> Result<(), Report> {
    assert_eq!(get_delimiter(&"calls.tsv")?, b'\t');
    assert_eq!(get_delimiter(&"bismark.cov")?, b'\t');
    assert_eq!(get_delimiter(&"table.csv")?, b',');
    assert!(get_delimiter(&"calls.parquet").is_err());
    Ok(())
}

#[test]
fn table_keeps_missing_values() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("rows.csv");
    let rows = vec![
        Row { contig: "chr1".into(), position: 10, score: Some(-2.75) },
        Row { contig: "chr1".into(), position: 12, score: None },
    ];
    write_table(&path, &rows)?;
    assert_eq!(read_table::<Row, _>(&path)?, rows);
    Ok(())
}

#[test]
fn empty_table_reads_back_empty() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("rows.tsv");
    write_table::<Row, _>(&path, &[])?;
    assert_eq!(std::fs::read_to_string(&path)?, "contig\tposition\tscore\n");
    assert!(read_table::<Row, _>(&path)?.is_empty());
    Ok(())
}

#[test]
fn parent_dir_created_once() -> Result<(), Report> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("a").join("b").join("file.tsv");
    create_parent_dir(&path)?;
    create_parent_dir(&path)?;
    assert!(dir.path().join("a").join("b").is_dir());
    create_parent_dir(&"relative.tsv")?;
    Ok(())
}
