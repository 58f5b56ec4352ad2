//! Small file helpers shared by the in-process stages.

pub mod verbosity;

use color_eyre::eyre::{eyre, ContextCompat, Report, Result, WrapErr};
use color_eyre::Help;
use serde::de::{DeserializeOwned, Visitor};
use serde::Serialize;
use std::convert::AsRef;
use std::fmt::Debug;
use std::fs::File;
use std::path::Path;

/// Get delimiter based on file extension.
///
/// ## Arguments
///
/// - `path` - File path.
///
/// ## Examples
///
/// - `.tsv` => `\t`
/// - `.txt` => `\t`
/// - `.bed` => `\t`
/// - `.cov` => `\t`
/// - `.csv` => `,`
///
/// Note that `.txt` is assumed to be tab-delimited!
///
/// ```rust
/// use nanometh::utils::get_delimiter;
///
/// assert_eq!(get_delimiter(&"file.tsv")?, b'\t');
/// assert_eq!(get_delimiter(&"file.csv")?, b',');
/// assert_eq!(get_delimiter(&"islands.bed")?, b'\t');
/// assert!(get_delimiter(&"file").is_err());
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn get_delimiter<P>(path: &P) -> Result<u8, Report>
where
    P: AsRef<Path> + Debug,
{
    let ext = path
        .as_ref()
        .extension()
        .wrap_err_with(|| format!("Failed to get file extension: {path:?}"))?
        .to_str()
        .wrap_err_with(|| format!("Failed to convert file extension to str: {path:?}"))?;
    // convert extension to the expected delimiter
    match ext {
        "tsv" | "txt" | "bed" | "cov" => Ok(b'\t'),
        "csv" => Ok(b','),
        _ext => Err(eyre!("Unknown file extension: {_ext:?}"))
            .suggestion("Options: tsv, txt, bed, cov, or csv"),
    }
}

/// Create the parent directory of a file path, if it doesn't exist yet.
pub fn create_parent_dir<P>(path: &P) -> Result<(), Report>
where
    P: AsRef<Path> + Debug,
{
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create directory: {parent:?}"))?;
        }
    }
    Ok(())
}

/// Read every row of a delimited table with a header line.
///
/// ## Examples
///
/// ```rust
/// use nanometh::utils::{read_table, write_table};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Deserialize, PartialEq, Serialize)]
/// struct Row { kmer: String, count: u64 }
///
/// let dir  = tempfile::tempdir()?;
/// let path = dir.path().join("counts.tsv");
/// let rows = vec![Row { kmer: "ACGT".into(), count: 3 }];
/// write_table(&path, &rows)?;
/// assert_eq!(read_table::<Row, _>(&path)?, rows);
/// # Ok::<(), color_eyre::eyre::Report>(())
/// ```
pub fn read_table<T, P>(path: &P) -> Result<Vec<T>, Report>
where
    T: DeserializeOwned,
    P: AsRef<Path> + Debug,
{
    let delimiter = get_delimiter(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .wrap_err_with(|| format!("Failed to open table: {path:?}"))?;
    reader
        .deserialize::<T>()
        .enumerate()
        .map(|(i, row)| row.wrap_err_with(|| format!("Failed to parse row {} of {path:?}", i + 1)))
        .collect()
}

/// Write rows to a delimited table with a header line, creating parent directories as needed.
///
/// The header is written even if there are no rows, so empty tables still name their columns.
pub fn write_table<T, P>(path: &P, rows: &[T]) -> Result<(), Report>
where
    T: Serialize + DeserializeOwned,
    P: AsRef<Path> + Debug,
{
    create_parent_dir(path)?;
    let delimiter = get_delimiter(path)?;
    let file = File::create(path).wrap_err_with(|| format!("Failed to create table: {path:?}"))?;
    let mut writer = csv::WriterBuilder::new().delimiter(delimiter).from_writer(file);
    // csv only writes the header along with the first row
    if rows.is_empty() {
        if let Some(fields) = field_names::<T>() {
            writer.write_record(fields).wrap_err_with(|| format!("Failed to write header to {path:?}"))?;
        }
    }
    for row in rows {
        writer.serialize(row).wrap_err_with(|| format!("Failed to write row to {path:?}"))?;
    }
    writer.flush().wrap_err_with(|| format!("Failed to write table: {path:?}"))?;
    Ok(())
}

/// Returns the field names of a struct row, in declaration order.
fn field_names<T: DeserializeOwned>() -> Option<&'static [&'static str]> {
    let mut fields = None;
    // deserialization always fails, once the field names are seen
    let _ = T::deserialize(FieldNames(&mut fields));
    fields
}

struct FieldNames<'a>(&'a mut Option<&'static [&'static str]>);

impl<'de> serde::Deserializer<'de> for FieldNames<'_> {
    type Error = serde::de::value::Error;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        Err(serde::de::Error::custom("table rows must be structs"))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        *self.0 = Some(fields);
        Err(serde::de::Error::custom("only the field names are read"))
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}

#[cfg(test)]
mod tests;
