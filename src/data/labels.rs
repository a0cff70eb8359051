// ============================================================
// Layer 4 — Labels Table
// ============================================================
// Reads and writes the `filename,label` CSV that pairs every
// image with its ground-truth text.
//
// Example:
//   filename,label
//   captcha_00001.png,kqzt
//   captcha_00002.png,abdm
//
// Rows go through the csv crate, so quoted fields, CRLF line
// endings and surrounding whitespace are all accepted.

use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use crate::domain::sample::LabelledSample;
use crate::domain::traits::SampleSource;

pub const COLUMNS: [&str; 2] = ["filename", "label"];

/// A labels CSV on disk. Implements SampleSource.
pub struct LabelsTable {
    path: PathBuf,
}

impl LabelsTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SampleSource for LabelsTable {
    fn load_all(&self) -> Result<Vec<LabelledSample>> {
        let text = fs::read_to_string(self.path())
            .with_context(|| format!("Cannot read labels table '{}'", self.path().display()))?;

        let samples = parse_table(&text)
            .with_context(|| format!("Malformed labels table '{}'", self.path().display()))?;

        tracing::info!("Loaded {} labelled samples from '{}'", samples.len(), self.path().display());
        Ok(samples)
    }
}

/// Parse the full CSV text. The first record must be the header.
pub fn parse_table(text: &str) -> Result<Vec<LabelledSample>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(text.trim_start_matches('\u{FEFF}').as_bytes());

    let headers = reader.headers().context("Cannot read header row")?.clone();
    if headers.is_empty() {
        bail!("Labels table is empty");
    }
    if !headers.iter().eq(COLUMNS) {
        bail!("Expected header '{}', found '{}'", COLUMNS.join(","), join(&headers));
    }

    let mut samples = Vec::new();
    for row in reader.records() {
        let record = match row {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                return Err(anyhow::Error::new(e).context(format!("line {line}: unreadable row")));
            }
        };
        let line   = record.position().map_or(0, |p| p.line());

        let sample: LabelledSample = record
            .deserialize(Some(&headers))
            .with_context(|| format!("line {line}: expected 'filename,label', found '{}'", join(&record)))?;
        if sample.filename.is_empty() || sample.label.is_empty() {
            bail!("line {line}: empty filename or label in '{}'", join(&record));
        }
        samples.push(sample);
    }
    Ok(samples)
}

fn join(record: &StringRecord) -> String {
    record.iter().collect::<Vec<_>>().join(",")
}

/// Streams rows into a new labels CSV, header first.
pub struct LabelsWriter {
    out:  csv::Writer<File>,
    rows: usize,
}

impl LabelsWriter {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
        }
        // Header written by hand so an empty table still has one
        let mut out = WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .with_context(|| format!("Cannot create labels table '{}'", path.display()))?;
        out.write_record(COLUMNS)?;

        Ok(Self { out, rows: 0 })
    }

    pub fn append(&mut self, sample: &LabelledSample) -> Result<()> {
        self.out.serialize(sample)?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and return the number of rows written
    pub fn finish(mut self) -> Result<usize> {
        self.out.flush()?;
        Ok(self.rows)
    }
}
