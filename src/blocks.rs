//! Primer tables
//!
//! Two tab-separated inputs describe the amplicon panel:
//!
//! - coordinate table: `chrom  start  end  forward_primer_id  reverse_primer_id`,
//!   1-based inclusive block coordinates, one block per row
//! - sequence table: `primer_id  sequence`
//!
//! Blank lines and `#` comments are skipped. Any other row that cannot be
//! parsed stops the run with the offending line number.

use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;

use crate::coords::Interval;
use crate::error::RoverError;

/// One amplicon target region and its primer pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub chrom: String,
    /// First base of the block (1-based)
    pub start: i64,
    /// Last base of the block (1-based, inclusive)
    pub end: i64,
    pub forward_primer: String,
    pub reverse_primer: String,
}

impl Block {
    pub fn interval(&self) -> Interval {
        Interval::new(self.chrom.as_str(), self.start, self.end)
    }

    /// Whether a 1-based position falls inside the block
    pub fn contains(&self, pos: i64) -> bool {
        pos >= self.start && pos <= self.end
    }
}

/// Expected primer sequences keyed by primer id (sequences upper-cased)
pub type PrimerSequences = FxHashMap<String, Vec<u8>>;

/// Iterate the data rows of a TSV file as `(line_number, fields)`
fn data_rows(path: &str) -> Result<Vec<(usize, Vec<String>)>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path))?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path))?;
        let line = line.trim_end_matches('\r');

        // Skip comments and empty lines
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        rows.push((i + 1, line.split('\t').map(str::to_string).collect()));
    }
    Ok(rows)
}

fn table_error(path: &str, line: usize, reason: impl Into<String>) -> RoverError {
    RoverError::InvalidTable {
        path: path.to_string(),
        line,
        reason: reason.into(),
    }
}

/// Load the block coordinate table, preserving row order.
///
/// Rows need at least `chrom start end`; missing primer ids are stored
/// empty and only matter once primer checking is enabled.
pub fn load_blocks(path: &str) -> Result<Vec<Block>> {
    let mut blocks = Vec::new();

    for (line, fields) in data_rows(path)? {
        if fields.len() < 3 {
            return Err(table_error(
                path,
                line,
                format!("expected at least 3 columns, found {}", fields.len()),
            )
            .into());
        }

        let parse = |idx: usize, what: &str| -> std::result::Result<i64, RoverError> {
            fields[idx]
                .trim()
                .parse::<i64>()
                .map_err(|_| table_error(path, line, format!("invalid {} '{}'", what, fields[idx])))
        };
        let start = parse(1, "start")?;
        let end = parse(2, "end")?;
        if start < 1 || end < start {
            return Err(table_error(
                path,
                line,
                format!("invalid block range {}-{}", start, end),
            )
            .into());
        }

        let field = |idx: usize| fields.get(idx).map(|s| s.trim().to_string()).unwrap_or_default();
        blocks.push(Block {
            chrom: fields[0].trim().to_string(),
            start,
            end,
            forward_primer: field(3),
            reverse_primer: field(4),
        });
    }

    Ok(blocks)
}

/// Load the primer sequence table
pub fn load_primer_sequences(path: &str) -> Result<PrimerSequences> {
    let mut primers = PrimerSequences::default();

    for (line, fields) in data_rows(path)? {
        if fields.len() < 2 {
            return Err(table_error(
                path,
                line,
                format!("expected 2 columns, found {}", fields.len()),
            )
            .into());
        }
        let id = fields[0].trim().to_string();
        let sequence = fields[1].trim().to_ascii_uppercase().into_bytes();
        primers.insert(id, sequence);
    }

    Ok(primers)
}

// ============================================================================
// Tests
// ============================================================================
