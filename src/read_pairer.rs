//! Block Overlap & Read Pairing
//!
//! Selects the reads that cover enough of an amplicon block and groups them
//! into mate pairs by read name.
//!
//! Only a read name seen exactly twice makes a pair. Singletons (mate filtered
//! out or never mapped here) and over-full groups (secondary or supplementary
//! alignments) are logged and dropped.

use anyhow::Result;
use log::{info, warn};
use rustc_hash::FxHashMap;

use crate::bam_source::{AlignedRead, AlignmentSource};
use crate::coords::Interval;

// ============================================================================
// Data Structures
// ============================================================================

/// Statistics for block read selection
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PairingStats {
    /// Reads returned by the region query
    pub intersecting: usize,
    /// Reads whose overlap exceeds the minimum proportion
    pub overlapping: usize,
    /// Zero-length reads (treated as non-overlapping)
    pub degenerate: usize,
    /// Read names seen only once
    pub singletons: usize,
    /// Read names seen more than twice
    pub overpaired: usize,
    /// Valid mate pairs
    pub pairs: usize,
}

impl PairingStats {
    pub fn merge(&mut self, other: &PairingStats) {
        self.intersecting += other.intersecting;
        self.overlapping += other.overlapping;
        self.degenerate += other.degenerate;
        self.singletons += other.singletons;
        self.overpaired += other.overpaired;
        self.pairs += other.pairs;
    }
}

/// Two mates sharing a read name, in the order they were fetched
#[derive(Debug, Clone)]
pub struct ReadPair {
    pub name: String,
    pub first: AlignedRead,
    pub second: AlignedRead,
}

// ============================================================================
// Overlap
// ============================================================================

/// Proportion of the block `[block_start, block_end]` covered by the read.
///
/// The read is taken to span `pos .. pos + len - 1`. Returns 0 for a
/// zero-length read or when the ranges do not intersect, else a value in
/// `(0, 1]`.
pub fn overlap_proportion(block_start: i64, block_end: i64, read: &AlignedRead) -> f64 {
    let read_len = read.len() as i64;
    if read_len <= 0 {
        return 0.0;
    }

    let read_end = read.pos + read_len - 1;
    if read_end < block_start || read.pos > block_end {
        return 0.0;
    }

    let overlap = block_end.min(read_end) - block_start.max(read.pos) + 1;
    let block_len = block_end - block_start + 1;
    overlap as f64 / block_len as f64
}

// ============================================================================
// Pairing
// ============================================================================

/// Group reads by name and keep the names seen exactly twice.
///
/// Groups keep the order in which their first read appeared, so the output is
/// deterministic for a given fetch order.
pub fn pair_reads(reads: Vec<AlignedRead>, stats: &mut PairingStats) -> Vec<ReadPair> {
    let mut index: FxHashMap<String, usize> = FxHashMap::default();
    let mut groups: Vec<Vec<AlignedRead>> = Vec::new();

    for read in reads {
        match index.get(&read.name) {
            Some(&i) => groups[i].push(read),
            None => {
                index.insert(read.name.clone(), groups.len());
                groups.push(vec![read]);
            }
        }
    }

    let mut pairs = Vec::with_capacity(groups.len());
    for group in groups {
        let count = group.len();
        let mut mates = group.into_iter();
        match (mates.next(), mates.next(), count) {
            (Some(first), Some(second), 2) => {
                stats.pairs += 1;
                pairs.push(ReadPair {
                    name: first.name.clone(),
                    first,
                    second,
                });
            }
            (Some(only), None, _) => {
                warn!("Read {} has no mate in block, discarding", only.name);
                stats.singletons += 1;
            }
            (Some(first), _, _) => {
                warn!(
                    "Read {} appears {} times in block, discarding",
                    first.name, count
                );
                stats.overpaired += 1;
            }
            (None, _, _) => {}
        }
    }

    pairs
}

/// Fetch the reads covering `block` and pair them.
///
/// # Arguments
/// * `block` - Block range (1-based, inclusive)
/// * `min_overlap` - A read is kept only if its overlap proportion is strictly greater
/// * `source` - Alignment source answering the region query
pub fn select_reads<S: AlignmentSource + ?Sized>(
    block: &Interval,
    min_overlap: f64,
    source: &mut S,
) -> Result<(Vec<ReadPair>, PairingStats)> {
    let mut stats = PairingStats::default();
    let fetched = source.fetch(block)?;
    stats.intersecting = fetched.len();

    let mut kept = Vec::with_capacity(fetched.len());
    for read in fetched {
        if read.is_empty() {
            warn!("Degenerate read: {}, length: 0", read.name);
            stats.degenerate += 1;
            continue;
        }
        if overlap_proportion(block.start, block.end, &read) > min_overlap {
            kept.push(read);
        }
    }
    stats.overlapping = kept.len();

    info!("number of reads intersecting block: {}", stats.intersecting);
    info!(
        "number of reads sufficiently overlapping block: {}",
        stats.overlapping
    );

    let pairs = pair_reads(kept, &mut stats);
    info!("number of read pairs in block: {}", stats.pairs);

    Ok((pairs, stats))
}

// ============================================================================
// Tests
// ============================================================================
