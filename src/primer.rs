//! Primer verification
//!
//! Amplicon reads begin and end inside the PCR primers. The bases a read
//! carries before the block start should spell the forward primer, and the
//! bases after the block end should be the reverse complement of the reverse
//! primer. A pair whose primer regions drift too far from the expected
//! sequences is likely a mispriming artefact and does not support variants.
//!
//! Divergence is scored with a global alignment (match +1, mismatch 0, a
//! flat penalty per gap) as `len(expected) - best_score`.

use bio::alignment::pairwise::Aligner;
use bio::alphabets::dna;

use crate::bam_source::AlignedRead;
use crate::blocks::{Block, PrimerSequences};
use crate::error::{Result, RoverError};
use crate::read_pairer::ReadPair;

/// Forward and reverse primer mismatch scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrimerScore {
    pub forward: i32,
    pub reverse: i32,
}

impl PrimerScore {
    /// Per-direction maximum: the worse mate decides
    pub fn max(self, other: PrimerScore) -> PrimerScore {
        PrimerScore {
            forward: self.forward.max(other.forward),
            reverse: self.reverse.max(other.reverse),
        }
    }

    pub fn exceeds(&self, threshold: i32) -> bool {
        self.forward > threshold || self.reverse > threshold
    }
}

/// Slice the hypothesised primer regions out of a read.
///
/// Forward region: bases before the block start. Reverse region: bases after
/// the block end. Offsets are computed from the read position and clamped to
/// the read, so a read starting inside the block has an empty forward region.
pub fn primer_regions(block: &Block, read: &AlignedRead) -> (Vec<u8>, Vec<u8>) {
    let len = read.len() as i64;
    let forward_end = (block.start - read.pos).clamp(0, len) as usize;
    let reverse_start = (block.end - read.pos + 1).clamp(0, len) as usize;

    let forward = read.bases[..forward_end].iter().map(|b| b.base).collect();
    let reverse = read.bases[reverse_start..].iter().map(|b| b.base).collect();
    (forward, reverse)
}

/// `len(expected) - best global alignment score` of `observed` against `expected`.
///
/// 0 for a perfect match, growing by one per substitution and by
/// `1 + gap_penalty` per gap. An empty sequence on either side scores
/// `len(expected)`.
pub fn mismatch_score(expected: &[u8], observed: &[u8], gap_penalty: i32) -> i32 {
    if expected.is_empty() || observed.is_empty() {
        return expected.len() as i32;
    }

    let score = |a: u8, b: u8| if a == b { 1i32 } else { 0i32 };
    let mut aligner = Aligner::with_capacity(expected.len(), observed.len(), -gap_penalty, 0, score);
    let alignment = aligner.global(expected, observed);
    expected.len() as i32 - alignment.score
}

/// Scores reads against the primer pair of their block
#[derive(Debug, Clone)]
pub struct PrimerChecker {
    sequences: PrimerSequences,
    gap_penalty: i32,
    threshold: i32,
}

impl PrimerChecker {
    /// Build a checker, verifying that every block's primers have a sequence.
    ///
    /// # Arguments
    /// * `sequences` - Primer id to expected sequence
    /// * `gap_penalty` - Score deducted per alignment gap (non-negative)
    /// * `threshold` - Maximum mismatch score a pair may have in either direction
    /// * `blocks` - Blocks that will be checked
    pub fn new(
        sequences: PrimerSequences,
        gap_penalty: i32,
        threshold: i32,
        blocks: &[Block],
    ) -> Result<Self> {
        if gap_penalty < 0 {
            return Err(RoverError::invalid_parameter(
                "gap_penalty",
                format!("must be >= 0, got {}", gap_penalty),
            ));
        }

        for block in blocks {
            for id in [&block.forward_primer, &block.reverse_primer] {
                if !sequences.contains_key(id.as_str()) {
                    return Err(RoverError::MissingPrimer {
                        primer_id: id.clone(),
                        chrom: block.chrom.clone(),
                        start: block.start,
                        end: block.end,
                    });
                }
            }
        }

        Ok(Self {
            sequences,
            gap_penalty,
            threshold,
        })
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }

    fn sequence(&self, id: &str) -> &[u8] {
        self.sequences.get(id).map(|s| s.as_slice()).unwrap_or(&[])
    }

    /// Score one read's primer regions
    pub fn score_read(&self, block: &Block, read: &AlignedRead) -> PrimerScore {
        let (forward, reverse) = primer_regions(block, read);
        PrimerScore {
            forward: mismatch_score(self.sequence(&block.forward_primer), &forward, self.gap_penalty),
            reverse: mismatch_score(
                self.sequence(&block.reverse_primer),
                &dna::revcomp(&reverse),
                self.gap_penalty,
            ),
        }
    }

    /// Score a pair: the worse mate in each direction
    pub fn score_pair(&self, block: &Block, pair: &ReadPair) -> PrimerScore {
        self.score_read(block, &pair.first)
            .max(self.score_read(block, &pair.second))
    }
}

// ============================================================================
// Tests
// ============================================================================
