//! Mate consensus and block aggregation
//!
//! A variant is only trusted when both mates of a pair report it. Per block:
//!
//! 1. extract candidates from each mate independently
//! 2. optionally score the pair's primer regions and discard divergent pairs
//! 3. intersect the two candidate sets and keep variants inside the block
//! 4. tally support across pairs, then annotate and filter against the
//!    absolute and proportion thresholds
//!
//! Discarded pairs are not part of the pair count `N` used for proportions.

use std::collections::BTreeMap;

use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::blocks::Block;
use crate::error::Result;
use crate::primer::PrimerChecker;
use crate::read_pairer::{PairingStats, ReadPair};
use crate::variant::{FilterTag, InfoTag, Variant};
use crate::variant_extractor::extract;

/// Histogram rows are only reported for scores below this
pub const HISTOGRAM_REPORT_LIMIT: i32 = 10;

// ============================================================================
// Accumulators
// ============================================================================

/// Count of observed primer mismatch scores
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MismatchHistogram(BTreeMap<i32, usize>);

impl MismatchHistogram {
    pub fn add(&mut self, score: i32) {
        *self.0.entry(score).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &MismatchHistogram) {
        for (&score, &count) in &other.0 {
            *self.0.entry(score).or_insert(0) += count;
        }
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count(&self, score: i32) -> usize {
        self.0.get(&score).copied().unwrap_or(0)
    }

    /// `(score, fraction of all observations)` for scores below the report limit
    pub fn report_rows(&self) -> Vec<(i32, f64)> {
        let total = self.total();
        if total == 0 {
            return Vec::new();
        }
        self.0
            .iter()
            .filter(|&(&score, _)| score < HISTOGRAM_REPORT_LIMIT)
            .map(|(&score, &count)| (score, count as f64 / total as f64))
            .collect()
    }
}

/// Per-distinct-variant support counts, in first-seen order
#[derive(Debug, Default)]
struct SupportTally {
    entries: Vec<(Variant, usize)>,
    index: FxHashMap<Variant, usize>,
}

impl SupportTally {
    fn add(&mut self, variant: Variant) {
        match self.index.get(&variant) {
            Some(&i) => self.entries[i].1 += 1,
            None => {
                self.index.insert(variant.clone(), self.entries.len());
                self.entries.push((variant, 1));
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries ordered by reported position; ties keep first-seen order
    fn into_sorted(self) -> Vec<(Variant, usize)> {
        let mut entries = self.entries;
        entries.sort_by_key(|(v, _)| v.position());
        entries
    }
}

// ============================================================================
// Results
// ============================================================================

/// Coverage line of one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStats {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    /// Pairs that were not discarded by the primer check
    pub valid_pairs: usize,
}

/// Everything produced by calling one block
#[derive(Debug, Clone)]
pub struct BlockResult {
    /// Annotated variants, ordered by position
    pub variants: Vec<Variant>,
    pub stats: BlockStats,
    /// Primer mismatch scores seen in this block (empty without primer checking)
    pub histogram: MismatchHistogram,
    pub discarded_pairs: usize,
    pub pairing: PairingStats,
}

/// Thresholds applied while calling
#[derive(Debug, Clone)]
pub struct CallThresholds {
    /// Bases below this phred quality tag their variant `qlt`
    pub quality: Option<u8>,
    /// Minimum supporting pairs
    pub absolute: usize,
    /// Minimum supporting fraction of valid pairs
    pub proportion: f64,
}

impl Default for CallThresholds {
    fn default() -> Self {
        Self {
            quality: None,
            absolute: 2,
            proportion: 0.05,
        }
    }
}

// ============================================================================
// Consensus
// ============================================================================

/// Variants reported by both mates.
///
/// The first mate's instances are kept (with their quality and filter tags),
/// in the first mate's order, without duplicates.
pub fn mate_consensus(first: Vec<Variant>, second: &[Variant]) -> Vec<Variant> {
    let second: FxHashSet<&Variant> = second.iter().collect();
    let mut seen: FxHashSet<Variant> = FxHashSet::default();

    first
        .into_iter()
        .filter(|v| second.contains(v) && seen.insert(v.clone()))
        .collect()
}

/// Add sample, support and filter annotations to a tallied variant
fn annotate(
    mut variant: Variant,
    support: usize,
    valid_pairs: usize,
    sample: &str,
    thresholds: &CallThresholds,
) -> Variant {
    let proportion = if valid_pairs > 0 {
        support as f64 / valid_pairs as f64
    } else {
        0.0
    };

    variant.info.push(InfoTag::Sample(sample.to_string()));
    variant.info.push(InfoTag::SupportCount(support));
    variant.info.push(InfoTag::PairCount(valid_pairs));
    variant.info.push(InfoTag::Proportion(proportion));

    if support < thresholds.absolute {
        variant.filters.insert(FilterTag::BelowAbsoluteSupport);
    }
    if proportion < thresholds.proportion {
        variant.filters.insert(FilterTag::BelowProportionSupport);
    }
    variant
}

/// Call the variants of one block from its read pairs.
///
/// # Arguments
/// * `block` - The block being called
/// * `pairs` - Valid mate pairs selected for the block
/// * `pairing` - Selection statistics, carried into the result
/// * `sample` - Sample name recorded in each variant's INFO
/// * `thresholds` - Quality and support thresholds
/// * `primers` - Primer checker, when primer checking is enabled
///
/// # Errors
/// `MalformedAlignment` from extraction of either mate.
pub fn call_block(
    block: &Block,
    pairs: &[ReadPair],
    pairing: PairingStats,
    sample: &str,
    thresholds: &CallThresholds,
    primers: Option<&PrimerChecker>,
) -> Result<BlockResult> {
    let mut tally = SupportTally::default();
    let mut histogram = MismatchHistogram::default();
    let mut discarded = 0usize;

    for pair in pairs {
        let first = extract(&pair.first, thresholds.quality)?;
        let second = extract(&pair.second, thresholds.quality)?;

        if let Some(checker) = primers {
            let score = checker.score_pair(block, pair);
            histogram.add(score.forward);
            histogram.add(score.reverse);

            if score.exceeds(checker.threshold()) {
                warn!(
                    "read {} discarded due to greater than acceptable variance in primer sequence",
                    pair.name
                );
                discarded += 1;
                continue;
            }
        }

        for variant in mate_consensus(first, &second) {
            if block.contains(variant.pos) {
                tally.add(variant);
            }
        }
    }

    let valid_pairs = pairs.len() - discarded;
    if primers.is_some() {
        warn!(
            "number of reads discarded due to unexpected primer sequence: {}",
            discarded * 2
        );
    }
    info!("number of valid read pairs in block: {}", valid_pairs);
    info!("number of variants found in block: {}", tally.len());

    let variants = tally
        .into_sorted()
        .into_iter()
        .map(|(variant, support)| annotate(variant, support, valid_pairs, sample, thresholds))
        .collect();

    Ok(BlockResult {
        variants,
        stats: BlockStats {
            chrom: block.chrom.clone(),
            start: block.start,
            end: block.end,
            valid_pairs,
        },
        histogram,
        discarded_pairs: discarded,
        pairing,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bam_source::AlignedRead;
    use crate::blocks::PrimerSequences;
    use crate::cigar_utils::parse_cigar;
    use crate::variant::Context;

    const REF: &[u8] = b"ACGTACGTACGTACGTACGT";

    fn block() -> Block {
        Block {
            chrom: "chr1".to_string(),
            start: 101,
            end: 120,
            forward_primer: "F".to_string(),
            reverse_primer: "R".to_string(),
        }
    }

    fn mate(name: &str, seq: &[u8], md: &str, qual: u8) -> AlignedRead {
        let cigar = parse_cigar(&format!("{}M", seq.len())).unwrap();
        let quals = vec![qual + 33; seq.len()];
        AlignedRead::new(name, "chr1", 101, cigar, Some(md), seq, &quals)
    }

    /// Both mates carry an A>G at read offset 4 (position 105)
    fn variant_pair(name: &str) -> ReadPair {
        let mut seq = REF.to_vec();
        seq[4] = b'G';
        ReadPair {
            name: name.to_string(),
            first: mate(name, &seq, "4A15", 40),
            second: mate(name, &seq, "4A15", 40),
        }
    }

    fn reference_pair(name: &str) -> ReadPair {
        ReadPair {
            name: name.to_string(),
            first: mate(name, REF, "20", 40),
            second: mate(name, REF, "20", 40),
        }
    }

    fn call(pairs: &[ReadPair], thresholds: &CallThresholds) -> BlockResult {
        call_block(&block(), pairs, PairingStats::default(), "S1", thresholds, None).unwrap()
    }

    #[test]
    fn test_three_of_ten_passes() {
        let mut pairs: Vec<ReadPair> = (0..3).map(|i| variant_pair(&format!("v{}", i))).collect();
        pairs.extend((0..7).map(|i| reference_pair(&format!("r{}", i))));

        let result = call(&pairs, &CallThresholds::default());

        assert_eq!(result.stats.valid_pairs, 10);
        assert_eq!(result.variants.len(), 1);
        let v = &result.variants[0];
        assert_eq!(v.pos, 105);
        assert!(v.filters.is_pass());
        assert_eq!(v.info_string(), "Sample=S1;NV=3;NP=10;PCT=30.00%");
    }

    #[test]
    fn test_support_thresholds() {
        let mut pairs = vec![variant_pair("v0")];
        pairs.extend((0..29).map(|i| reference_pair(&format!("r{}", i))));

        let result = call(&pairs, &CallThresholds::default());
        let v = &result.variants[0];
        assert!(v.filters.contains(FilterTag::BelowAbsoluteSupport));
        assert!(v.filters.contains(FilterTag::BelowProportionSupport));
        assert_eq!(v.filters.to_string(), "at;pt");
    }

    #[test]
    fn test_single_mate_variant_not_counted() {
        let mut seq = REF.to_vec();
        seq[4] = b'G';
        let pair = ReadPair {
            name: "p".to_string(),
            first: mate("p", &seq, "4A15", 40),
            second: mate("p", REF, "20", 40),
        };
        let result = call(&[pair], &CallThresholds::default());
        assert!(result.variants.is_empty());
        assert_eq!(result.stats.valid_pairs, 1);
    }

    #[test]
    fn test_variants_outside_block_ignored() {
        let mut narrow = block();
        narrow.start = 106;

        let pairs = vec![variant_pair("a"), variant_pair("b")];
        let result = call_block(
            &narrow,
            &pairs,
            PairingStats::default(),
            "S1",
            &CallThresholds::default(),
            None,
        )
        .unwrap();
        assert!(result.variants.is_empty());
        assert_eq!(result.stats.start, 106);
    }

    #[test]
    fn test_low_quality_tag_survives_aggregation() {
        let mut seq = REF.to_vec();
        seq[4] = b'G';
        let pairs: Vec<ReadPair> = (0..2)
            .map(|i| ReadPair {
                name: format!("q{}", i),
                first: mate("q", &seq, "4A15", 5),
                second: mate("q", &seq, "4A15", 5),
            })
            .collect();

        let thresholds = CallThresholds {
            quality: Some(20),
            ..CallThresholds::default()
        };
        let result = call(&pairs, &thresholds);
        assert_eq!(result.variants[0].filters.to_string(), "qlt");
    }

    #[test]
    fn test_output_ordered_by_position() {
        // Pair with a later SNV first, then a pair with an earlier one
        let mut late = REF.to_vec();
        late[14] = b'T';
        let mut early = REF.to_vec();
        early[1] = b'T';
        let pairs = vec![
            ReadPair {
                name: "late".to_string(),
                first: mate("late", &late, "14G5", 40),
                second: mate("late", &late, "14G5", 40),
            },
            ReadPair {
                name: "early".to_string(),
                first: mate("early", &early, "1C18", 40),
                second: mate("early", &early, "1C18", 40),
            },
        ];

        let result = call(&pairs, &CallThresholds::default());
        let positions: Vec<i64> = result.variants.iter().map(|v| v.pos).collect();
        assert_eq!(positions, vec![102, 115]);
    }

    #[test]
    fn test_mate_consensus_keeps_first_mate_instance() {
        let first = vec![
            Variant::snv("chr1", 5, b'A', b'G', 10).with_filter(FilterTag::LowQuality),
            Variant::insertion("chr1", 8, b"T".to_vec(), Context::Base(b'C')),
        ];
        let second = vec![Variant::snv("chr1", 5, b'A', b'G', 40)];

        let shared = mate_consensus(first, &second);
        assert_eq!(shared.len(), 1);
        assert!(shared[0].filters.contains(FilterTag::LowQuality));
    }

    #[test]
    fn test_discarded_pairs_excluded_from_pair_count() {
        let mut sequences = PrimerSequences::default();
        // Reads start at the block start, so every primer region is empty
        // and scores the full primer length
        sequences.insert("F".to_string(), b"AC".to_vec());
        sequences.insert("R".to_string(), b"GT".to_vec());
        let blocks = [block()];

        let strict = PrimerChecker::new(sequences.clone(), 0, 1, &blocks).unwrap();
        let pairs = vec![variant_pair("a"), variant_pair("b"), reference_pair("c")];
        let result = call_block(
            &block(),
            &pairs,
            PairingStats::default(),
            "S1",
            &CallThresholds::default(),
            Some(&strict),
        )
        .unwrap();

        assert_eq!(result.discarded_pairs, 3);
        assert_eq!(result.stats.valid_pairs, 0);
        assert!(result.variants.is_empty());
        // Forward and reverse score of every pair, discarded or not
        assert_eq!(result.histogram.total(), 6);
        assert_eq!(result.histogram.count(2), 6);

        let lenient = PrimerChecker::new(sequences, 0, 2, &blocks).unwrap();
        let result = call_block(
            &block(),
            &pairs,
            PairingStats::default(),
            "S1",
            &CallThresholds::default(),
            Some(&lenient),
        )
        .unwrap();
        assert_eq!(result.discarded_pairs, 0);
        assert_eq!(result.stats.valid_pairs, 3);
        assert_eq!(result.variants[0].info_string(), "Sample=S1;NV=2;NP=3;PCT=66.67%");
    }

    #[test]
    fn test_malformed_mate_is_fatal() {
        let pair = ReadPair {
            name: "bad".to_string(),
            first: mate("bad", REF, "4^A16", 40),
            second: mate("bad", REF, "20", 40),
        };
        assert!(call_block(
            &block(),
            &[pair],
            PairingStats::default(),
            "S1",
            &CallThresholds::default(),
            None
        )
        .is_err());
    }

    #[test]
    fn test_histogram() {
        let mut block_hist = MismatchHistogram::default();
        for score in [0, 0, 1, 12] {
            block_hist.add(score);
        }
        let rows = block_hist.report_rows();
        assert_eq!(rows, vec![(0, 0.5), (1, 0.25)]);

        let mut run = MismatchHistogram::default();
        run.merge(&block_hist);
        run.merge(&block_hist);
        assert_eq!(run.count(0), 4);
        assert_eq!(run.total(), 8);
        assert!(MismatchHistogram::default().report_rows().is_empty());
    }
}
