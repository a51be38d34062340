//! ROVER: amplicon variant calling with mate-pair consensus
//!
//! Targeted PCR panels sequence every amplicon from both ends. A variant is
//! reported for a sample only when both reads of a pair carry it, and is then
//! filtered against base quality, absolute support and proportion of pairs.
//!
//! Pipeline stages, leaves first:
//! - [`md_tag`], [`cigar_utils`], [`seq_decode`]: alignment field decoding
//! - [`variant_extractor`]: walk CIGAR and MD together to list a read's variants
//! - [`read_pairer`]: select reads covering a block and pair mates by name
//! - [`primer`]: score primer regions of a pair against expected sequences
//! - [`consensus`]: intersect mates, tally support, annotate and filter
//! - [`pipeline`], [`report`]: drive a run and write its outputs

// Modules
pub mod bam_source; // Indexed BAM access behind `AlignmentSource`
pub mod blocks;
pub mod cigar_utils;
pub mod consensus;
pub mod coords; // 1-based inclusive <-> 0-based half-open
pub mod error;
pub mod id_lookup;
pub mod md_tag;
pub mod pipeline;
pub mod primer;
pub mod read_pairer;
pub mod report;
pub mod seq_decode;
pub mod variant;
pub mod variant_extractor;

pub use bam_source::{AlignedRead, AlignmentSource, IndexedBamSource};
pub use blocks::{load_blocks, load_primer_sequences, Block, PrimerSequences};
pub use consensus::{call_block, BlockResult, CallThresholds, MismatchHistogram};
pub use error::{Result, RoverError};
pub use pipeline::{run, CallerConfig, RunSummary, SampleResult};
pub use primer::{PrimerChecker, PrimerScore};
pub use read_pairer::{pair_reads, select_reads, PairingStats, ReadPair};
pub use variant::{Context, FilterTag, InfoTag, Variant, VariantKind};
pub use variant_extractor::extract;
